//! # vledger-state: Request and Account State Machines
//!
//! Pure state transitions with no I/O and no locking. The ledger engine in
//! `vledger-ledger` owns instances of these types and decides when a
//! transition is allowed to commit.
//!
//! ## State Machines
//!
//! - **Payout request** (`request.rs`): `Pending → Approved | Rejected`,
//!   shared by settlements and withdrawals, each with its own id type.
//!
//! - **Vendor account** (`vendor.rs`): blocked flag and cash limit, with
//!   admission checks for new requests and self-collected cash.
//!
//! ## Design
//!
//! Transitions are methods returning `Result`. A `check_*` method exists for
//! every transition that must be validated before a side effect elsewhere
//! (a ledger write) is performed, so the caller can validate, write, and
//! then commit without a failure in between.

pub mod request;
pub mod vendor;

// ─── Request re-exports ─────────────────────────────────────────────

pub use request::{
    Approval, PayoutRequest, Rejection, RequestError, RequestId, RequestKind, RequestStatus,
    RequestTransitionRecord, SettlementRequest, WithdrawalRequest, MAX_NOTE_LEN,
};

// ─── Vendor re-exports ──────────────────────────────────────────────

pub use vendor::{cash_exposure, StatusChange, VendorAccount, VendorError};
