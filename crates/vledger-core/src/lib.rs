//! # vledger-core: Foundational Types for the Vendor Ledger
//!
//! Every other crate in the workspace depends on `vledger-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `VendorId`, `EntryId`,
//!    `SettlementId`, `WithdrawalId` are distinct types. No bare strings or
//!    integers cross crate boundaries as identifiers.
//!
//! 2. **Integer money.** `Amount` is `i64` minor units with checked
//!    arithmetic. Floats are rejected at deserialization.
//!
//! 3. **UTC-only timestamps.** `Timestamp` enforces UTC and millisecond
//!    precision so journaled values round-trip exactly.
//!
//! 4. **Chained digests.** `chain_digest()` links journal records into a
//!    tamper-evident SHA-256 chain.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vledger-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use amount::Amount;
pub use digest::{chain_digest, RecordDigest};
pub use error::{ValidationError, VledgerError};
pub use identity::{EntryId, SettlementId, VendorId, WithdrawalId, MAX_VENDOR_ID_LEN};
pub use temporal::Timestamp;
