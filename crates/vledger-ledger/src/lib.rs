//! # vledger-ledger: Vendor Ledger Engine
//!
//! Append-only vendor ledger with settlement and withdrawal workflows:
//!
//! - **Store** (`store.rs`): per-vendor books of immutable entries, each
//!   with a writer mutex that serializes every mutation for that vendor.
//!
//! - **Projector** (`projector.rs`): balances derived from the live ledger
//!   and pending requests; cached vendor summaries for listings.
//!
//! - **Workflows** (`workflow.rs`, `requests.rs`): settlement and
//!   withdrawal request lifecycles sharing one generic implementation,
//!   with admission under the vendor's writer lock so concurrent requests
//!   can never jointly overdraw.
//!
//! - **Gate** (`gate.rs`): vendor registration, block/unblock, cash limits,
//!   and cash-collection admission.
//!
//! - **Journal** (`journal.rs`): hash-chained durable record of every
//!   committed change, replayed on startup.
//!
//! - **Cache** (`cache.rs`): TTL cache with exact and prefix invalidation.
//!
//! ## Crate Policy
//!
//! - Depends on `vledger-core` and `vledger-state` internally.
//! - Synchronous: no lock is ever held across an `.await` because nothing
//!   here is async.
//! - Every mutation is journaled before it becomes visible in memory.

pub mod cache;
pub mod engine;
pub mod entry;
pub mod error;
pub mod gate;
pub mod journal;
pub mod projector;
pub mod requests;
pub mod store;
pub mod workflow;

pub use cache::{vendor_prefix, CacheInvalidation, TtlCache};
pub use engine::{EngineConfig, EngineStats, LedgerEngine};
pub use entry::{EntryKind, LedgerEntry, NewEntry, MAX_BOOKING_REF_LEN, MAX_MEMO_LEN};
pub use error::LedgerError;
pub use gate::VendorStatusGate;
pub use journal::{
    read_journal, verify_records, ChainHead, FileJournal, Journal, JournalContents, JournalError,
    JournalEvent, JournalRecord, MemoryJournal,
};
pub use projector::{BalanceProjector, VendorSummary};
pub use requests::{RequestBook, StatusCounts};
pub use store::{LedgerStore, VendorWriter, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use workflow::{
    Created, PayoutKind, RequestWorkflow, SettlementWorkflow, WithdrawalWorkflow, WorkflowPolicy,
    MAX_IDEMPOTENCY_KEY_LEN,
};
