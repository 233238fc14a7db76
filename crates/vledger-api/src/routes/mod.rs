//! # API Route Modules
//!
//! - `vendors`: registration, balances, ledger view, postings, cash
//!   collections, status gate.
//! - `settlements`: settlement request lifecycle.
//! - `withdrawals`: withdrawal request lifecycle.
//! - `payouts`: DTOs and handler bodies shared by the two workflows.

pub mod payouts;
pub mod settlements;
pub mod vendors;
pub mod withdrawals;
