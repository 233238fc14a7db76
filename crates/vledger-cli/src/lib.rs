//! # vledger-cli: Vendor Ledger Operator CLI
//!
//! Offline inspection of a journal file written by `vledger-api`. The
//! journal is only ever read here; nothing is appended or truncated.
//!
//! ## Subcommands
//!
//! - `journal verify`: check the hash chain and report the head
//! - `journal balances`: replay and print every vendor's balances
//! - `journal ledger`: replay and print one vendor's entries
//!
//! ## Crate Policy
//!
//! - Argument parsing lives beside the handler it feeds.
//! - Handlers return an exit code; `main` owns process exit and logging.

pub mod journal;
