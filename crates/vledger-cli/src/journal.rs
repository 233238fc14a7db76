//! # Journal Subcommand
//!
//! Reads a journal file, verifies its hash chain, and optionally replays
//! it into an in-memory engine to report balances or list a vendor's
//! entries. Replay applies records without re-journaling them, so the file
//! is never touched.
//!
//! A torn final line (a crash mid-append) is reported but is not an error:
//! the service drops it on its next start. Any other defect fails with the
//! offending line number.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;

use vledger_core::{EntryId, VendorId};
use vledger_ledger::{
    read_journal, EngineConfig, JournalContents, LedgerEngine, MemoryJournal, DEFAULT_PAGE_LIMIT,
};

/// Arguments for the `vledger journal` subcommand.
#[derive(Args, Debug)]
pub struct JournalArgs {
    #[command(subcommand)]
    pub command: JournalCommand,
}

/// Journal subcommands.
#[derive(Subcommand, Debug)]
pub enum JournalCommand {
    /// Verify the hash chain and print the head.
    Verify {
        /// Path to the journal file.
        path: PathBuf,
    },

    /// Replay the journal and print every vendor's balances.
    Balances {
        /// Path to the journal file.
        path: PathBuf,
        /// Emit one JSON object per vendor instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Replay the journal and print one vendor's ledger entries.
    Ledger {
        /// Path to the journal file.
        path: PathBuf,
        /// Vendor whose entries to list.
        vendor_id: String,
        /// Only entries with an id greater than this.
        #[arg(long)]
        since: Option<u64>,
        /// Maximum number of entries to print.
        #[arg(long)]
        limit: Option<usize>,
        /// Emit one JSON object per entry instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Execute the journal subcommand.
pub fn run_journal(args: &JournalArgs) -> Result<u8> {
    let mut out = std::io::stdout().lock();
    match &args.command {
        JournalCommand::Verify { path } => cmd_verify(path, &mut out),
        JournalCommand::Balances { path, json } => cmd_balances(path, *json, &mut out),
        JournalCommand::Ledger {
            path,
            vendor_id,
            since,
            limit,
            json,
        } => cmd_ledger(path, vendor_id, *since, *limit, *json, &mut out),
    }
}

fn load(path: &Path) -> Result<JournalContents> {
    let contents = read_journal(path)
        .with_context(|| format!("failed to verify journal {}", path.display()))?;
    if contents.torn_tail {
        tracing::warn!(
            path = %path.display(),
            valid_len = contents.valid_len,
            "journal ends in an incomplete record; it will be dropped on next service start"
        );
    }
    Ok(contents)
}

fn replay(path: &Path) -> Result<LedgerEngine> {
    let contents = load(path)?;
    let sink = Arc::new(MemoryJournal::new());
    LedgerEngine::replay(EngineConfig::default(), sink, contents.records)
        .with_context(|| format!("failed to replay journal {}", path.display()))
}

fn cmd_verify(path: &Path, out: &mut dyn Write) -> Result<u8> {
    let contents = load(path)?;
    writeln!(out, "journal:   {}", path.display())?;
    writeln!(out, "records:   {}", contents.records.len())?;
    writeln!(out, "head seq:  {}", contents.head.seq)?;
    writeln!(out, "head hash: {}", contents.head.digest)?;
    if contents.torn_tail {
        writeln!(
            out,
            "torn tail: yes (verified prefix is {} bytes)",
            contents.valid_len
        )?;
    }
    writeln!(out, "OK")?;
    Ok(0)
}

fn cmd_balances(path: &Path, json: bool, out: &mut dyn Write) -> Result<u8> {
    let engine = replay(path)?;
    let accounts = engine.gate().list();

    if !json {
        writeln!(
            out,
            "{:<24} {:>8} {:>14} {:>14} {:>14} {:>14} {:>14}",
            "VENDOR", "BLOCKED", "BALANCE", "RESERVED", "AVAILABLE", "CASH", "CASH LIMIT"
        )?;
    }
    for account in accounts {
        let summary = engine.projector().summary(&account.vendor_id)?;
        if json {
            let line = json!({
                "vendor_id": account.vendor_id,
                "blocked": account.blocked,
                "cash_limit": account.cash_limit.minor_units(),
                "balance": summary.balance.minor_units(),
                "pending_reserved": summary.pending_reserved.minor_units(),
                "available": summary.available.minor_units(),
                "cash_exposure": summary.cash_exposure.minor_units(),
                "entry_count": summary.entry_count,
            });
            writeln!(out, "{line}")?;
        } else {
            writeln!(
                out,
                "{:<24} {:>8} {:>14} {:>14} {:>14} {:>14} {:>14}",
                account.vendor_id.as_str(),
                if account.blocked { "yes" } else { "no" },
                summary.balance.to_string(),
                summary.pending_reserved.to_string(),
                summary.available.to_string(),
                summary.cash_exposure.to_string(),
                account.cash_limit.to_string(),
            )?;
        }
    }
    Ok(0)
}

fn cmd_ledger(
    path: &Path,
    vendor_id: &str,
    since: Option<u64>,
    limit: Option<usize>,
    json: bool,
    out: &mut dyn Write,
) -> Result<u8> {
    let vendor_id = VendorId::new(vendor_id)?;
    let engine = replay(path)?;
    let entries = engine.entries_for(
        &vendor_id,
        since.map(EntryId),
        limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    )?;

    for entry in &entries {
        if json {
            writeln!(out, "{}", serde_json::to_string(entry)?)?;
        } else {
            let reference = entry
                .related_settlement_id
                .map(|id| id.to_string())
                .or_else(|| entry.related_withdrawal_id.map(|id| id.to_string()))
                .or_else(|| entry.related_booking_id.as_ref().map(|b| format!("booking:{b}")))
                .unwrap_or_default();
            writeln!(
                out,
                "{:>8}  {}  {:<16} {:>14}  {}",
                entry.id.value(),
                entry.created_at,
                entry.kind.as_str(),
                entry.amount.to_string(),
                reference,
            )?;
        }
    }
    if !json {
        let summary = engine.projector().summary(&vendor_id)?;
        writeln!(
            out,
            "balance {} (available {})",
            summary.balance, summary.available
        )?;
    }
    Ok(0)
}
