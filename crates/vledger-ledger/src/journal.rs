//! # Durable Journal
//!
//! Every committed state change is first recorded as a [`JournalEvent`].
//! The engine writes the event and only then applies it in memory, so a
//! change acknowledged to a caller survives a restart and a failed write
//! leaves memory untouched.
//!
//! Records form a SHA-256 hash chain:
//!
//! ```text
//! digest(n) = SHA256( digest(n-1) || "{seq}|{recorded_at}|{event_json}" )
//! ```
//!
//! with `digest(0)` = [`RecordDigest::GENESIS`]. Editing, reordering, or
//! dropping any record breaks every digest after it, which
//! [`verify_records`] reports with the offending line number.
//!
//! ## Backends
//!
//! - [`FileJournal`]: JSON lines, one record per line, `fsync` after every
//!   write. A torn final line left by a crash mid-write is truncated on open.
//! - [`MemoryJournal`]: keeps records in memory; for development and tests.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vledger_core::{chain_digest, RecordDigest, Timestamp};
use vledger_state::{SettlementRequest, VendorAccount, WithdrawalRequest};

use crate::entry::LedgerEntry;

/// Errors from journal I/O and verification.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hash chain or sequence continuity broken.
    #[error("journal integrity violation at line {line}: {reason}")]
    Integrity { line: usize, reason: String },

    /// An earlier write failed and could not be rolled back; the journal
    /// refuses further writes until reopened.
    #[error("journal is poisoned by an earlier failed write")]
    Poisoned,
}

/// A state change recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEvent {
    VendorRegistered {
        account: VendorAccount,
    },
    /// Blocked flag or cash limit changed; carries the full account.
    VendorUpdated {
        account: VendorAccount,
    },
    EntryAppended {
        entry: LedgerEntry,
    },
    SettlementOpened {
        request: SettlementRequest,
    },
    /// Approval and its payout entry commit as one record.
    SettlementApproved {
        request: SettlementRequest,
        payout: LedgerEntry,
    },
    SettlementRejected {
        request: SettlementRequest,
    },
    WithdrawalOpened {
        request: WithdrawalRequest,
    },
    WithdrawalApproved {
        request: WithdrawalRequest,
        payout: LedgerEntry,
    },
    WithdrawalRejected {
        request: WithdrawalRequest,
    },
}

impl JournalEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VendorRegistered { .. } => "vendor_registered",
            Self::VendorUpdated { .. } => "vendor_updated",
            Self::EntryAppended { .. } => "entry_appended",
            Self::SettlementOpened { .. } => "settlement_opened",
            Self::SettlementApproved { .. } => "settlement_approved",
            Self::SettlementRejected { .. } => "settlement_rejected",
            Self::WithdrawalOpened { .. } => "withdrawal_opened",
            Self::WithdrawalApproved { .. } => "withdrawal_approved",
            Self::WithdrawalRejected { .. } => "withdrawal_rejected",
        }
    }
}

/// One sealed journal record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub recorded_at: Timestamp,
    pub prev: RecordDigest,
    pub digest: RecordDigest,
    pub event: JournalEvent,
}

/// Borrowed serialization view of a record, same shape as [`JournalRecord`].
#[derive(Serialize)]
struct RecordLine<'a> {
    seq: u64,
    recorded_at: Timestamp,
    prev: RecordDigest,
    digest: RecordDigest,
    event: &'a JournalEvent,
}

fn record_digest(
    prev: &RecordDigest,
    seq: u64,
    recorded_at: &Timestamp,
    event: &JournalEvent,
) -> Result<RecordDigest, serde_json::Error> {
    let mut payload = format!("{seq}|{recorded_at}|").into_bytes();
    serde_json::to_writer(&mut payload, event)?;
    Ok(chain_digest(prev, &payload))
}

/// Position of the chain after the last record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub seq: u64,
    pub digest: RecordDigest,
}

impl ChainHead {
    pub const GENESIS: ChainHead = ChainHead {
        seq: 0,
        digest: RecordDigest::GENESIS,
    };

    fn seal(&self, event: &JournalEvent) -> Result<(ChainHead, Timestamp), serde_json::Error> {
        let seq = self.seq + 1;
        let recorded_at = Timestamp::now();
        let digest = record_digest(&self.digest, seq, &recorded_at, event)?;
        Ok((ChainHead { seq, digest }, recorded_at))
    }
}

/// Durable sink for state changes.
pub trait Journal: Send + Sync {
    /// Durably record an event, returning its sequence number. When this
    /// returns `Err` the event must be treated as not written.
    fn record(&self, event: &JournalEvent) -> Result<u64, JournalError>;

    /// Current chain head.
    fn head(&self) -> ChainHead;
}

// ─── Memory backend ─────────────────────────────────────────────────

/// In-memory journal.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    state: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    head: ChainHead,
    records: Vec<JournalRecord>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            head: ChainHead::GENESIS,
            records: Vec::new(),
        }
    }
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record written so far.
    pub fn records(&self) -> Vec<JournalRecord> {
        self.state.lock().records.clone()
    }
}

impl Journal for MemoryJournal {
    fn record(&self, event: &JournalEvent) -> Result<u64, JournalError> {
        let mut state = self.state.lock();
        let prev = state.head;
        let (head, recorded_at) = prev.seal(event)?;
        state.records.push(JournalRecord {
            seq: head.seq,
            recorded_at,
            prev: prev.digest,
            digest: head.digest,
            event: event.clone(),
        });
        state.head = head;
        Ok(head.seq)
    }

    fn head(&self) -> ChainHead {
        self.state.lock().head
    }
}

// ─── File backend ───────────────────────────────────────────────────

/// Append-only JSON-lines journal file.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    /// Length of the file up to the last complete record.
    len: u64,
    head: ChainHead,
    poisoned: bool,
}

/// Verified contents of a journal file.
#[derive(Debug)]
pub struct JournalContents {
    pub records: Vec<JournalRecord>,
    pub head: ChainHead,
    /// Byte length of the verified prefix.
    pub valid_len: u64,
    /// Whether the file ends in an incomplete line.
    pub torn_tail: bool,
}

impl FileJournal {
    /// Open or create a journal file, verifying every existing record.
    /// Returns the journal positioned for appends and the records to
    /// replay.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalRecord>), JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let contents = verify_records(BufReader::new(&file))?;
        if contents.torn_tail {
            tracing::warn!(
                path = %path.display(),
                valid_len = contents.valid_len,
                "truncating torn journal tail"
            );
            file.set_len(contents.valid_len)?;
            file.sync_all()?;
        }

        tracing::info!(
            path = %path.display(),
            records = contents.records.len(),
            head = %contents.head.digest,
            "journal opened"
        );

        let journal = Self {
            path,
            state: Mutex::new(FileState {
                file,
                len: contents.valid_len,
                head: contents.head,
                poisoned: false,
            }),
        };
        Ok((journal, contents.records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn record(&self, event: &JournalEvent) -> Result<u64, JournalError> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(JournalError::Poisoned);
        }
        let prev = state.head;
        let (head, recorded_at) = prev.seal(event)?;
        let mut line = serde_json::to_vec(&RecordLine {
            seq: head.seq,
            recorded_at,
            prev: prev.digest,
            digest: head.digest,
            event,
        })?;
        line.push(b'\n');

        if let Err(err) = write_synced(&mut state.file, &line) {
            let good_len = state.len;
            // Drop any partial line so the next write starts on a boundary.
            if state.file.set_len(good_len).is_err() {
                state.poisoned = true;
            }
            tracing::error!(error = %err, event = event.name(), "journal write failed");
            return Err(err.into());
        }

        state.len += line.len() as u64;
        state.head = head;
        Ok(head.seq)
    }

    fn head(&self) -> ChainHead {
        self.state.lock().head
    }
}

fn write_synced(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}

/// Read and verify a JSON-lines journal. An incomplete final line is
/// reported through [`JournalContents::torn_tail`]; any other defect is an
/// error.
pub fn verify_records(mut reader: impl BufRead) -> Result<JournalContents, JournalError> {
    let mut records = Vec::new();
    let mut head = ChainHead::GENESIS;
    let mut valid_len = 0u64;
    let mut torn_tail = false;
    let mut buf = String::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let read = reader.read_line(&mut buf)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        if !buf.ends_with('\n') {
            torn_tail = true;
            break;
        }
        let text = buf.trim_end();
        if text.is_empty() {
            valid_len += read as u64;
            continue;
        }
        let record: JournalRecord =
            serde_json::from_str(text).map_err(|e| JournalError::Integrity {
                line: line_no,
                reason: format!("unparseable record: {e}"),
            })?;
        if record.seq != head.seq + 1 {
            return Err(JournalError::Integrity {
                line: line_no,
                reason: format!("expected seq {}, found {}", head.seq + 1, record.seq),
            });
        }
        if record.prev != head.digest {
            return Err(JournalError::Integrity {
                line: line_no,
                reason: "prev digest does not match chain head".into(),
            });
        }
        let expected = record_digest(&record.prev, record.seq, &record.recorded_at, &record.event)?;
        if expected != record.digest {
            return Err(JournalError::Integrity {
                line: line_no,
                reason: format!("digest mismatch: expected {expected}, found {}", record.digest),
            });
        }
        head = ChainHead {
            seq: record.seq,
            digest: record.digest,
        };
        valid_len += read as u64;
        records.push(record);
    }

    Ok(JournalContents {
        records,
        head,
        valid_len,
        torn_tail,
    })
}

/// Read and verify a journal file without opening it for writing.
pub fn read_journal(path: impl AsRef<Path>) -> Result<JournalContents, JournalError> {
    let file = File::open(path.as_ref())?;
    verify_records(BufReader::new(file))
}
