//! # Ledger Store
//!
//! Owns every [`LedgerEntry`]. Each vendor has a book holding its entries
//! in id order and a writer mutex. All mutations for a vendor run inside
//! [`LedgerStore::with_writer`], which holds that mutex for the whole
//! closure: admission checks, the journal write, and the in-memory commit
//! happen with no other writer for the same vendor interleaved. Different
//! vendors never contend.
//!
//! Reads take the book's read lock only long enough to copy or fold the
//! entries and never wait on a writer's admission work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use vledger_core::{Amount, EntryId, Timestamp, VendorId};

use crate::cache::{vendor_prefix, CacheInvalidation};
use crate::entry::{LedgerEntry, NewEntry};
use crate::error::LedgerError;
use crate::journal::{Journal, JournalEvent};

/// Page size used when a caller does not give one.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct VendorBook {
    writer: Mutex<()>,
    entries: RwLock<Vec<LedgerEntry>>,
}

impl VendorBook {
    fn balance(&self) -> Result<Amount, LedgerError> {
        let entries = self.entries.read();
        Amount::checked_sum(entries.iter().map(|e| e.amount))
            .map_err(|e| LedgerError::InvalidEntry(e.to_string()))
    }
}

/// Append-only, per-vendor ledger.
pub struct LedgerStore {
    journal: Arc<dyn Journal>,
    books: DashMap<VendorId, Arc<VendorBook>>,
    next_entry: AtomicU64,
    total_entries: AtomicU64,
    invalidation: Vec<Arc<dyn CacheInvalidation>>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("vendors", &self.books.len())
            .field("total_entries", &self.total_entries.load(Ordering::Relaxed))
            .finish()
    }
}

impl LedgerStore {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            books: DashMap::new(),
            next_entry: AtomicU64::new(EntryId::FIRST.value()),
            total_entries: AtomicU64::new(0),
            invalidation: Vec::new(),
        }
    }

    /// Register a cache to be invalidated under a vendor's prefix after
    /// every successful write for that vendor.
    pub fn with_invalidation(mut self, cache: Arc<dyn CacheInvalidation>) -> Self {
        self.invalidation.push(cache);
        self
    }

    pub fn journal(&self) -> &dyn Journal {
        self.journal.as_ref()
    }

    /// Create an empty book. Returns `false` when one already exists.
    pub(crate) fn open_book(&self, vendor_id: &VendorId) -> bool {
        let mut created = false;
        self.books.entry(vendor_id.clone()).or_insert_with(|| {
            created = true;
            Arc::new(VendorBook::default())
        });
        created
    }

    pub fn has_vendor(&self, vendor_id: &VendorId) -> bool {
        self.books.contains_key(vendor_id)
    }

    fn book(&self, vendor_id: &VendorId) -> Result<Arc<VendorBook>, LedgerError> {
        self.books
            .get(vendor_id)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| LedgerError::vendor_not_found(vendor_id))
    }

    /// Run `f` holding the vendor's writer mutex. Caches registered with
    /// [`with_invalidation`](Self::with_invalidation) drop the vendor's
    /// keys when `f` succeeds, before the mutex is released.
    pub fn with_writer<R>(
        &self,
        vendor_id: &VendorId,
        f: impl FnOnce(&mut VendorWriter<'_>) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        let book = self.book(vendor_id)?;
        let _guard = book.writer.lock();
        let mut writer = VendorWriter {
            store: self,
            vendor_id,
            book: &book,
        };
        let result = f(&mut writer)?;
        self.invalidate(vendor_id);
        Ok(result)
    }

    fn invalidate(&self, vendor_id: &VendorId) {
        if self.invalidation.is_empty() {
            return;
        }
        let prefix = vendor_prefix(vendor_id);
        for cache in &self.invalidation {
            cache.invalidate_prefix(&prefix);
        }
    }

    /// Validate, journal, and commit one entry.
    pub fn append(&self, draft: NewEntry) -> Result<LedgerEntry, LedgerError> {
        let vendor_id = draft.vendor_id.clone();
        self.with_writer(&vendor_id, |w| w.append(draft))
    }

    /// Entries with id strictly greater than `since`, in creation order.
    /// `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn entries_for(
        &self,
        vendor_id: &VendorId,
        since: Option<EntryId>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let book = self.book(vendor_id)?;
        let entries = book.entries.read();
        let start = match since {
            Some(cursor) => entries.partition_point(|e| e.id <= cursor),
            None => 0,
        };
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        Ok(entries.iter().skip(start).take(limit).cloned().collect())
    }

    /// Fold of all of the vendor's entry amounts.
    pub fn balance_of(&self, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        self.book(vendor_id)?.balance()
    }

    pub fn entry_count(&self, vendor_id: &VendorId) -> Result<usize, LedgerError> {
        Ok(self.book(vendor_id)?.entries.read().len())
    }

    /// Entries across all vendors.
    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }

    /// Put a journaled entry back during replay.
    pub(crate) fn restore(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let book = self.book(&entry.vendor_id)?;
        let mut entries = book.entries.write();
        if entries.last().is_some_and(|last| last.id >= entry.id) {
            return Err(LedgerError::Conflict(format!(
                "journal replays {} out of order for vendor {}",
                entry.id, entry.vendor_id
            )));
        }
        self.next_entry
            .fetch_max(entry.id.value() + 1, Ordering::SeqCst);
        entries.push(entry);
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Write access to one vendor's book, handed out by
/// [`LedgerStore::with_writer`].
pub struct VendorWriter<'a> {
    store: &'a LedgerStore,
    vendor_id: &'a VendorId,
    book: &'a VendorBook,
}

impl<'a> VendorWriter<'a> {
    pub fn vendor_id(&self) -> &VendorId {
        self.vendor_id
    }

    pub fn journal(&self) -> &dyn Journal {
        self.store.journal()
    }

    /// Current balance. Stable for the life of the writer except through
    /// this writer's own commits.
    pub fn balance(&self) -> Result<Amount, LedgerError> {
        self.book.balance()
    }

    /// Validate a draft and stamp it with an id and timestamp without
    /// committing it. Ids are consumed even if the caller later aborts.
    pub fn prepare(&self, draft: NewEntry) -> Result<LedgerEntry, LedgerError> {
        if &draft.vendor_id != self.vendor_id {
            return Err(LedgerError::InvalidEntry(format!(
                "entry for vendor {} written through vendor {}",
                draft.vendor_id, self.vendor_id
            )));
        }
        draft.validate()?;
        self.balance()?
            .checked_add(draft.amount)
            .map_err(|e| LedgerError::InvalidEntry(e.to_string()))?;
        let id = EntryId(self.store.next_entry.fetch_add(1, Ordering::SeqCst));
        Ok(draft.into_entry(id, Timestamp::now()))
    }

    /// Make a prepared entry visible. The caller must already have
    /// journaled it.
    pub fn commit(&mut self, entry: LedgerEntry) {
        self.book.entries.write().push(entry);
        self.store.total_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Prepare, journal, and commit one entry.
    pub fn append(&mut self, draft: NewEntry) -> Result<LedgerEntry, LedgerError> {
        let entry = self.prepare(draft)?;
        let event = JournalEvent::EntryAppended {
            entry: entry.clone(),
        };
        self.journal().record(&event)?;
        self.commit(entry.clone());
        tracing::debug!(
            vendor_id = %entry.vendor_id,
            entry_id = entry.id.value(),
            kind = %entry.kind,
            amount = entry.amount.minor_units(),
            "ledger entry appended"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::cache::TtlCache;
    use crate::entry::EntryKind;
    use crate::journal::testing::FlakyJournal;
    use crate::journal::MemoryJournal;

    fn vendor(id: &str) -> VendorId {
        VendorId::new(id).unwrap()
    }

    fn store_with(vendors: &[&str]) -> LedgerStore {
        let store = LedgerStore::new(Arc::new(MemoryJournal::new()));
        for v in vendors {
            store.open_book(&vendor(v));
        }
        store
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let store = store_with(&["a", "b"]);
        let e1 = store.append(NewEntry::charge(vendor("a"), Amount::new(10), None)).unwrap();
        let e2 = store.append(NewEntry::charge(vendor("b"), Amount::new(10), None)).unwrap();
        let e3 = store.append(NewEntry::charge(vendor("a"), Amount::new(10), None)).unwrap();
        assert_eq!(e1.id, EntryId(1));
        assert!(e2.id > e1.id && e3.id > e2.id);
        assert_eq!(store.total_entries(), 3);
    }

    #[test]
    fn append_to_unknown_vendor_is_not_found() {
        let store = store_with(&[]);
        let err = store
            .append(NewEntry::charge(vendor("ghost"), Amount::new(10), None))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn zero_amount_leaves_no_trace() {
        let store = store_with(&["a"]);
        let err = store
            .append(NewEntry::adjustment(vendor("a"), Amount::ZERO, None))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));
        assert_eq!(store.entry_count(&vendor("a")).unwrap(), 0);
    }

    #[test]
    fn journal_failure_leaves_no_trace() {
        let journal = Arc::new(FlakyJournal::default());
        let store = LedgerStore::new(journal.clone());
        store.open_book(&vendor("a"));
        journal.set_failing(true);
        let err = store
            .append(NewEntry::charge(vendor("a"), Amount::new(10), None))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Journal(_)));
        assert_eq!(store.balance_of(&vendor("a")).unwrap(), Amount::ZERO);
        assert!(journal.records().is_empty());
    }

    #[test]
    fn entries_for_pages_with_exclusive_cursor() {
        let store = store_with(&["a"]);
        for i in 1..=5 {
            store.append(NewEntry::charge(vendor("a"), Amount::new(i), None)).unwrap();
        }
        let page = store.entries_for(&vendor("a"), None, 2).unwrap();
        assert_eq!(page.iter().map(|e| e.id.value()).collect::<Vec<_>>(), vec![1, 2]);
        let page = store.entries_for(&vendor("a"), Some(EntryId(2)), 2).unwrap();
        assert_eq!(page.iter().map(|e| e.id.value()).collect::<Vec<_>>(), vec![3, 4]);
        let page = store.entries_for(&vendor("a"), Some(EntryId(5)), 10).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn entries_for_clamps_limit() {
        let store = store_with(&["a"]);
        for _ in 0..3 {
            store.append(NewEntry::charge(vendor("a"), Amount::new(1), None)).unwrap();
        }
        assert_eq!(store.entries_for(&vendor("a"), None, 0).unwrap().len(), 1);
        assert_eq!(store.entries_for(&vendor("a"), None, usize::MAX).unwrap().len(), 3);
    }

    #[test]
    fn overflowing_balance_is_invalid_entry() {
        let store = store_with(&["a"]);
        store.append(NewEntry::charge(vendor("a"), Amount::new(i64::MAX), None)).unwrap();
        let err = store
            .append(NewEntry::charge(vendor("a"), Amount::new(1), None))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));
    }

    #[test]
    fn writer_rejects_foreign_vendor_entry() {
        let store = store_with(&["a", "b"]);
        let err = store
            .with_writer(&vendor("a"), |w| {
                w.append(NewEntry::charge(vendor("b"), Amount::new(1), None))
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));
    }

    #[test]
    fn successful_write_invalidates_vendor_prefix() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 8));
        let store = LedgerStore::new(Arc::new(MemoryJournal::new()))
            .with_invalidation(cache.clone());
        store.open_book(&vendor("a"));
        cache.insert("vendor:a:summary", 1);
        cache.insert("vendor:b:summary", 2);
        store.append(NewEntry::charge(vendor("a"), Amount::new(5), None)).unwrap();
        assert_eq!(cache.get("vendor:a:summary"), None);
        assert_eq!(cache.get("vendor:b:summary"), Some(2));
    }

    #[test]
    fn restore_rejects_out_of_order_entries() {
        let store = store_with(&["a"]);
        let entry = NewEntry::charge(vendor("a"), Amount::new(5), None)
            .into_entry(EntryId(7), Timestamp::now());
        store.restore(entry.clone()).unwrap();
        assert!(store.restore(entry).is_err());
        let next = store.append(NewEntry::charge(vendor("a"), Amount::new(1), None)).unwrap();
        assert_eq!(next.id, EntryId(8));
    }

    fn arb_draft() -> impl Strategy<Value = (EntryKind, i64)> {
        prop_oneof![
            (1i64..1_000_000).prop_map(|a| (EntryKind::Charge, a)),
            (1i64..1_000_000).prop_map(|a| (EntryKind::CashCollection, -a)),
            (-1_000_000i64..1_000_000)
                .prop_filter("non-zero", |a| *a != 0)
                .prop_map(|a| (EntryKind::Adjustment, a)),
        ]
    }

    proptest! {
        #[test]
        fn balance_equals_sum_of_appended_amounts(drafts in proptest::collection::vec(arb_draft(), 0..60)) {
            let store = store_with(&["p"]);
            let mut expected = 0i64;
            for (kind, amount) in drafts {
                let draft = NewEntry {
                    vendor_id: vendor("p"),
                    amount: Amount::new(amount),
                    kind,
                    related_settlement_id: None,
                    related_withdrawal_id: None,
                    related_booking_id: None,
                    memo: None,
                };
                store.append(draft).unwrap();
                expected += amount;
            }
            prop_assert_eq!(store.balance_of(&vendor("p")).unwrap(), Amount::new(expected));
        }
    }
}
