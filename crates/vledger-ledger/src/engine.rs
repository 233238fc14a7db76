//! # Ledger Engine
//!
//! Wires the store, projector, status gate, and both workflows around one
//! journal and one summary cache, and rebuilds all of them from journal
//! records on startup.

use std::sync::Arc;
use std::time::Duration;

use vledger_core::{Amount, EntryId, VendorId};
use vledger_state::VendorAccount;

use crate::cache::TtlCache;
use crate::entry::{EntryKind, LedgerEntry, NewEntry};
use crate::error::LedgerError;
use crate::gate::VendorStatusGate;
use crate::journal::{Journal, JournalError, JournalEvent, JournalRecord};
use crate::projector::{BalanceProjector, VendorSummary};
use crate::requests::{RequestBook, StatusCounts};
use crate::store::LedgerStore;
use crate::workflow::{SettlementWorkflow, WithdrawalWorkflow, WorkflowPolicy};

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Smallest withdrawal a vendor may request.
    pub withdrawal_min_amount: Amount,
    /// Cash limit for vendors registered without one.
    pub default_cash_limit: Amount,
    /// Lifetime of cached vendor summaries.
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            withdrawal_min_amount: Amount::new(100),
            default_cash_limit: Amount::new(500_000),
            cache_ttl: Duration::from_secs(30),
            cache_capacity: 10_000,
        }
    }
}

/// Point-in-time counts for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub vendors_active: usize,
    pub vendors_blocked: usize,
    pub settlements: StatusCounts,
    pub withdrawals: StatusCounts,
    pub ledger_entries: u64,
    pub journal_seq: u64,
}

/// The vendor ledger.
#[derive(Debug)]
pub struct LedgerEngine {
    store: Arc<LedgerStore>,
    projector: Arc<BalanceProjector>,
    gate: Arc<VendorStatusGate>,
    settlements: SettlementWorkflow,
    withdrawals: WithdrawalWorkflow,
    cache: Arc<TtlCache<VendorSummary>>,
}

impl LedgerEngine {
    /// An empty engine writing to `journal`.
    pub fn new(config: EngineConfig, journal: Arc<dyn Journal>) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache_ttl, config.cache_capacity));
        let store = Arc::new(LedgerStore::new(journal).with_invalidation(cache.clone()));
        let settlement_book = Arc::new(RequestBook::new());
        let withdrawal_book = Arc::new(RequestBook::new());
        let projector = Arc::new(BalanceProjector::new(
            store.clone(),
            settlement_book.clone(),
            withdrawal_book.clone(),
            cache.clone(),
        ));
        let gate = Arc::new(VendorStatusGate::new(store.clone(), config.default_cash_limit));
        let settlements = SettlementWorkflow::new(
            settlement_book,
            store.clone(),
            projector.clone(),
            gate.clone(),
            WorkflowPolicy::default(),
        );
        let withdrawals = WithdrawalWorkflow::new(
            withdrawal_book,
            store.clone(),
            projector.clone(),
            gate.clone(),
            WorkflowPolicy {
                min_amount: config.withdrawal_min_amount,
            },
        );
        Self {
            store,
            projector,
            gate,
            settlements,
            withdrawals,
            cache,
        }
    }

    /// Rebuild an engine from journal records. `journal` must already be
    /// positioned after the last record so new writes continue the chain.
    pub fn replay(
        config: EngineConfig,
        journal: Arc<dyn Journal>,
        records: impl IntoIterator<Item = JournalRecord>,
    ) -> Result<Self, LedgerError> {
        let engine = Self::new(config, journal);
        let mut applied = 0u64;
        for (idx, record) in records.into_iter().enumerate() {
            let expected = applied + 1;
            if record.seq != expected {
                return Err(JournalError::Integrity {
                    line: idx + 1,
                    reason: format!("expected seq {expected}, found {}", record.seq),
                }
                .into());
            }
            engine.apply(record.event)?;
            applied = expected;
        }
        tracing::info!(
            records = applied,
            vendors = engine.gate.list().len(),
            entries = engine.store.total_entries(),
            "journal replayed"
        );
        Ok(engine)
    }

    fn apply(&self, event: JournalEvent) -> Result<(), LedgerError> {
        match event {
            JournalEvent::VendorRegistered { account } | JournalEvent::VendorUpdated { account } => {
                self.gate.restore(account)
            }
            JournalEvent::EntryAppended { entry } => self.store.restore(entry)?,
            JournalEvent::SettlementOpened { request }
            | JournalEvent::SettlementRejected { request } => {
                self.settlements.book().restore(request)
            }
            JournalEvent::SettlementApproved { request, payout } => {
                self.store.restore(payout)?;
                self.settlements.book().restore(request);
            }
            JournalEvent::WithdrawalOpened { request }
            | JournalEvent::WithdrawalRejected { request } => {
                self.withdrawals.book().restore(request)
            }
            JournalEvent::WithdrawalApproved { request, payout } => {
                self.store.restore(payout)?;
                self.withdrawals.book().restore(request);
            }
        }
        Ok(())
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn projector(&self) -> &BalanceProjector {
        &self.projector
    }

    pub fn gate(&self) -> &VendorStatusGate {
        &self.gate
    }

    pub fn settlements(&self) -> &SettlementWorkflow {
        &self.settlements
    }

    pub fn withdrawals(&self) -> &WithdrawalWorkflow {
        &self.withdrawals
    }

    pub fn cache(&self) -> &TtlCache<VendorSummary> {
        &self.cache
    }

    pub fn register_vendor(
        &self,
        vendor_id: VendorId,
        cash_limit: Option<Amount>,
    ) -> Result<VendorAccount, LedgerError> {
        self.gate.register(vendor_id, cash_limit)
    }

    /// Admin write of a charge or adjustment. Payouts are written only by
    /// the workflows and cash collections only through the gate.
    pub fn post_entry(&self, draft: NewEntry) -> Result<LedgerEntry, LedgerError> {
        if !matches!(draft.kind, EntryKind::Charge | EntryKind::Adjustment) {
            return Err(LedgerError::InvalidEntry(format!(
                "{} entries cannot be posted directly",
                draft.kind
            )));
        }
        self.store.append(draft)
    }

    pub fn entries_for(
        &self,
        vendor_id: &VendorId,
        since: Option<EntryId>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.entries_for(vendor_id, since, limit)
    }

    /// Every vendor account paired with its summary, served from the TTL
    /// cache.
    pub fn vendor_summaries(&self) -> Result<Vec<(VendorAccount, VendorSummary)>, LedgerError> {
        self.gate
            .list()
            .into_iter()
            .map(|account| {
                let summary = self.projector.cached_summary(&account.vendor_id)?;
                Ok((account, summary))
            })
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        let (vendors_active, vendors_blocked) = self.gate.counts();
        EngineStats {
            vendors_active,
            vendors_blocked,
            settlements: self.settlements.book().counts(),
            withdrawals: self.withdrawals.book().counts(),
            ledger_entries: self.store.total_entries(),
            journal_seq: self.store.journal().head().seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use vledger_core::{SettlementId, WithdrawalId};
    use vledger_state::RequestStatus;

    use super::*;
    use crate::journal::testing::FlakyJournal;
    use crate::journal::{FileJournal, MemoryJournal};

    fn vendor(id: &str) -> VendorId {
        VendorId::new(id).unwrap()
    }

    fn engine_with_balance(balance: i64) -> LedgerEngine {
        let engine = LedgerEngine::new(EngineConfig::default(), Arc::new(MemoryJournal::new()));
        engine.register_vendor(vendor("v"), None).unwrap();
        if balance > 0 {
            engine
                .post_entry(NewEntry::charge(vendor("v"), Amount::new(balance), None))
                .unwrap();
        }
        engine
    }

    fn payouts(engine: &LedgerEngine) -> Vec<LedgerEntry> {
        engine
            .entries_for(&vendor("v"), None, 1000)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EntryKind::Payout)
            .collect()
    }

    #[test]
    fn second_overdrawing_settlement_is_refused_at_creation() {
        let engine = engine_with_balance(1000);
        let first = engine
            .settlements()
            .create(&vendor("v"), Amount::new(700), "v", None)
            .unwrap();
        assert!(!first.replayed);
        assert_eq!(
            engine.projector().available_for_withdrawal(&vendor("v")).unwrap(),
            Amount::new(300)
        );
        let err = engine
            .settlements()
            .create(&vendor("v"), Amount::new(700), "v", None)
            .unwrap_err();
        match err {
            LedgerError::InsufficientBalance {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, Amount::new(700));
                assert_eq!(available, Amount::new(300));
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_overdrawing_creates_admit_exactly_one() {
        let engine = Arc::new(engine_with_balance(1000));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        engine
                            .settlements()
                            .create(&vendor("v"), Amount::new(700), "v", None)
                            .map(|_| ())
                    } else {
                        engine
                            .withdrawals()
                            .create(&vendor("v"), Amount::new(700), "v", None)
                            .map(|_| ())
                    }
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(admitted, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LedgerError::InsufficientBalance { .. })));
        assert_eq!(
            engine.projector().available_for_withdrawal(&vendor("v")).unwrap(),
            Amount::new(300)
        );
    }

    #[test]
    fn double_approval_writes_one_payout() {
        let engine = engine_with_balance(1000);
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(700), "v", None)
            .unwrap()
            .request
            .id;
        let approved = engine
            .settlements()
            .approve(id, "admin", Some("bank transfer".into()))
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        let err = engine.settlements().approve(id, "admin", None).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyDecided { .. }));

        let payouts = payouts(&engine);
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, Amount::new(-700));
        assert_eq!(payouts[0].related_settlement_id, Some(id));
        assert_eq!(approved.payout_entry_id, Some(payouts[0].id));
        assert_eq!(
            engine.projector().balance_of(&vendor("v")).unwrap(),
            Amount::new(300)
        );
        assert_eq!(
            engine.projector().available_for_withdrawal(&vendor("v")).unwrap(),
            Amount::new(300)
        );
    }

    #[test]
    fn concurrent_approvals_write_one_payout() {
        let engine = Arc::new(engine_with_balance(1000));
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(400), "v", None)
            .unwrap()
            .request
            .id;
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || engine.settlements().approve(id, "admin", None).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(payouts(&engine).len(), 1);
    }

    #[test]
    fn rejection_never_touches_ledger() {
        let engine = engine_with_balance(1000);
        let id = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(500), "v", None)
            .unwrap()
            .request
            .id;
        let before = engine.entries_for(&vendor("v"), None, 1000).unwrap();
        let rejected = engine
            .withdrawals()
            .reject(id, "admin", "bank details missing")
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(engine.entries_for(&vendor("v"), None, 1000).unwrap(), before);
        assert_eq!(
            engine.projector().available_for_withdrawal(&vendor("v")).unwrap(),
            Amount::new(1000)
        );
    }

    #[test]
    fn empty_rejection_reason_is_validation_error() {
        let engine = engine_with_balance(1000);
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(100), "v", None)
            .unwrap()
            .request
            .id;
        let err = engine.settlements().reject(id, "admin", "").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(engine.settlements().get(id).unwrap().is_pending());
    }

    #[test]
    fn blocking_does_not_change_approvability() {
        let engine = engine_with_balance(1000);
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(600), "v", None)
            .unwrap()
            .request
            .id;
        engine.gate().block(&vendor("v"), "admin").unwrap();
        assert!(matches!(
            engine
                .settlements()
                .create(&vendor("v"), Amount::new(10), "v", None),
            Err(LedgerError::VendorBlocked(_))
        ));
        let approved = engine.settlements().approve(id, "admin", None).unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
    }

    #[test]
    fn approval_requires_covering_balance() {
        let engine = engine_with_balance(1000);
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(800), "v", None)
            .unwrap()
            .request
            .id;
        engine
            .post_entry(NewEntry::adjustment(vendor("v"), Amount::new(-500), Some("refund".into())))
            .unwrap();
        let err = engine.settlements().approve(id, "admin", None).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(engine.settlements().get(id).unwrap().is_pending());
        assert!(payouts(&engine).is_empty());
    }

    #[test]
    fn withdrawal_minimum_is_enforced() {
        let engine = engine_with_balance(1000);
        let err = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(99), "v", None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(engine
            .settlements()
            .create(&vendor("v"), Amount::new(99), "v", None)
            .is_ok());
    }

    #[test]
    fn non_positive_and_unknown_vendor_rejected() {
        let engine = engine_with_balance(1000);
        assert!(matches!(
            engine
                .settlements()
                .create(&vendor("v"), Amount::ZERO, "v", None),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            engine
                .settlements()
                .create(&vendor("ghost"), Amount::new(5), "v", None),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            engine.settlements().approve(SettlementId(42), "admin", None),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn idempotent_create_returns_original() {
        let engine = engine_with_balance(1000);
        let first = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(300), "v", Some("key-1".into()))
            .unwrap();
        let again = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(300), "v", Some("key-1".into()))
            .unwrap();
        assert!(again.replayed);
        assert_eq!(again.request.id, first.request.id);
        assert_eq!(engine.withdrawals().pending().len(), 1);

        let err = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(301), "v", Some("key-1".into()))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn settlement_and_withdrawal_ids_are_independent() {
        let engine = engine_with_balance(1000);
        let s = engine
            .settlements()
            .create(&vendor("v"), Amount::new(100), "v", None)
            .unwrap();
        let w = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(100), "v", None)
            .unwrap();
        assert_eq!(s.request.id, SettlementId(1));
        assert_eq!(w.request.id, WithdrawalId(1));
    }

    #[test]
    fn history_lists_decided_most_recent_first() {
        let engine = engine_with_balance(1000);
        let ids: Vec<_> = (0..3)
            .map(|_| {
                engine
                    .settlements()
                    .create(&vendor("v"), Amount::new(100), "v", None)
                    .unwrap()
                    .request
                    .id
            })
            .collect();
        engine.settlements().reject(ids[0], "admin", "dup").unwrap();
        engine.settlements().approve(ids[2], "admin", None).unwrap();
        let history = engine.settlements().history();
        assert_eq!(history.len(), 2);
        assert_eq!(engine.settlements().pending().len(), 1);
        assert_eq!(engine.settlements().list_for_vendor(&vendor("v")).len(), 3);
    }

    #[test]
    fn post_entry_rejects_payout_and_cash_kinds() {
        let engine = engine_with_balance(0);
        let draft = NewEntry::cash_collection(vendor("v"), Amount::new(10), None).unwrap();
        assert!(matches!(
            engine.post_entry(draft),
            Err(LedgerError::InvalidEntry(_))
        ));
    }

    #[test]
    fn failed_journal_write_on_approval_leaves_request_pending() {
        let journal = Arc::new(FlakyJournal::default());
        let engine = LedgerEngine::new(EngineConfig::default(), journal.clone());
        engine.register_vendor(vendor("v"), None).unwrap();
        engine
            .post_entry(NewEntry::charge(vendor("v"), Amount::new(1000), None))
            .unwrap();
        let id = engine
            .settlements()
            .create(&vendor("v"), Amount::new(500), "v", None)
            .unwrap()
            .request
            .id;

        journal.set_failing(true);
        let err = engine.settlements().approve(id, "admin", None).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(engine.settlements().get(id).unwrap().is_pending());
        assert!(payouts(&engine).is_empty());

        journal.set_failing(false);
        engine.settlements().approve(id, "admin", None).unwrap();
        assert_eq!(payouts(&engine).len(), 1);
    }

    #[test]
    fn listing_reflects_writes_despite_cache() {
        let engine = engine_with_balance(1000);
        let before = engine.vendor_summaries().unwrap();
        assert_eq!(before[0].0.vendor_id, vendor("v"));
        assert_eq!(before[0].1.available, Amount::new(1000));
        engine
            .settlements()
            .create(&vendor("v"), Amount::new(250), "v", None)
            .unwrap();
        let after = engine.vendor_summaries().unwrap();
        assert_eq!(after[0].1.available, Amount::new(750));
        assert_eq!(after[0].1.pending_reserved, Amount::new(250));
    }

    #[test]
    fn listing_is_fresh_after_write_during_cache_fill() {
        let engine = engine_with_balance(0);
        let key = format!("{}summary", crate::cache::vendor_prefix(&vendor("v")));
        let stale = engine
            .cache()
            .get_or_try_insert(&key, || {
                let summary = engine.projector().summary(&vendor("v"));
                engine
                    .post_entry(NewEntry::charge(vendor("v"), Amount::new(500), None))
                    .unwrap();
                summary
            })
            .unwrap();
        assert_eq!(stale.balance, Amount::ZERO);

        let listed = engine.vendor_summaries().unwrap();
        assert_eq!(listed[0].1.balance, Amount::new(500));
        assert_eq!(
            listed[0].1.balance,
            engine.projector().balance_of(&vendor("v")).unwrap()
        );
    }

    fn populate(engine: &LedgerEngine) -> (SettlementId, WithdrawalId) {
        engine.register_vendor(vendor("v"), Some(Amount::new(2000))).unwrap();
        engine.register_vendor(vendor("w"), None).unwrap();
        engine
            .post_entry(NewEntry::charge(vendor("v"), Amount::new(5000), Some("bk-1".into())))
            .unwrap();
        engine
            .gate()
            .record_cash_collection(&vendor("w"), Amount::new(150), None)
            .unwrap();
        let s = engine
            .settlements()
            .create(&vendor("v"), Amount::new(1200), "v", None)
            .unwrap()
            .request
            .id;
        engine.settlements().approve(s, "admin", None).unwrap();
        let w = engine
            .withdrawals()
            .create(&vendor("v"), Amount::new(800), "v", Some("wd-1".into()))
            .unwrap()
            .request
            .id;
        engine.gate().block(&vendor("w"), "admin").unwrap();
        (s, w)
    }

    #[test]
    fn replay_reproduces_state() {
        let journal = Arc::new(MemoryJournal::new());
        let original = LedgerEngine::new(EngineConfig::default(), journal.clone());
        let (s, w) = populate(&original);

        let replayed = LedgerEngine::replay(
            EngineConfig::default(),
            Arc::new(MemoryJournal::new()),
            journal.records(),
        )
        .unwrap();
        for v in ["v", "w"] {
            assert_eq!(
                replayed.projector().summary(&vendor(v)).unwrap(),
                original.projector().summary(&vendor(v)).unwrap()
            );
        }
        assert_eq!(replayed.settlements().get(s).unwrap(), original.settlements().get(s).unwrap());
        assert_eq!(replayed.withdrawals().get(w).unwrap().status, RequestStatus::Pending);
        assert!(replayed.gate().account(&vendor("w")).unwrap().blocked);
        assert_eq!(
            replayed
                .withdrawals()
                .book()
                .find_idempotent(&vendor("v"), "wd-1")
                .map(|r| r.id),
            Some(w)
        );

        let next_s = replayed
            .settlements()
            .create(&vendor("v"), Amount::new(100), "v", None)
            .unwrap();
        assert_eq!(next_s.request.id, SettlementId(2));
    }

    #[test]
    fn file_journal_round_trip_through_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let expected = {
            let (journal, records) = FileJournal::open(&path).unwrap();
            let engine = LedgerEngine::replay(EngineConfig::default(), Arc::new(journal), records)
                .unwrap();
            populate(&engine);
            engine.projector().summary(&vendor("v")).unwrap()
        };

        let (journal, records) = FileJournal::open(&path).unwrap();
        let engine =
            LedgerEngine::replay(EngineConfig::default(), Arc::new(journal), records).unwrap();
        assert_eq!(engine.projector().summary(&vendor("v")).unwrap(), expected);
        engine
            .post_entry(NewEntry::charge(vendor("v"), Amount::new(1), None))
            .unwrap();
        assert!(crate::journal::read_journal(&path).is_ok());
    }

    #[test]
    fn replay_rejects_sequence_gap() {
        let journal = Arc::new(MemoryJournal::new());
        let engine = LedgerEngine::new(EngineConfig::default(), journal.clone());
        populate(&engine);
        let mut records = journal.records();
        records.remove(1);
        let err = LedgerEngine::replay(
            EngineConfig::default(),
            Arc::new(MemoryJournal::new()),
            records,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Journal(JournalError::Integrity { line: 2, .. })));
    }

    #[test]
    fn stats_count_vendors_and_requests() {
        let engine = LedgerEngine::new(EngineConfig::default(), Arc::new(MemoryJournal::new()));
        populate(&engine);
        let stats = engine.stats();
        assert_eq!(stats.vendors_active, 1);
        assert_eq!(stats.vendors_blocked, 1);
        assert_eq!(stats.settlements.approved, 1);
        assert_eq!(stats.withdrawals.pending, 1);
        assert_eq!(stats.ledger_entries, 3);
    }
}
