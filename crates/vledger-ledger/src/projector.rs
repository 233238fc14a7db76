//! # Balance Projector
//!
//! Derives balances from the live ledger and the pending request books.
//! Nothing here stores a balance: every figure is recomputed from the
//! entries at the moment of the call. The only cached view is the vendor
//! summary served to the listing endpoint, and that cache is invalidated
//! by the ledger store on every write for the vendor.

use std::sync::Arc;

use serde::Serialize;

use vledger_core::{Amount, SettlementId, VendorId, WithdrawalId};
use vledger_state::cash_exposure;

use crate::cache::{vendor_prefix, TtlCache};
use crate::error::LedgerError;
use crate::requests::RequestBook;
use crate::store::{LedgerStore, VendorWriter};

/// Balance figures for one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorSummary {
    pub vendor_id: VendorId,
    /// Sum of all ledger entries.
    pub balance: Amount,
    /// Sum of pending settlement and withdrawal amounts.
    pub pending_reserved: Amount,
    /// `balance - pending_reserved`.
    pub available: Amount,
    pub entry_count: usize,
    /// `max(0, -balance)`.
    pub cash_exposure: Amount,
}

/// Computes balances from the ledger store and request books.
#[derive(Debug)]
pub struct BalanceProjector {
    store: Arc<LedgerStore>,
    settlements: Arc<RequestBook<SettlementId>>,
    withdrawals: Arc<RequestBook<WithdrawalId>>,
    cache: Arc<TtlCache<VendorSummary>>,
}

impl BalanceProjector {
    pub fn new(
        store: Arc<LedgerStore>,
        settlements: Arc<RequestBook<SettlementId>>,
        withdrawals: Arc<RequestBook<WithdrawalId>>,
        cache: Arc<TtlCache<VendorSummary>>,
    ) -> Self {
        Self {
            store,
            settlements,
            withdrawals,
            cache,
        }
    }

    /// Fold of all the vendor's entries.
    pub fn balance_of(&self, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        self.store.balance_of(vendor_id)
    }

    /// Amount reserved by the vendor's pending settlements and withdrawals.
    pub fn reserved_for(&self, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        self.settlements
            .pending_total(vendor_id)?
            .checked_add(self.withdrawals.pending_total(vendor_id)?)
            .map_err(LedgerError::from)
    }

    /// Balance minus pending reservations.
    pub fn available_for_withdrawal(&self, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        let balance = self.balance_of(vendor_id)?;
        self.available_from(balance, vendor_id)
    }

    /// Available balance as seen by a writer holding the vendor's lock.
    /// Exact: no other request or entry for the vendor can commit while
    /// the writer is alive.
    pub(crate) fn available_locked(&self, writer: &VendorWriter<'_>) -> Result<Amount, LedgerError> {
        let balance = writer.balance()?;
        self.available_from(balance, writer.vendor_id())
    }

    fn available_from(&self, balance: Amount, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        balance
            .checked_sub(self.reserved_for(vendor_id)?)
            .map_err(LedgerError::from)
    }

    /// Live summary for one vendor.
    pub fn summary(&self, vendor_id: &VendorId) -> Result<VendorSummary, LedgerError> {
        let balance = self.balance_of(vendor_id)?;
        let pending_reserved = self.reserved_for(vendor_id)?;
        Ok(VendorSummary {
            vendor_id: vendor_id.clone(),
            balance,
            pending_reserved,
            available: balance.checked_sub(pending_reserved)?,
            entry_count: self.store.entry_count(vendor_id)?,
            cash_exposure: cash_exposure(balance),
        })
    }

    /// Summary through the TTL cache.
    pub fn cached_summary(&self, vendor_id: &VendorId) -> Result<VendorSummary, LedgerError> {
        let key = format!("{}summary", vendor_prefix(vendor_id));
        self.cache
            .get_or_try_insert(&key, || self.summary(vendor_id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vledger_core::Timestamp;
    use vledger_state::PayoutRequest;

    use super::*;
    use crate::cache::CacheInvalidation;
    use crate::entry::NewEntry;
    use crate::journal::MemoryJournal;

    struct Fixture {
        store: Arc<LedgerStore>,
        settlements: Arc<RequestBook<SettlementId>>,
        withdrawals: Arc<RequestBook<WithdrawalId>>,
        projector: BalanceProjector,
        cache: Arc<TtlCache<VendorSummary>>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 64));
        let store = Arc::new(
            LedgerStore::new(Arc::new(MemoryJournal::new())).with_invalidation(cache.clone()),
        );
        store.open_book(&vendor());
        let settlements = Arc::new(RequestBook::new());
        let withdrawals = Arc::new(RequestBook::new());
        let projector = BalanceProjector::new(
            store.clone(),
            settlements.clone(),
            withdrawals.clone(),
            cache.clone(),
        );
        Fixture {
            store,
            settlements,
            withdrawals,
            projector,
            cache,
        }
    }

    fn vendor() -> VendorId {
        VendorId::new("v-1").unwrap()
    }

    #[test]
    fn available_subtracts_both_kinds_of_pending() {
        let f = fixture();
        f.store
            .append(NewEntry::charge(vendor(), Amount::new(1000), None))
            .unwrap();
        let s = f.settlements.allocate_id();
        f.settlements.put(
            PayoutRequest::open(s, vendor(), Amount::new(300), "v", None, Timestamp::now()).unwrap(),
        );
        let w = f.withdrawals.allocate_id();
        f.withdrawals.put(
            PayoutRequest::open(w, vendor(), Amount::new(200), "v", None, Timestamp::now()).unwrap(),
        );

        assert_eq!(f.projector.balance_of(&vendor()).unwrap(), Amount::new(1000));
        assert_eq!(f.projector.reserved_for(&vendor()).unwrap(), Amount::new(500));
        assert_eq!(
            f.projector.available_for_withdrawal(&vendor()).unwrap(),
            Amount::new(500)
        );
    }

    #[test]
    fn summary_reports_cash_exposure() {
        let f = fixture();
        f.store
            .append(NewEntry::cash_collection(vendor(), Amount::new(400), None).unwrap())
            .unwrap();
        let summary = f.projector.summary(&vendor()).unwrap();
        assert_eq!(summary.balance, Amount::new(-400));
        assert_eq!(summary.cash_exposure, Amount::new(400));
        assert_eq!(summary.entry_count, 1);
    }

    #[test]
    fn cached_summary_is_refreshed_after_write() {
        let f = fixture();
        let before = f.projector.cached_summary(&vendor()).unwrap();
        assert_eq!(before.balance, Amount::ZERO);
        assert_eq!(f.cache.len(), 1);

        f.store
            .append(NewEntry::charge(vendor(), Amount::new(250), None))
            .unwrap();
        let after = f.projector.cached_summary(&vendor()).unwrap();
        assert_eq!(after.balance, Amount::new(250));
    }

    #[test]
    fn unknown_vendor_is_not_found() {
        let f = fixture();
        let ghost = VendorId::new("ghost").unwrap();
        assert!(matches!(
            f.projector.summary(&ghost),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(f.cache.invalidate_prefix("vendor:"), 0);
    }
}
