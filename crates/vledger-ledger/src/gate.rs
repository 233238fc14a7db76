//! # Vendor Status Gate
//!
//! Holds every [`VendorAccount`] and applies admin status changes. The
//! workflows consult the gate before admitting a new request, and cash
//! collections are admitted here against the vendor's cash limit.
//!
//! Status changes run under the vendor's writer lock so that a block and a
//! concurrent request creation are strictly ordered: a request admitted
//! before the block stays pending and decidable, a request attempted after
//! it fails with `VendorBlocked`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use vledger_core::{Amount, Timestamp, VendorId};
use vledger_state::VendorAccount;

use crate::entry::{LedgerEntry, NewEntry};
use crate::error::LedgerError;
use crate::journal::JournalEvent;
use crate::store::LedgerStore;

/// Vendor account registry and admission checks.
#[derive(Debug)]
pub struct VendorStatusGate {
    store: Arc<LedgerStore>,
    accounts: RwLock<BTreeMap<VendorId, VendorAccount>>,
    registration: Mutex<()>,
    default_cash_limit: Amount,
}

impl VendorStatusGate {
    pub fn new(store: Arc<LedgerStore>, default_cash_limit: Amount) -> Self {
        Self {
            store,
            accounts: RwLock::new(BTreeMap::new()),
            registration: Mutex::new(()),
            default_cash_limit,
        }
    }

    pub fn default_cash_limit(&self) -> Amount {
        self.default_cash_limit
    }

    /// Create a vendor account and its empty ledger book.
    pub fn register(
        &self,
        vendor_id: VendorId,
        cash_limit: Option<Amount>,
    ) -> Result<VendorAccount, LedgerError> {
        let _guard = self.registration.lock();
        if self.accounts.read().contains_key(&vendor_id) {
            return Err(LedgerError::Conflict(format!(
                "vendor {vendor_id} is already registered"
            )));
        }
        let account = VendorAccount::register(
            vendor_id,
            cash_limit.unwrap_or(self.default_cash_limit),
            Timestamp::now(),
        )?;
        self.store.journal().record(&JournalEvent::VendorRegistered {
            account: account.clone(),
        })?;
        self.install(account.clone());
        tracing::info!(
            vendor_id = %account.vendor_id,
            cash_limit = account.cash_limit.minor_units(),
            "vendor registered"
        );
        Ok(account)
    }

    pub fn account(&self, vendor_id: &VendorId) -> Result<VendorAccount, LedgerError> {
        self.accounts
            .read()
            .get(vendor_id)
            .cloned()
            .ok_or_else(|| LedgerError::vendor_not_found(vendor_id))
    }

    /// All accounts in vendor id order.
    pub fn list(&self) -> Vec<VendorAccount> {
        self.accounts.read().values().cloned().collect()
    }

    /// `(active, blocked)` account counts.
    pub fn counts(&self) -> (usize, usize) {
        let accounts = self.accounts.read();
        let blocked = accounts.values().filter(|a| a.blocked).count();
        (accounts.len() - blocked, blocked)
    }

    /// Block a vendor. Blocking an already-blocked vendor is a no-op.
    pub fn block(&self, vendor_id: &VendorId, actor: &str) -> Result<VendorAccount, LedgerError> {
        self.update(vendor_id, |account| Ok(account.block(actor, Timestamp::now())))
    }

    /// Unblock a vendor. Unblocking an active vendor is a no-op.
    pub fn unblock(&self, vendor_id: &VendorId, actor: &str) -> Result<VendorAccount, LedgerError> {
        self.update(vendor_id, |account| Ok(account.unblock(actor, Timestamp::now())))
    }

    /// Replace the vendor's cash limit. Negative limits are rejected.
    pub fn set_cash_limit(
        &self,
        vendor_id: &VendorId,
        limit: Amount,
        actor: &str,
    ) -> Result<VendorAccount, LedgerError> {
        self.update(vendor_id, |account| {
            account.set_cash_limit(limit, actor, Timestamp::now())?;
            Ok(true)
        })
    }

    /// Apply `change` under the vendor's writer lock; journal and commit
    /// only when it reports a change.
    fn update(
        &self,
        vendor_id: &VendorId,
        change: impl FnOnce(&mut VendorAccount) -> Result<bool, LedgerError>,
    ) -> Result<VendorAccount, LedgerError> {
        self.store.with_writer(vendor_id, |writer| {
            let mut account = self.account(vendor_id)?;
            if !change(&mut account)? {
                return Ok(account);
            }
            writer.journal().record(&JournalEvent::VendorUpdated {
                account: account.clone(),
            })?;
            self.accounts
                .write()
                .insert(vendor_id.clone(), account.clone());
            tracing::info!(
                vendor_id = %vendor_id,
                blocked = account.blocked,
                cash_limit = account.cash_limit.minor_units(),
                "vendor status changed"
            );
            Ok(account)
        })
    }

    /// Admission check for a new settlement or withdrawal request.
    pub fn admit_request(&self, vendor_id: &VendorId) -> Result<(), LedgerError> {
        self.account(vendor_id)?.admit_request()?;
        Ok(())
    }

    /// Record cash the vendor collected from a customer. Refused when the
    /// vendor is blocked or when the resulting exposure would exceed the
    /// cash limit.
    pub fn record_cash_collection(
        &self,
        vendor_id: &VendorId,
        collected: Amount,
        booking_id: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let draft = NewEntry::cash_collection(vendor_id.clone(), collected, booking_id)?;
        draft.validate()?;
        self.store.with_writer(vendor_id, |writer| {
            let account = self.account(vendor_id)?;
            let balance_after = writer
                .balance()?
                .checked_add(draft.amount)
                .map_err(|e| LedgerError::InvalidEntry(e.to_string()))?;
            if let Err(err) = account.admit_cash_collection(balance_after) {
                tracing::warn!(vendor_id = %vendor_id, error = %err, "cash collection refused");
                return Err(err.into());
            }
            writer.append(draft)
        })
    }

    /// Put a journaled account back during replay.
    pub(crate) fn restore(&self, account: VendorAccount) {
        self.install(account);
    }

    fn install(&self, account: VendorAccount) {
        self.store.open_book(&account.vendor_id);
        self.accounts
            .write()
            .insert(account.vendor_id.clone(), account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;

    fn vendor(id: &str) -> VendorId {
        VendorId::new(id).unwrap()
    }

    fn gate() -> (Arc<LedgerStore>, VendorStatusGate) {
        let store = Arc::new(LedgerStore::new(Arc::new(MemoryJournal::new())));
        let gate = VendorStatusGate::new(store.clone(), Amount::new(1000));
        (store, gate)
    }

    #[test]
    fn register_uses_default_limit_and_opens_book() {
        let (store, gate) = gate();
        let acc = gate.register(vendor("a"), None).unwrap();
        assert_eq!(acc.cash_limit, Amount::new(1000));
        assert!(store.has_vendor(&vendor("a")));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let (_, gate) = gate();
        gate.register(vendor("a"), Some(Amount::new(5))).unwrap();
        assert!(matches!(
            gate.register(vendor("a"), None),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn negative_limit_is_validation_error() {
        let (_, gate) = gate();
        gate.register(vendor("a"), None).unwrap();
        let err = gate
            .set_cash_limit(&vendor("a"), Amount::new(-1), "admin")
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn block_is_idempotent_and_blocks_requests() {
        let (_, gate) = gate();
        gate.register(vendor("a"), None).unwrap();
        assert!(gate.block(&vendor("a"), "admin").unwrap().blocked);
        let again = gate.block(&vendor("a"), "admin").unwrap();
        assert_eq!(again.history.len(), 1);
        assert!(matches!(
            gate.admit_request(&vendor("a")),
            Err(LedgerError::VendorBlocked(_))
        ));
        gate.unblock(&vendor("a"), "admin").unwrap();
        assert!(gate.admit_request(&vendor("a")).is_ok());
        assert_eq!(gate.counts(), (1, 0));
    }

    #[test]
    fn block_unknown_vendor_is_not_found() {
        let (_, gate) = gate();
        assert!(matches!(
            gate.block(&vendor("ghost"), "admin"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn cash_collection_enforces_limit() {
        let (store, gate) = gate();
        gate.register(vendor("a"), Some(Amount::new(500))).unwrap();
        gate.record_cash_collection(&vendor("a"), Amount::new(300), Some("bk-1".into()))
            .unwrap();
        let err = gate
            .record_cash_collection(&vendor("a"), Amount::new(201), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::CashLimitExceeded { .. }));
        assert_eq!(store.balance_of(&vendor("a")).unwrap(), Amount::new(-300));

        gate.record_cash_collection(&vendor("a"), Amount::new(200), None)
            .unwrap();
        assert_eq!(store.balance_of(&vendor("a")).unwrap(), Amount::new(-500));
    }

    #[test]
    fn earnings_offset_cash_exposure() {
        let (store, gate) = gate();
        gate.register(vendor("a"), Some(Amount::new(100))).unwrap();
        store
            .append(NewEntry::charge(vendor("a"), Amount::new(1000), None))
            .unwrap();
        gate.record_cash_collection(&vendor("a"), Amount::new(1100), None)
            .unwrap();
        assert_eq!(store.balance_of(&vendor("a")).unwrap(), Amount::new(-100));
    }

    #[test]
    fn blocked_vendor_cannot_collect_cash() {
        let (_, gate) = gate();
        gate.register(vendor("a"), None).unwrap();
        gate.block(&vendor("a"), "admin").unwrap();
        assert!(matches!(
            gate.record_cash_collection(&vendor("a"), Amount::new(1), None),
            Err(LedgerError::VendorBlocked(_))
        ));
    }

    #[test]
    fn non_positive_collection_is_invalid_entry() {
        let (_, gate) = gate();
        gate.register(vendor("a"), None).unwrap();
        assert!(matches!(
            gate.record_cash_collection(&vendor("a"), Amount::ZERO, None),
            Err(LedgerError::InvalidEntry(_))
        ));
    }
}
