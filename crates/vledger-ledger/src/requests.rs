//! # Request Collections
//!
//! One [`RequestBook`] per workflow holds that workflow's requests keyed by
//! id, hands out ids from its own sequence, and indexes idempotency keys.
//! The book does no admission work; the workflow mutates it only while
//! holding the owning vendor's writer lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use vledger_core::{Amount, VendorId};
use vledger_state::{PayoutRequest, RequestId, RequestStatus};

use crate::error::LedgerError;

/// Request counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Id-ordered collection of one kind of payout request.
#[derive(Debug)]
pub struct RequestBook<Id: RequestId> {
    requests: RwLock<BTreeMap<Id, PayoutRequest<Id>>>,
    idempotency: RwLock<HashMap<(VendorId, String), Id>>,
    next_id: AtomicU64,
}

impl<Id: RequestId> Default for RequestBook<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: RequestId> RequestBook<Id> {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(BTreeMap::new()),
            idempotency: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self, id: Id) -> Option<PayoutRequest<Id>> {
        self.requests.read().get(&id).cloned()
    }

    /// Request previously created by `vendor_id` under `key`.
    pub fn find_idempotent(&self, vendor_id: &VendorId, key: &str) -> Option<PayoutRequest<Id>> {
        let id = *self
            .idempotency
            .read()
            .get(&(vendor_id.clone(), key.to_string()))?;
        self.get(id)
    }

    /// Sum of the vendor's pending request amounts.
    pub fn pending_total(&self, vendor_id: &VendorId) -> Result<Amount, LedgerError> {
        let requests = self.requests.read();
        Amount::checked_sum(
            requests
                .values()
                .filter(|r| r.is_pending() && &r.vendor_id == vendor_id)
                .map(|r| r.amount),
        )
        .map_err(LedgerError::from)
    }

    /// Pending requests, oldest first.
    pub fn pending(&self) -> Vec<PayoutRequest<Id>> {
        self.list(Some(RequestStatus::Pending))
    }

    /// Decided requests, most recently decided first.
    pub fn history(&self) -> Vec<PayoutRequest<Id>> {
        let mut decided: Vec<_> = self
            .requests
            .read()
            .values()
            .filter(|r| r.status.is_terminal())
            .cloned()
            .collect();
        decided.sort_by(|a, b| b.decided_at.cmp(&a.decided_at).then(b.id.cmp(&a.id)));
        decided
    }

    /// Requests in id order, optionally filtered by status.
    pub fn list(&self, status: Option<RequestStatus>) -> Vec<PayoutRequest<Id>> {
        self.requests
            .read()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect()
    }

    /// One vendor's requests in id order.
    pub fn list_for_vendor(&self, vendor_id: &VendorId) -> Vec<PayoutRequest<Id>> {
        self.requests
            .read()
            .values()
            .filter(|r| &r.vendor_id == vendor_id)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let requests = self.requests.read();
        let mut counts = StatusCounts::default();
        for r in requests.values() {
            match r.status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Approved => counts.approved += 1,
                RequestStatus::Rejected => counts.rejected += 1,
            }
        }
        counts
    }

    pub(crate) fn allocate_id(&self) -> Id {
        Id::from_seq(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert or replace a request, indexing its idempotency key.
    pub(crate) fn put(&self, request: PayoutRequest<Id>) {
        if let Some(key) = &request.idempotency_key {
            self.idempotency
                .write()
                .insert((request.vendor_id.clone(), key.clone()), request.id);
        }
        self.requests.write().insert(request.id, request);
    }

    /// Put a journaled request back during replay.
    pub(crate) fn restore(&self, request: PayoutRequest<Id>) {
        self.next_id.fetch_max(request.id.seq() + 1, Ordering::SeqCst);
        self.put(request);
    }
}
