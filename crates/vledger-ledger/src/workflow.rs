//! # Settlement and Withdrawal Workflows
//!
//! [`RequestWorkflow`] implements the request lifecycle once for both
//! kinds; [`PayoutKind`] supplies what differs between them (journal event
//! shape and payout entry reference). Each kind has its own
//! [`RequestBook`], id sequence, and [`WorkflowPolicy`].
//!
//! ## Admission
//!
//! `create` and `approve` run under the vendor's writer lock:
//!
//! - **create**: the vendor must exist and not be blocked, and the amount
//!   must not exceed `available_for_withdrawal`. Of two concurrent creates
//!   that together overdraw, the first to take the lock wins and the second
//!   fails `InsufficientBalance`.
//! - **approve**: the request must be pending and the ledger balance must
//!   cover it. The payout entry and the approved request are journaled as
//!   one record and then committed together.

use std::sync::Arc;

use vledger_core::{Amount, SettlementId, Timestamp, VendorId, WithdrawalId};
use vledger_state::{
    Approval, PayoutRequest, Rejection, RequestError, RequestId, SettlementRequest,
    WithdrawalRequest,
};

use crate::entry::{LedgerEntry, NewEntry};
use crate::error::LedgerError;
use crate::gate::VendorStatusGate;
use crate::journal::JournalEvent;
use crate::projector::BalanceProjector;
use crate::requests::RequestBook;
use crate::store::LedgerStore;

/// Longest accepted idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Per-kind differences between settlement and withdrawal requests.
pub trait PayoutKind: RequestId {
    fn opened(request: &PayoutRequest<Self>) -> JournalEvent;
    fn approved(request: &PayoutRequest<Self>, payout: &LedgerEntry) -> JournalEvent;
    fn rejected(request: &PayoutRequest<Self>) -> JournalEvent;
    fn payout(request: &PayoutRequest<Self>) -> Result<NewEntry, LedgerError>;
}

impl PayoutKind for SettlementId {
    fn opened(request: &SettlementRequest) -> JournalEvent {
        JournalEvent::SettlementOpened {
            request: request.clone(),
        }
    }

    fn approved(request: &SettlementRequest, payout: &LedgerEntry) -> JournalEvent {
        JournalEvent::SettlementApproved {
            request: request.clone(),
            payout: payout.clone(),
        }
    }

    fn rejected(request: &SettlementRequest) -> JournalEvent {
        JournalEvent::SettlementRejected {
            request: request.clone(),
        }
    }

    fn payout(request: &SettlementRequest) -> Result<NewEntry, LedgerError> {
        NewEntry::settlement_payout(request.vendor_id.clone(), request.amount, request.id)
    }
}

impl PayoutKind for WithdrawalId {
    fn opened(request: &WithdrawalRequest) -> JournalEvent {
        JournalEvent::WithdrawalOpened {
            request: request.clone(),
        }
    }

    fn approved(request: &WithdrawalRequest, payout: &LedgerEntry) -> JournalEvent {
        JournalEvent::WithdrawalApproved {
            request: request.clone(),
            payout: payout.clone(),
        }
    }

    fn rejected(request: &WithdrawalRequest) -> JournalEvent {
        JournalEvent::WithdrawalRejected {
            request: request.clone(),
        }
    }

    fn payout(request: &WithdrawalRequest) -> Result<NewEntry, LedgerError> {
        NewEntry::withdrawal_payout(request.vendor_id.clone(), request.amount, request.id)
    }
}

/// Per-kind admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowPolicy {
    /// Smallest amount a request may ask for.
    pub min_amount: Amount,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            min_amount: Amount::new(1),
        }
    }
}

/// Result of `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created<Id> {
    pub request: PayoutRequest<Id>,
    /// The idempotency key matched an earlier request, which is returned
    /// unchanged.
    pub replayed: bool,
}

/// Lifecycle of one kind of payout request.
#[derive(Debug)]
pub struct RequestWorkflow<Id: PayoutKind> {
    book: Arc<RequestBook<Id>>,
    store: Arc<LedgerStore>,
    projector: Arc<BalanceProjector>,
    gate: Arc<VendorStatusGate>,
    policy: WorkflowPolicy,
}

impl<Id: PayoutKind> RequestWorkflow<Id> {
    pub fn new(
        book: Arc<RequestBook<Id>>,
        store: Arc<LedgerStore>,
        projector: Arc<BalanceProjector>,
        gate: Arc<VendorStatusGate>,
        policy: WorkflowPolicy,
    ) -> Self {
        Self {
            book,
            store,
            projector,
            gate,
            policy,
        }
    }

    pub fn book(&self) -> &RequestBook<Id> {
        &self.book
    }

    pub fn policy(&self) -> WorkflowPolicy {
        self.policy
    }

    /// Open a pending request reserving `amount` of the vendor's available
    /// balance.
    pub fn create(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        created_by: &str,
        idempotency_key: Option<String>,
    ) -> Result<Created<Id>, LedgerError> {
        if !amount.is_positive() {
            return Err(RequestError::NonPositiveAmount(amount.minor_units()).into());
        }
        if amount < self.policy.min_amount {
            return Err(LedgerError::Validation(format!(
                "{} amount {amount} is below the minimum of {}",
                Id::KIND,
                self.policy.min_amount
            )));
        }
        let idempotency_key = idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(key) = &idempotency_key {
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(LedgerError::Validation(format!(
                    "idempotency key must not exceed {MAX_IDEMPOTENCY_KEY_LEN} characters"
                )));
            }
        }

        self.store.with_writer(vendor_id, |writer| {
            if let Some(key) = &idempotency_key {
                if let Some(existing) = self.book.find_idempotent(vendor_id, key) {
                    if existing.amount != amount {
                        return Err(LedgerError::Conflict(format!(
                            "idempotency key {key:?} was used for {} with amount {}",
                            existing.id, existing.amount
                        )));
                    }
                    return Ok(Created {
                        request: existing,
                        replayed: true,
                    });
                }
            }

            self.gate.admit_request(vendor_id)?;
            let available = self.projector.available_locked(writer)?;
            if amount > available {
                return Err(LedgerError::InsufficientBalance {
                    vendor_id: vendor_id.clone(),
                    requested: amount,
                    available,
                });
            }

            let request = PayoutRequest::open(
                self.book.allocate_id(),
                vendor_id.clone(),
                amount,
                created_by,
                idempotency_key.clone(),
                Timestamp::now(),
            )?;
            writer.journal().record(&Id::opened(&request))?;
            self.book.put(request.clone());
            tracing::info!(
                kind = %Id::KIND,
                request_id = request.id.seq(),
                vendor_id = %vendor_id,
                amount = amount.minor_units(),
                "payout request created"
            );
            Ok(Created {
                request,
                replayed: false,
            })
        })
    }

    /// Approve a pending request and write its payout entry.
    pub fn approve(
        &self,
        id: Id,
        decided_by: &str,
        admin_notes: Option<String>,
    ) -> Result<PayoutRequest<Id>, LedgerError> {
        let vendor_id = self.get(id)?.vendor_id;
        self.store.with_writer(&vendor_id, |writer| {
            let mut request = self.get(id)?;
            request.check_approvable(admin_notes.as_deref())?;

            let balance = writer.balance()?;
            if balance < request.amount {
                return Err(LedgerError::InsufficientBalance {
                    vendor_id: vendor_id.clone(),
                    requested: request.amount,
                    available: balance,
                });
            }

            let payout = writer.prepare(Id::payout(&request)?)?;
            request.approve(Approval {
                decided_by: decided_by.to_string(),
                admin_notes,
                payout_entry_id: payout.id,
                at: payout.created_at,
            })?;
            writer.journal().record(&Id::approved(&request, &payout))?;
            let payout_id = payout.id;
            writer.commit(payout);
            self.book.put(request.clone());
            tracing::info!(
                kind = %Id::KIND,
                request_id = id.seq(),
                vendor_id = %vendor_id,
                amount = request.amount.minor_units(),
                payout_entry_id = payout_id.value(),
                decided_by,
                "payout request approved"
            );
            Ok(request)
        })
    }

    /// Reject a pending request. No ledger effect.
    pub fn reject(
        &self,
        id: Id,
        decided_by: &str,
        rejection_reason: &str,
    ) -> Result<PayoutRequest<Id>, LedgerError> {
        if rejection_reason.trim().is_empty() {
            return Err(RequestError::BlankReason.into());
        }
        let vendor_id = self.get(id)?.vendor_id;
        self.store.with_writer(&vendor_id, |writer| {
            let mut request = self.get(id)?;
            request.reject(Rejection {
                decided_by: decided_by.to_string(),
                rejection_reason: rejection_reason.to_string(),
                at: Timestamp::now(),
            })?;
            writer.journal().record(&Id::rejected(&request))?;
            self.book.put(request.clone());
            tracing::info!(
                kind = %Id::KIND,
                request_id = id.seq(),
                vendor_id = %vendor_id,
                decided_by,
                "payout request rejected"
            );
            Ok(request)
        })
    }

    pub fn get(&self, id: Id) -> Result<PayoutRequest<Id>, LedgerError> {
        self.book
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    pub fn pending(&self) -> Vec<PayoutRequest<Id>> {
        self.book.pending()
    }

    pub fn history(&self) -> Vec<PayoutRequest<Id>> {
        self.book.history()
    }

    pub fn list_for_vendor(&self, vendor_id: &VendorId) -> Vec<PayoutRequest<Id>> {
        self.book.list_for_vendor(vendor_id)
    }
}

/// Settlement workflow.
pub type SettlementWorkflow = RequestWorkflow<SettlementId>;

/// Withdrawal workflow.
pub type WithdrawalWorkflow = RequestWorkflow<WithdrawalId>;
