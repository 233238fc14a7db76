//! # Payout Request State Machine
//!
//! Settlement and withdrawal requests share one lifecycle:
//!
//! ```text
//! Pending ──▶ Approved (terminal)
//!    │
//!    └──────▶ Rejected (terminal)
//! ```
//!
//! A request is decided exactly once. Deciding an already-decided request
//! fails with [`RequestError::AlreadyDecided`] rather than succeeding
//! silently, so a retried approval can never produce a second payout.
//!
//! The two request kinds are distinguished by their identifier type
//! ([`SettlementId`] / [`WithdrawalId`]) through the [`RequestId`] trait,
//! which keeps their id spaces and collections independent.

use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vledger_core::{Amount, EntryId, SettlementId, Timestamp, VendorId, WithdrawalId};

/// Maximum length of admin notes and rejection reasons.
pub const MAX_NOTE_LEN: usize = 2000;

// ─── Request Kind ────────────────────────────────────────────────────

/// Which workflow a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Settlement,
    Withdrawal,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settlement => "settlement",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier types that name a payout request.
pub trait RequestId:
    Copy
    + Eq
    + Ord
    + Hash
    + std::fmt::Debug
    + std::fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The workflow this identifier space belongs to.
    const KIND: RequestKind;

    /// Build an identifier from a raw sequence number.
    fn from_seq(seq: u64) -> Self;

    /// Raw sequence number.
    fn seq(&self) -> u64;
}

impl RequestId for SettlementId {
    const KIND: RequestKind = RequestKind::Settlement;

    fn from_seq(seq: u64) -> Self {
        SettlementId(seq)
    }

    fn seq(&self) -> u64 {
        self.0
    }
}

impl RequestId for WithdrawalId {
    const KIND: RequestKind = RequestKind::Withdrawal;

    fn from_seq(seq: u64) -> Self {
        WithdrawalId(seq)
    }

    fn seq(&self) -> u64 {
        self.0
    }
}

// ─── Request Status ──────────────────────────────────────────────────

/// The lifecycle state of a payout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting an admin decision. Reserves its amount against the
    /// vendor's available balance.
    Pending,
    /// Approved; a payout ledger entry was written (terminal).
    Approved,
    /// Rejected; no ledger effect (terminal).
    Rejected,
}

impl RequestStatus {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "unknown request status {other:?}: expected pending, approved, or rejected"
            )),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by request construction and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request already reached a terminal state.
    #[error("{kind} {id} already decided: {status}")]
    AlreadyDecided {
        kind: RequestKind,
        id: u64,
        status: RequestStatus,
    },

    /// Requested amount was zero or negative.
    #[error("request amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// A rejection was attempted without a reason.
    #[error("rejection_reason must not be empty")]
    BlankReason,

    /// Notes or reason exceeded [`MAX_NOTE_LEN`].
    #[error("{field} must not exceed {max} characters")]
    TextTooLong { field: &'static str, max: usize },
}

// ─── Transition Record ───────────────────────────────────────────────

/// Record of a request state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransitionRecord {
    pub from_state: RequestStatus,
    pub to_state: RequestStatus,
    pub timestamp: Timestamp,
    pub actor: String,
}

/// Inputs to an approval.
#[derive(Debug, Clone)]
pub struct Approval {
    pub decided_by: String,
    pub admin_notes: Option<String>,
    /// The payout entry the approval wrote.
    pub payout_entry_id: EntryId,
    pub at: Timestamp,
}

/// Inputs to a rejection.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub decided_by: String,
    pub rejection_reason: String,
    pub at: Timestamp,
}

// ─── Payout Request ──────────────────────────────────────────────────

/// A vendor payout request with its decision state and transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest<Id> {
    pub id: Id,
    pub vendor_id: VendorId,
    /// Requested amount, always positive.
    pub amount: Amount,
    pub status: RequestStatus,
    /// Subject of the caller that created the request.
    pub created_by: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_entry_id: Option<EntryId>,
    #[serde(default)]
    pub transitions: Vec<RequestTransitionRecord>,
}

/// A settlement request.
pub type SettlementRequest = PayoutRequest<SettlementId>;

/// A withdrawal request.
pub type WithdrawalRequest = PayoutRequest<WithdrawalId>;

impl<Id: RequestId> PayoutRequest<Id> {
    /// Open a new pending request.
    pub fn open(
        id: Id,
        vendor_id: VendorId,
        amount: Amount,
        created_by: impl Into<String>,
        idempotency_key: Option<String>,
        at: Timestamp,
    ) -> Result<Self, RequestError> {
        if !amount.is_positive() {
            return Err(RequestError::NonPositiveAmount(amount.minor_units()));
        }
        Ok(Self {
            id,
            vendor_id,
            amount,
            status: RequestStatus::Pending,
            created_by: created_by.into(),
            created_at: at,
            idempotency_key,
            admin_notes: None,
            rejection_reason: None,
            decided_at: None,
            decided_by: None,
            payout_entry_id: None,
            transitions: Vec::new(),
        })
    }

    pub fn kind(&self) -> RequestKind {
        Id::KIND
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Check that an approval with the given notes would be accepted,
    /// without changing anything. The workflow calls this before writing
    /// the payout entry so a doomed approval never touches the ledger.
    pub fn check_approvable(&self, admin_notes: Option<&str>) -> Result<(), RequestError> {
        self.require_pending()?;
        if let Some(notes) = admin_notes {
            check_len(notes, "admin_notes")?;
        }
        Ok(())
    }

    /// Approve the request (PENDING → APPROVED).
    pub fn approve(&mut self, approval: Approval) -> Result<(), RequestError> {
        self.check_approvable(approval.admin_notes.as_deref())?;
        self.admin_notes = approval
            .admin_notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.payout_entry_id = Some(approval.payout_entry_id);
        self.decided_at = Some(approval.at);
        self.decided_by = Some(approval.decided_by.clone());
        self.do_transition(RequestStatus::Approved, approval.at, approval.decided_by);
        Ok(())
    }

    /// Check that a rejection with the given reason would be accepted.
    pub fn check_rejectable(&self, reason: &str) -> Result<(), RequestError> {
        if reason.trim().is_empty() {
            return Err(RequestError::BlankReason);
        }
        check_len(reason, "rejection_reason")?;
        self.require_pending()
    }

    /// Reject the request (PENDING → REJECTED).
    pub fn reject(&mut self, rejection: Rejection) -> Result<(), RequestError> {
        self.check_rejectable(&rejection.rejection_reason)?;
        self.rejection_reason = Some(rejection.rejection_reason.trim().to_string());
        self.decided_at = Some(rejection.at);
        self.decided_by = Some(rejection.decided_by.clone());
        self.do_transition(RequestStatus::Rejected, rejection.at, rejection.decided_by);
        Ok(())
    }

    fn require_pending(&self) -> Result<(), RequestError> {
        if self.status.is_terminal() {
            return Err(RequestError::AlreadyDecided {
                kind: Id::KIND,
                id: self.id.seq(),
                status: self.status,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: RequestStatus, at: Timestamp, actor: String) {
        self.transitions.push(RequestTransitionRecord {
            from_state: self.status,
            to_state: to,
            timestamp: at,
            actor,
        });
        self.status = to;
    }
}

fn check_len(text: &str, field: &'static str) -> Result<(), RequestError> {
    if text.chars().count() > MAX_NOTE_LEN {
        return Err(RequestError::TextTooLong {
            field,
            max: MAX_NOTE_LEN,
        });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor() -> VendorId {
        VendorId::new("vendor-1").unwrap()
    }

    fn settlement(amount: i64) -> SettlementRequest {
        PayoutRequest::open(
            SettlementId(1),
            vendor(),
            Amount::new(amount),
            "admin",
            None,
            Timestamp::now(),
        )
        .unwrap()
    }

    fn approval(notes: Option<&str>) -> Approval {
        Approval {
            decided_by: "admin-7".to_string(),
            admin_notes: notes.map(str::to_string),
            payout_entry_id: EntryId(11),
            at: Timestamp::now(),
        }
    }

    fn rejection(reason: &str) -> Rejection {
        Rejection {
            decided_by: "admin-7".to_string(),
            rejection_reason: reason.to_string(),
            at: Timestamp::now(),
        }
    }

    #[test]
    fn open_starts_pending() {
        let req = settlement(700);
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.is_pending());
        assert_eq!(req.kind(), RequestKind::Settlement);
        assert!(req.transitions.is_empty());
    }

    #[test]
    fn open_rejects_non_positive_amount() {
        let err = PayoutRequest::open(
            WithdrawalId(1),
            vendor(),
            Amount::ZERO,
            "v",
            None,
            Timestamp::now(),
        )
        .unwrap_err();
        assert_eq!(err, RequestError::NonPositiveAmount(0));
    }

    #[test]
    fn approve_records_decision() {
        let mut req = settlement(700);
        req.approve(approval(Some("  paid via bank  "))).unwrap();
        assert_eq!(req.status, RequestStatus::Approved);
        assert_eq!(req.admin_notes.as_deref(), Some("paid via bank"));
        assert_eq!(req.decided_by.as_deref(), Some("admin-7"));
        assert_eq!(req.payout_entry_id, Some(EntryId(11)));
        assert!(req.decided_at.is_some());
        assert_eq!(req.transitions.len(), 1);
        assert_eq!(req.transitions[0].from_state, RequestStatus::Pending);
        assert_eq!(req.transitions[0].to_state, RequestStatus::Approved);
    }

    #[test]
    fn blank_notes_are_dropped() {
        let mut req = settlement(10);
        req.approve(approval(Some("   "))).unwrap();
        assert!(req.admin_notes.is_none());
    }

    #[test]
    fn second_approval_fails_already_decided() {
        let mut req = settlement(700);
        req.approve(approval(None)).unwrap();
        let err = req.approve(approval(None)).unwrap_err();
        assert_eq!(
            err,
            RequestError::AlreadyDecided {
                kind: RequestKind::Settlement,
                id: 1,
                status: RequestStatus::Approved,
            }
        );
        assert_eq!(req.transitions.len(), 1);
    }

    #[test]
    fn reject_requires_reason() {
        let mut req = settlement(700);
        assert_eq!(req.reject(rejection("")).unwrap_err(), RequestError::BlankReason);
        assert_eq!(req.reject(rejection("  \t")).unwrap_err(), RequestError::BlankReason);
        assert!(req.is_pending());
    }

    #[test]
    fn reject_records_reason() {
        let mut req = settlement(700);
        req.reject(rejection("bank details missing")).unwrap();
        assert_eq!(req.status, RequestStatus::Rejected);
        assert_eq!(req.rejection_reason.as_deref(), Some("bank details missing"));
        assert!(req.payout_entry_id.is_none());
    }

    #[test]
    fn rejected_request_cannot_be_approved() {
        let mut req = settlement(700);
        req.reject(rejection("duplicate")).unwrap();
        assert!(matches!(
            req.approve(approval(None)),
            Err(RequestError::AlreadyDecided {
                status: RequestStatus::Rejected,
                ..
            })
        ));
    }

    #[test]
    fn approved_request_cannot_be_rejected() {
        let mut req = settlement(700);
        req.approve(approval(None)).unwrap();
        assert!(matches!(
            req.reject(rejection("too late")),
            Err(RequestError::AlreadyDecided { .. })
        ));
    }

    #[test]
    fn overlong_reason_rejected() {
        let req = settlement(1);
        let reason = "x".repeat(MAX_NOTE_LEN + 1);
        assert_eq!(
            req.check_rejectable(&reason).unwrap_err(),
            RequestError::TextTooLong {
                field: "rejection_reason",
                max: MAX_NOTE_LEN
            }
        );
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("pending".parse::<RequestStatus>().unwrap(), RequestStatus::Pending);
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn serde_round_trip_preserves_decision() {
        let mut req = settlement(700);
        req.approve(approval(Some("ok"))).unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"status\":\"approved\""));
        let back: SettlementRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
