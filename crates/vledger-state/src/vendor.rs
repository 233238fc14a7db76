//! # Vendor Account Status
//!
//! Admin-controlled status of a vendor account:
//!
//! - **blocked**: a blocked vendor cannot open new settlement or withdrawal
//!   requests and cannot record new self-collected cash. Requests already
//!   pending are untouched and stay decidable.
//! - **cash limit**: the most a vendor may owe the platform from customer
//!   cash it collected directly. A cash collection that would push the
//!   vendor's exposure past the limit is refused.
//!
//! Status changes are recorded in an append-only history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vledger_core::{Amount, Timestamp, VendorId};

/// Errors raised by status-gate admission checks and admin mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
    #[error("vendor {0} is blocked")]
    Blocked(VendorId),

    #[error("vendor {vendor_id} cash exposure {exposure} would exceed limit {limit}")]
    CashLimitExceeded {
        vendor_id: VendorId,
        exposure: Amount,
        limit: Amount,
    },

    #[error("cash limit must not be negative, got {0}")]
    NegativeCashLimit(Amount),
}

/// A recorded status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StatusChange {
    Blocked { at: Timestamp, actor: String },
    Unblocked { at: Timestamp, actor: String },
    CashLimit {
        at: Timestamp,
        actor: String,
        previous: Amount,
        limit: Amount,
    },
}

/// Status of one vendor account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAccount {
    pub vendor_id: VendorId,
    pub blocked: bool,
    pub cash_limit: Amount,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl VendorAccount {
    /// Register a new, unblocked vendor account.
    pub fn register(
        vendor_id: VendorId,
        cash_limit: Amount,
        at: Timestamp,
    ) -> Result<Self, VendorError> {
        if cash_limit.is_negative() {
            return Err(VendorError::NegativeCashLimit(cash_limit));
        }
        Ok(Self {
            vendor_id,
            blocked: false,
            cash_limit,
            registered_at: at,
            updated_at: at,
            history: Vec::new(),
        })
    }

    /// Block the vendor. Returns `false` when it was already blocked.
    pub fn block(&mut self, actor: &str, at: Timestamp) -> bool {
        if self.blocked {
            return false;
        }
        self.blocked = true;
        self.updated_at = at;
        self.history.push(StatusChange::Blocked {
            at,
            actor: actor.to_string(),
        });
        true
    }

    /// Unblock the vendor. Returns `false` when it was not blocked.
    pub fn unblock(&mut self, actor: &str, at: Timestamp) -> bool {
        if !self.blocked {
            return false;
        }
        self.blocked = false;
        self.updated_at = at;
        self.history.push(StatusChange::Unblocked {
            at,
            actor: actor.to_string(),
        });
        true
    }

    /// Replace the cash limit, returning the previous one.
    pub fn set_cash_limit(
        &mut self,
        limit: Amount,
        actor: &str,
        at: Timestamp,
    ) -> Result<Amount, VendorError> {
        if limit.is_negative() {
            return Err(VendorError::NegativeCashLimit(limit));
        }
        let previous = self.cash_limit;
        self.cash_limit = limit;
        self.updated_at = at;
        self.history.push(StatusChange::CashLimit {
            at,
            actor: actor.to_string(),
            previous,
            limit,
        });
        Ok(previous)
    }

    /// Admission check for opening a new settlement or withdrawal request.
    pub fn admit_request(&self) -> Result<(), VendorError> {
        if self.blocked {
            return Err(VendorError::Blocked(self.vendor_id.clone()));
        }
        Ok(())
    }

    /// Admission check for a cash collection that would leave the vendor
    /// with the given balance.
    pub fn admit_cash_collection(&self, balance_after: Amount) -> Result<(), VendorError> {
        if self.blocked {
            return Err(VendorError::Blocked(self.vendor_id.clone()));
        }
        let exposure = cash_exposure(balance_after);
        if exposure > self.cash_limit {
            return Err(VendorError::CashLimitExceeded {
                vendor_id: self.vendor_id.clone(),
                exposure,
                limit: self.cash_limit,
            });
        }
        Ok(())
    }
}

/// How much a vendor with the given balance owes the platform.
pub fn cash_exposure(balance: Amount) -> Amount {
    if balance.is_negative() {
        // i64::MIN cannot be produced by checked ledger folds.
        Amount::new(balance.minor_units().saturating_neg())
    } else {
        Amount::ZERO
    }
}
