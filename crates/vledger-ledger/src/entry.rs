//! # Ledger Entries
//!
//! A [`LedgerEntry`] is the immutable record of one financial event on a
//! vendor's account. Entries are never edited or deleted; a correction is a
//! new offsetting `adjustment`.
//!
//! ## Sign Conventions
//!
//! A positive balance means the platform owes the vendor.
//!
//! | Kind | Sign | Meaning |
//! |---|---|---|
//! | `charge` | `+` | vendor earnings for a completed booking |
//! | `cash_collection` | `-` | cash the vendor collected directly from a customer |
//! | `payout` | `-` | money paid out by an approved settlement or withdrawal |
//! | `adjustment` | `±` | admin correction |
//!
//! Zero is never a valid amount.

use serde::{Deserialize, Serialize};

use vledger_core::{Amount, EntryId, SettlementId, Timestamp, VendorId, WithdrawalId};

use crate::error::LedgerError;

/// Maximum length of a booking reference.
pub const MAX_BOOKING_REF_LEN: usize = 128;

/// Maximum length of an entry memo.
pub const MAX_MEMO_LEN: usize = 500;

/// The kind of financial event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Charge,
    Payout,
    Adjustment,
    CashCollection,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Payout => "payout",
            Self::Adjustment => "adjustment",
            Self::CashCollection => "cash_collection",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub vendor_id: VendorId,
    /// Signed amount in minor units.
    pub amount: Amount,
    pub kind: EntryKind,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_settlement_id: Option<SettlementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_withdrawal_id: Option<WithdrawalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// An entry not yet written. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub vendor_id: VendorId,
    pub amount: Amount,
    pub kind: EntryKind,
    pub related_settlement_id: Option<SettlementId>,
    pub related_withdrawal_id: Option<WithdrawalId>,
    pub related_booking_id: Option<String>,
    pub memo: Option<String>,
}

impl NewEntry {
    fn bare(vendor_id: VendorId, amount: Amount, kind: EntryKind) -> Self {
        Self {
            vendor_id,
            amount,
            kind,
            related_settlement_id: None,
            related_withdrawal_id: None,
            related_booking_id: None,
            memo: None,
        }
    }

    /// Vendor earnings for a booking.
    pub fn charge(vendor_id: VendorId, amount: Amount, booking_id: Option<String>) -> Self {
        Self {
            related_booking_id: booking_id,
            ..Self::bare(vendor_id, amount, EntryKind::Charge)
        }
    }

    /// Admin correction of either sign.
    pub fn adjustment(vendor_id: VendorId, amount: Amount, memo: Option<String>) -> Self {
        Self {
            memo,
            ..Self::bare(vendor_id, amount, EntryKind::Adjustment)
        }
    }

    /// Cash the vendor collected from a customer. `collected` is the
    /// positive amount handed over; the entry stores its negation.
    pub fn cash_collection(
        vendor_id: VendorId,
        collected: Amount,
        booking_id: Option<String>,
    ) -> Result<Self, LedgerError> {
        let amount = collected
            .checked_neg()
            .map_err(|e| LedgerError::InvalidEntry(e.to_string()))?;
        Ok(Self {
            related_booking_id: booking_id,
            ..Self::bare(vendor_id, amount, EntryKind::CashCollection)
        })
    }

    /// Payout for an approved settlement of `amount`.
    pub fn settlement_payout(
        vendor_id: VendorId,
        amount: Amount,
        settlement_id: SettlementId,
    ) -> Result<Self, LedgerError> {
        let amount = amount
            .checked_neg()
            .map_err(|e| LedgerError::InvalidEntry(e.to_string()))?;
        Ok(Self {
            related_settlement_id: Some(settlement_id),
            ..Self::bare(vendor_id, amount, EntryKind::Payout)
        })
    }

    /// Payout for an approved withdrawal of `amount`.
    pub fn withdrawal_payout(
        vendor_id: VendorId,
        amount: Amount,
        withdrawal_id: WithdrawalId,
    ) -> Result<Self, LedgerError> {
        let amount = amount
            .checked_neg()
            .map_err(|e| LedgerError::InvalidEntry(e.to_string()))?;
        Ok(Self {
            related_withdrawal_id: Some(withdrawal_id),
            ..Self::bare(vendor_id, amount, EntryKind::Payout)
        })
    }

    /// Check amount and sign rules and text limits.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount.is_zero() {
            return Err(LedgerError::InvalidEntry("amount must not be zero".into()));
        }
        let sign_ok = match self.kind {
            EntryKind::Charge => self.amount.is_positive(),
            EntryKind::Payout | EntryKind::CashCollection => self.amount.is_negative(),
            EntryKind::Adjustment => true,
        };
        if !sign_ok {
            return Err(LedgerError::InvalidEntry(format!(
                "{} entry cannot carry amount {}",
                self.kind, self.amount
            )));
        }
        if self.kind == EntryKind::Payout
            && self.related_settlement_id.is_some() == self.related_withdrawal_id.is_some()
        {
            return Err(LedgerError::InvalidEntry(
                "payout must reference exactly one settlement or withdrawal".into(),
            ));
        }
        if let Some(booking) = &self.related_booking_id {
            if booking.trim().is_empty() || booking.len() > MAX_BOOKING_REF_LEN {
                return Err(LedgerError::InvalidEntry(format!(
                    "booking reference must be 1-{MAX_BOOKING_REF_LEN} characters"
                )));
            }
        }
        if let Some(memo) = &self.memo {
            if memo.chars().count() > MAX_MEMO_LEN {
                return Err(LedgerError::InvalidEntry(format!(
                    "memo must not exceed {MAX_MEMO_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    /// Stamp the entry with its identity.
    pub(crate) fn into_entry(self, id: EntryId, created_at: Timestamp) -> LedgerEntry {
        LedgerEntry {
            id,
            vendor_id: self.vendor_id,
            amount: self.amount,
            kind: self.kind,
            created_at,
            related_settlement_id: self.related_settlement_id,
            related_withdrawal_id: self.related_withdrawal_id,
            related_booking_id: self.related_booking_id,
            memo: self.memo,
        }
    }
}
