//! # Amounts: Signed Minor Currency Units
//!
//! All money in the ledger is an `i64` count of minor currency units
//! (paise, cents). Floating point never touches a balance: JSON numbers with
//! a fractional part fail deserialization into [`Amount`].
//!
//! Arithmetic is checked. An overflowing fold is an error, not a wrap.

use std::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A signed amount in minor currency units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw minor-unit value.
    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Wrap a value that must be strictly positive.
    pub fn positive(minor_units: i64) -> Result<Self, ValidationError> {
        if minor_units > 0 {
            Ok(Self(minor_units))
        } else {
            Err(ValidationError::NonPositiveAmount(minor_units))
        }
    }

    /// Wrap a value that must be zero or positive.
    pub fn non_negative(minor_units: i64) -> Result<Self, ValidationError> {
        if minor_units >= 0 {
            Ok(Self(minor_units))
        } else {
            Err(ValidationError::NegativeAmount(minor_units))
        }
    }

    /// Raw minor-unit value.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(ValidationError::Overflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(ValidationError::Overflow)
    }

    /// Checked negation. Fails only for `i64::MIN`.
    pub fn checked_neg(self) -> Result<Amount, ValidationError> {
        self.0
            .checked_neg()
            .map(Amount)
            .ok_or(ValidationError::Overflow)
    }

    /// Checked sum of an iterator of amounts.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(iter: I) -> Result<Amount, ValidationError> {
        iter.into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
    }
}

/// Saturating sum, for display-only aggregates such as metrics gauges.
/// Balance computations use [`Amount::checked_sum`].
impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        Amount(iter.fold(0i64, |acc, a| acc.saturating_add(a.0)))
    }
}

impl From<i64> for Amount {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
