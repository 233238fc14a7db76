//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier in the vendor ledger. You cannot
//! pass a [`SettlementId`] where a [`WithdrawalId`] is expected, even though
//! both are sequence numbers underneath.
//!
//! Ledger entries, settlements, and withdrawals are numbered from independent
//! monotonically increasing sequences starting at 1. Vendor ids are opaque
//! strings issued by the marketplace's vendor directory.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a vendor identifier.
pub const MAX_VENDOR_ID_LEN: usize = 64;

/// Identifier of a vendor account.
///
/// Validated on construction: 1-64 characters of `[A-Za-z0-9_-]`.
/// Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    /// Create a validated vendor identifier.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.len() <= MAX_VENDOR_ID_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidVendorId(s))
        }
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for VendorId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VendorId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

macro_rules! sequence_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The first identifier handed out by a fresh sequence.
            pub const FIRST: $name = $name(1);

            /// Access the raw sequence number.
            pub fn value(&self) -> u64 {
                self.0
            }

            /// The identifier following this one.
            pub fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

sequence_id!(
    /// Identifier of an immutable ledger entry. Doubles as the pagination
    /// cursor for ledger views because ids increase in creation order.
    EntryId,
    "entry"
);

sequence_id!(
    /// Identifier of a settlement request.
    SettlementId,
    "settlement"
);

sequence_id!(
    /// Identifier of a withdrawal request.
    WithdrawalId,
    "withdrawal"
);
