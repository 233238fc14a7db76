//! # Record Digests: Journal Hash Chain
//!
//! Every journal record carries the SHA-256 digest of its own payload
//! chained to the digest of the previous record. Replaying a journal
//! recomputes the chain; any edited, dropped, or reordered record breaks it.
//!
//! The chain starts from [`RecordDigest::GENESIS`] (32 zero bytes).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VledgerError;

/// A 32-byte SHA-256 digest rendered as lowercase hex on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordDigest([u8; 32]);

impl RecordDigest {
    /// The digest preceding the first record of every journal.
    pub const GENESIS: RecordDigest = RecordDigest([0u8; 32]);

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Access the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-character lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, VledgerError> {
        let s = s.trim().as_bytes();
        if s.len() != 64 {
            return Err(VledgerError::Integrity(format!(
                "digest must be 64 hex chars, got {} bytes",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, (byte, pair)) in bytes.iter_mut().zip(s.chunks_exact(2)).enumerate() {
            let (Some(hi), Some(lo)) = (hex_value(pair[0]), hex_value(pair[1])) else {
                return Err(VledgerError::Integrity(format!(
                    "invalid hex at position {}",
                    i * 2
                )));
            };
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for RecordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for RecordDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecordDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Compute `SHA-256(previous || payload)`.
pub fn chain_digest(previous: &RecordDigest, payload: &[u8]) -> RecordDigest {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(payload);
    let hash = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    RecordDigest(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_all_zero() {
        assert_eq!(RecordDigest::GENESIS.to_hex(), "0".repeat(64));
    }

    #[test]
    fn chain_is_deterministic() {
        let a = chain_digest(&RecordDigest::GENESIS, b"entry");
        let b = chain_digest(&RecordDigest::GENESIS, b"entry");
        assert_eq!(a, b);
    }

    #[test]
    fn chain_depends_on_previous() {
        let first = chain_digest(&RecordDigest::GENESIS, b"one");
        let a = chain_digest(&first, b"two");
        let b = chain_digest(&RecordDigest::GENESIS, b"two");
        assert_ne!(a, b);
    }

    #[test]
    fn known_vector_over_genesis() {
        // SHA-256 of 32 zero bytes with an empty payload.
        let d = chain_digest(&RecordDigest::GENESIS, b"");
        assert_eq!(
            d.to_hex(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn hex_parse_rejects_bad_input() {
        assert!(RecordDigest::from_hex("abc").is_err());
        assert!(RecordDigest::from_hex(&"zz".repeat(32)).is_err());
        assert!(RecordDigest::from_hex(&format!("+f{}", "0".repeat(62))).is_err());
    }

    #[test]
    fn hex_parse_rejects_multibyte_chars() {
        // 64 bytes, but 'é' straddles the first byte pair.
        let s = format!("0\u{e9}{}", "0".repeat(61));
        assert_eq!(s.len(), 64);
        assert!(matches!(
            RecordDigest::from_hex(&s),
            Err(VledgerError::Integrity(_))
        ));
    }

    #[test]
    fn hex_parse_accepts_uppercase() {
        let d = chain_digest(&RecordDigest::GENESIS, b"x");
        let upper = d.to_hex().to_uppercase();
        assert_eq!(RecordDigest::from_hex(&upper).unwrap(), d);
    }

    #[test]
    fn serde_uses_hex_string() {
        let d = chain_digest(&RecordDigest::GENESIS, b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        let back: RecordDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
