//! Strong type definitions for the Keridian kernel.
//!
//! Identifiers and digests are distinct newtypes to prevent misuse at
//! compile time: an [`Aid`] names a controller, a [`Said`] names one event.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A self-certifying identifier (AID) for a controller.
///
/// Derived at inception as the BLAKE3 digest of the inception event's
/// canonical bytes with the identifier field zeroed, so the identifier
/// commits to its own founding event. Immutable once created.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Aid(pub [u8; 32]);

impl Aid {
    /// Create a new Aid from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// True if this is the zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The zero identifier (used as a sentinel, e.g. in pure data seals).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Aid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Aid {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// A self-addressing identifier (SAID): the BLAKE3 digest of an event's
/// canonical bytes.
///
/// Two events with the same content have the same Said. Controller
/// signatures and witness receipts both sign Said bytes, never raw
/// event bytes, so identity is fixed before any signature exists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Said(pub [u8; 32]);

impl Said {
    /// Compute the digest of the given canonical bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a new Said from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// True if this is the zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The zero digest. Marks "no prior event" on inceptions and
    /// "no next-key commitment" on abandoned identifiers.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Said {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Said({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Said {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Said {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Said {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Said {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

impl From<Said> for Aid {
    fn from(said: Said) -> Self {
        Aid(said.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aid_hex_roundtrip() {
        let aid = Aid::from_bytes([0x42; 32]);
        let hex = aid.to_hex();
        let recovered = Aid::from_hex(&hex).unwrap();
        assert_eq!(aid, recovered);
    }

    #[test]
    fn test_aid_display() {
        let aid = Aid::from_bytes([0xab; 32]);
        let display = format!("{}", aid);
        assert_eq!(display, "abababababababab");
    }

    #[test]
    fn test_said_debug() {
        let said = Said::from_bytes([0xcd; 32]);
        let debug = format!("{:?}", said);
        assert!(debug.starts_with("Said("));
    }

    #[test]
    fn test_said_digest_deterministic() {
        let d1 = Said::digest(b"event bytes");
        let d2 = Said::digest(b"event bytes");
        assert_eq!(d1, d2);
        assert_ne!(d1, Said::digest(b"other bytes"));
    }

    #[test]
    fn test_zero_sentinels() {
        assert!(Aid::ZERO.is_zero());
        assert!(Said::ZERO.is_zero());
        assert!(!Said::digest(b"x").is_zero());
    }

    #[test]
    fn test_said_try_from_slice() {
        let bytes = vec![0x11u8; 32];
        let said = Said::try_from(bytes.as_slice()).unwrap();
        assert_eq!(said.as_bytes(), &[0x11u8; 32]);
        assert!(Said::try_from(&bytes[..31]).is_err());
    }
}
