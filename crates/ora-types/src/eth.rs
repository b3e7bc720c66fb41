//! Ethereum primitives shared by signers, stores and contract wrappers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::serde_as;

use crate::{Result, TypesError};

/// A 20-byte Ethereum address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// # Errors
    ///
    /// Returns [`TypesError::InvalidAddress`] unless `bytes` is exactly 20
    /// bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidAddress(format!("expected 20 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| TypesError::InvalidAddress(format!("{s}: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recoverable secp256k1 ECDSA signature in Ethereum form.
///
/// `v` is `27 + recovery_id`.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub v: u8,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub r: [u8; 32],
    #[serde_as(as = "serde_with::hex::Hex")]
    pub s: [u8; 32],
}

impl Signature {
    /// Length of the `r ‖ s ‖ v` form.
    pub const LEN: usize = 65;

    /// Parse the 65-byte `r ‖ s ‖ v` form.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidSignature`] if `bytes` is not 65 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { v: bytes[64], r, s })
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Whether all of `v`, `r` and `s` are set.
    pub fn is_complete(&self) -> bool {
        self.v != 0 && self.r != [0u8; 32] && self.s != [0u8; 32]
    }
}

/// Encode a string as a zero-padded `bytes32`, as used for `wat` values.
///
/// # Errors
///
/// Returns [`TypesError::Bytes32Overflow`] if the string is longer than 32
/// bytes.
pub fn string_to_bytes32(s: &str) -> Result<[u8; 32]> {
    let bytes = s.as_bytes();
    if bytes.len() > 32 {
        return Err(TypesError::Bytes32Overflow(s.to_string()));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Decode a zero-padded `bytes32` into a string, dropping trailing zeros.
pub fn bytes32_to_string(b: &[u8; 32]) -> String {
    let end = b.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&b[..end]).into_owned()
}
