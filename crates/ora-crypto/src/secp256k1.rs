//! secp256k1 ECDSA keys, signing and address recovery.
//!
//! Signatures are deterministic (RFC 6979) and normalized to low-S, so
//! signing the same hash twice with the same key yields identical bytes.

use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use k256::SecretKey;
use ora_types::{Address, Signature};

use crate::keccak::keccak256;
use crate::{CryptoError, Result};

/// Offset added to the recovery id to form the Ethereum `v` value.
pub const V_OFFSET: u8 = 27;

/// A secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: SigningKey::random(&mut csprng),
        }
    }

    /// Create a key from its 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the scalar is zero or out of
    /// range.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret),
        })
    }

    /// Create a key from a hex string, with or without `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] on malformed hex or an invalid
    /// scalar.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Ethereum address of this key.
    pub fn address(&self) -> Address {
        public_key_address(self.inner.verifying_key())
    }

    /// Sign a 32-byte hash.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Signing`] if the underlying ECDSA operation
    /// fails.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<Signature> {
        let (sig, recid) = self
            .inner
            .sign_prehash_recoverable(hash)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            v: V_OFFSET + recid.to_byte(),
            r,
            s,
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address())
            .finish()
    }
}

/// Recover the address that signed `hash`.
///
/// # Errors
///
/// Returns [`CryptoError::Recovery`] if `v` is not 27 or 28 or if `r`/`s` do
/// not form a valid signature.
pub fn recover_address(hash: &[u8; 32], signature: &Signature) -> Result<Address> {
    let recid = signature
        .v
        .checked_sub(V_OFFSET)
        .filter(|id| *id <= 1)
        .and_then(RecoveryId::from_byte)
        .ok_or_else(|| CryptoError::Recovery(format!("invalid v value {}", signature.v)))?;
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);
    let sig = k256::ecdsa::Signature::from_slice(&rs).map_err(|e| CryptoError::Recovery(e.to_string()))?;
    let key = VerifyingKey::recover_from_prehash(hash, &sig, recid)
        .map_err(|e| CryptoError::Recovery(e.to_string()))?;
    Ok(public_key_address(&key))
}

/// Ethereum address of a public key: the last 20 bytes of the Keccak-256 of
/// the uncompressed point without its `0x04` tag.
pub fn public_key_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}
