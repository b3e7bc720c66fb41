//! Keccak-256 hashing.
//!
//! Ethereum uses the original Keccak padding, not NIST SHA3-256.

use sha3::{Digest, Keccak256};

/// Prefix prepended to 32-byte messages before signing (EIP-191).
pub const ETH_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hash of a 32-byte message as signed by `eth_sign`.
///
/// `keccak256("\x19Ethereum Signed Message:\n32" || message)`
pub fn eth_message_hash(message: &[u8; 32]) -> [u8; 32] {
    keccak256_concat(&[ETH_MESSAGE_PREFIX, message])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_concat_matches_single() {
        assert_eq!(keccak256_concat(&[b"foo", b"bar"]), keccak256(b"foobar"));
    }

    #[test]
    fn test_eth_message_hash_prefix() {
        let msg = [7u8; 32];
        let mut buf = ETH_MESSAGE_PREFIX.to_vec();
        buf.extend_from_slice(&msg);
        assert_eq!(eth_message_hash(&msg), keccak256(&buf));
    }
}
