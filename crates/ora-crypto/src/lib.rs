//! # ora-crypto
//!
//! Cryptographic primitives for feeds and relays.
//!
//! Feeds sign each data point with a secp256k1 key so that relays and
//! on-chain contracts can recover the signing address. The suite is fixed:
//! Keccak-256 hashing, Ethereum personal-message prefixing and recoverable
//! ECDSA.
//!
//! ## Modules
//!
//! - [`keccak`]: Keccak-256 and Ethereum message hashing
//! - [`secp256k1`]: private keys, signing and address recovery
//! - [`tick`]: signers and recoverers for tick data points

pub mod keccak;
pub mod secp256k1;
pub mod tick;

use ora_types::{Address, Point, Signature};

pub use secp256k1::PrivateKey;
pub use tick::{TickRecoverer, TickSigner};

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// ECDSA signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signer address could not be recovered from a signature.
    #[error("recovery failed: {0}")]
    Recovery(String),

    /// The point's value kind is not handled by this signer.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Signs data points of the value kinds it supports.
pub trait Signer: Send + Sync {
    /// Whether this signer can sign `point`.
    fn supports(&self, point: &Point) -> bool;

    /// Sign `point` as the value of data model `model`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedValue`] if [`Signer::supports`] is
    /// false for the point, or a signing error.
    fn sign(&self, model: &str, point: &Point) -> Result<Signature>;

    /// Address of the signing key.
    fn address(&self) -> Address;
}

/// Recovers the signing address of data points.
pub trait Recoverer: Send + Sync {
    fn supports(&self, point: &Point) -> bool;

    /// Recover the address that produced `signature` over `point`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Recovery`] if the signature is malformed.
    fn recover(&self, model: &str, point: &Point, signature: &Signature) -> Result<Address>;
}
