//! # ora-types
//!
//! Shared domain types used across the oracle workspace: asset pairs, the
//! values that flow through the aggregation graph, data points, model
//! descriptions and the Ethereum primitives (addresses, ECDSA signatures)
//! that feeds and relays exchange.

pub mod eth;
pub mod model;
pub mod pair;
pub mod point;
pub mod value;

pub use eth::{Address, Signature};
pub use model::Model;
pub use pair::Pair;
pub use point::{Meta, Point, PointError};
pub use value::{NumericValue, StaticValue, Tick, Validatable, Value};

/// 32-byte hash.
pub type Hash = [u8; 32];
/// Transaction hash returned by the RPC node.
pub type TxHash = [u8; 32];
/// Unique MuSig session identifier.
pub type SessionId = [u8; 32];

/// Precision (decimal digits) of prices signed by feeds and stored on-chain.
pub const PRICE_PRECISION: u8 = 18;

/// Error types for domain type construction and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// A pair is empty or malformed.
    #[error("invalid pair: {0:?}")]
    InvalidPair(String),

    /// A value failed validation.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// An address is not 20 bytes of hex.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A signature is not 65 bytes.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// A string does not fit into 32 bytes.
    #[error("string {0:?} does not fit into 32 bytes")]
    Bytes32Overflow(String),
}

/// Convenience result type for type construction.
pub type Result<T> = std::result::Result<T, TypesError>;
