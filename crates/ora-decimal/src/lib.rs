//! # ora-decimal
//!
//! Deterministic base-10 arithmetic for prices.
//!
//! Binary floating point is never used for values that are signed or sent
//! over the wire. Two kinds of decimal are provided:
//!
//! - [`DecFixedPoint`]: a big-integer mantissa with a fixed number of
//!   fractional digits. The precision of the left operand is kept after every
//!   operation.
//! - [`DecFloatPoint`]: a fixed-point decimal whose precision shrinks to the
//!   minimum needed after every operation, which keeps encoded messages small
//!   and hashes stable.
//!
//! ## Modules
//!
//! - [`fixed`]: fixed-precision decimal
//! - [`float`]: self-minimizing decimal
//! - [`codec`]: binary encoding shared by both kinds

pub mod codec;
pub mod fixed;
pub mod float;
mod round;

pub use fixed::DecFixedPoint;
pub use float::DecFloatPoint;

/// Largest precision (fractional digits) a decimal can carry.
pub const MAX_PRECISION: u8 = 255;

/// Guard digits added by fixed-point division before rounding.
pub const DIV_GUARD_DIGITS: u8 = 2;

/// Extra digits used by float-point division before shrinking.
pub const FLOAT_DIV_PRECISION_INCREASE: u8 = 16;

/// Error types for decimal parsing and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecimalError {
    /// The string is not a decimal number.
    #[error("invalid decimal string: {0:?}")]
    Parse(String),

    /// The binary encoding uses an unknown version byte.
    #[error("unsupported decimal encoding version {0}")]
    UnsupportedVersion(u8),

    /// The binary encoding is truncated or inconsistent.
    #[error("malformed decimal encoding: {0}")]
    Malformed(String),

    /// The value cannot be represented (NaN, infinity, out of range).
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// Convenience result type for decimal operations.
pub type Result<T> = std::result::Result<T, DecimalError>;
