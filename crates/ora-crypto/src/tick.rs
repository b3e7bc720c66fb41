//! Signing of tick data points.
//!
//! The signed message is the same one Median contracts verify on-chain:
//!
//! ```text
//! hash = keccak256("\x19Ethereum Signed Message:\n32" || keccak256(val32 || age32 || wat32))
//! ```
//!
//! where `val32` is `price * 10^18` as a big-endian `uint256`, `age32` is the
//! point time in Unix seconds as a big-endian `uint256` and `wat32` is the
//! model name right-padded with zeros.

use chrono::{DateTime, Utc};
use num_bigint::Sign;
use ora_decimal::DecFloatPoint;
use ora_types::eth::string_to_bytes32;
use ora_types::{Address, Point, Signature, PRICE_PRECISION};

use crate::keccak::{eth_message_hash, keccak256_concat};
use crate::secp256k1::{recover_address, PrivateKey};
use crate::{CryptoError, Recoverer, Result, Signer};

/// Encode a non-negative price as `price * 10^18` in a 32-byte word.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] if the price is negative or does
/// not fit into 256 bits.
pub fn price_to_uint256(price: &DecFloatPoint) -> Result<[u8; 32]> {
    let fixed = price.to_fixed(PRICE_PRECISION);
    let (sign, magnitude) = fixed.mantissa().to_bytes_be();
    if sign == Sign::Minus {
        return Err(CryptoError::InvalidInput(format!("negative price {price}")));
    }
    if magnitude.len() > 32 {
        return Err(CryptoError::InvalidInput(format!("price {price} overflows uint256")));
    }
    let mut out = [0u8; 32];
    if sign != Sign::NoSign {
        out[32 - magnitude.len()..].copy_from_slice(&magnitude);
    }
    Ok(out)
}

/// Encode a time as Unix seconds in a 32-byte word.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] for times before the Unix epoch.
pub fn time_to_uint256(time: &DateTime<Utc>) -> Result<[u8; 32]> {
    let secs = u64::try_from(time.timestamp())
        .map_err(|_| CryptoError::InvalidInput(format!("time {time} is before the epoch")))?;
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&secs.to_be_bytes());
    Ok(out)
}

/// Message hash of a tick signed for data model `model`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] if any signed field cannot be
/// encoded.
pub fn tick_hash(model: &str, price: &DecFloatPoint, time: &DateTime<Utc>) -> Result<[u8; 32]> {
    let val = price_to_uint256(price)?;
    let age = time_to_uint256(time)?;
    let wat = string_to_bytes32(model).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let inner = keccak256_concat(&[&val, &age, &wat]);
    Ok(eth_message_hash(&inner))
}

fn point_hash(model: &str, point: &Point) -> Result<[u8; 32]> {
    let tick = point.tick().ok_or_else(|| {
        CryptoError::UnsupportedValue(
            point
                .value
                .as_ref()
                .map_or("none", |v| v.kind())
                .to_string(),
        )
    })?;
    tick_hash(model, &tick.price, &point.time)
}

/// Signs tick points with a feed key.
#[derive(Debug, Clone)]
pub struct TickSigner {
    key: PrivateKey,
}

impl TickSigner {
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }
}

impl Signer for TickSigner {
    fn supports(&self, point: &Point) -> bool {
        point.tick().is_some()
    }

    fn sign(&self, model: &str, point: &Point) -> Result<Signature> {
        let hash = point_hash(model, point)?;
        self.key.sign_hash(&hash)
    }

    fn address(&self) -> Address {
        self.key.address()
    }
}

/// Recovers feed addresses from signed tick points.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickRecoverer;

impl Recoverer for TickRecoverer {
    fn supports(&self, point: &Point) -> bool {
        point.tick().is_some()
    }

    fn recover(&self, model: &str, point: &Point, signature: &Signature) -> Result<Address> {
        let hash = point_hash(model, point)?;
        recover_address(&hash, signature)
    }
}
