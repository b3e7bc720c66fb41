//! Fixed-precision decimal.
//!
//! A [`DecFixedPoint`] is `mantissa * 10^-prec`. Arithmetic keeps the
//! precision of the left operand:
//!
//! ```text
//! add/sub: computed at max(px, py), result at px
//! mul:     computed at px + py,     result at px
//! div:     computed at px + 2,      result at px
//! ```
//!
//! Rounding is always half away from zero.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::round::{div_round, format, parse_exact, pow10, rescale};
use crate::{codec, DecimalError, Result, DIV_GUARD_DIGITS, MAX_PRECISION};

/// Fixed-precision decimal number.
#[derive(Clone, Debug)]
pub struct DecFixedPoint {
    n: BigInt,
    p: u8,
}

impl DecFixedPoint {
    /// Create a decimal from a raw mantissa and precision.
    pub fn new(mantissa: BigInt, prec: u8) -> Self {
        Self { n: mantissa, p: prec }
    }

    /// Zero at the given precision.
    pub fn zero(prec: u8) -> Self {
        Self::new(BigInt::zero(), prec)
    }

    /// Create a decimal from an integer value at the given precision.
    pub fn from_int(value: impl Into<BigInt>, prec: u8) -> Self {
        Self::new(value.into() * pow10(u32::from(prec)), prec)
    }

    /// Parse a decimal string and round it to `prec` fractional digits.
    pub fn parse_with_prec(s: &str, prec: u8) -> Result<Self> {
        let (n, scale) = parse_exact(s)?;
        Ok(Self::new(rescale(&n, scale, u32::from(prec)), prec))
    }

    /// Convert an `f64` at the given precision.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError::OutOfRange`] for NaN and infinities.
    pub fn from_f64(value: f64, prec: u8) -> Result<Self> {
        if !value.is_finite() {
            return Err(DecimalError::OutOfRange(value.to_string()));
        }
        Self::parse_with_prec(&value.to_string(), prec)
    }

    /// The raw mantissa.
    pub fn mantissa(&self) -> &BigInt {
        &self.n
    }

    /// Number of fractional digits.
    pub fn prec(&self) -> u8 {
        self.p
    }

    /// Return the same value rescaled to `prec` digits, rounding half away
    /// from zero when digits are dropped.
    pub fn set_prec(&self, prec: u8) -> Self {
        Self::new(rescale(&self.n, u32::from(self.p), u32::from(prec)), prec)
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.n.is_zero()
    }

    /// Whether the value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.n.sign() == Sign::Minus
    }

    /// Sign of the value: -1, 0 or 1.
    pub fn sign(&self) -> i8 {
        match self.n.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        }
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Self::new(self.n.abs(), self.p)
    }

    /// Division returning `None` when `rhs` is zero.
    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(self.div_unchecked(rhs))
    }

    /// Multiplicative inverse at the same precision.
    ///
    /// # Panics
    ///
    /// Panics if the value is zero.
    pub fn inv(&self) -> Self {
        &Self::from_int(1, self.p) / self
    }

    /// Integer part, truncated toward zero.
    pub fn to_big_int(&self) -> BigInt {
        &self.n / pow10(u32::from(self.p))
    }

    /// Lossy conversion for display and ratios.
    pub fn to_f64(&self) -> f64 {
        format(&self.n, self.p).parse().unwrap_or(f64::NAN)
    }

    /// Lossy conversion to a `u64` integer part.
    pub fn to_u64(&self) -> Option<u64> {
        self.to_big_int().to_u64()
    }

    /// Encode to the binary representation described in [`codec`].
    pub fn marshal_binary(&self) -> Vec<u8> {
        codec::encode(&self.n, self.p)
    }

    /// Decode from the binary representation described in [`codec`].
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        let (n, p) = codec::decode(data)?;
        Ok(Self::new(n, p))
    }

    fn add_impl(&self, rhs: &Self) -> Self {
        let p = u32::from(self.p.max(rhs.p));
        let sum = rescale(&self.n, u32::from(self.p), p) + rescale(&rhs.n, u32::from(rhs.p), p);
        Self::new(rescale(&sum, p, u32::from(self.p)), self.p)
    }

    fn sub_impl(&self, rhs: &Self) -> Self {
        self.add_impl(&Self::new(-rhs.n.clone(), rhs.p))
    }

    fn mul_impl(&self, rhs: &Self) -> Self {
        let product = &self.n * &rhs.n;
        let p = u32::from(self.p) + u32::from(rhs.p);
        Self::new(rescale(&product, p, u32::from(self.p)), self.p)
    }

    fn div_unchecked(&self, rhs: &Self) -> Self {
        // x/y at precision t = xn * 10^(py + t - px) / yn, truncated, then
        // rounded back to px.
        let t = u32::from(self.p) + u32::from(DIV_GUARD_DIGITS);
        let exp = u32::from(rhs.p) + t - u32::from(self.p);
        let q = (&self.n * pow10(exp)) / &rhs.n;
        Self::new(rescale(&q, t, u32::from(self.p)), self.p)
    }

    /// Value comparison, independent of precision.
    fn cmp_value(&self, other: &Self) -> Ordering {
        let p = u32::from(self.p.max(other.p));
        rescale(&self.n, u32::from(self.p), p).cmp(&rescale(&other.n, u32::from(other.p), p))
    }
}

impl Default for DecFixedPoint {
    fn default() -> Self {
        Self::zero(0)
    }
}

impl PartialEq for DecFixedPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for DecFixedPoint {}

impl PartialOrd for DecFixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecFixedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl fmt::Display for DecFixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(&self.n, self.p))
    }
}

impl FromStr for DecFixedPoint {
    type Err = DecimalError;

    /// Parse keeping every fractional digit of the input (capped at
    /// [`MAX_PRECISION`]).
    fn from_str(s: &str) -> Result<Self> {
        let (n, scale) = parse_exact(s)?;
        if scale > u32::from(MAX_PRECISION) {
            let prec = MAX_PRECISION;
            return Ok(Self::new(rescale(&n, scale, u32::from(prec)), prec));
        }
        Ok(Self::new(n, scale as u8))
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $impl:ident) => {
        impl $trait<&DecFixedPoint> for &DecFixedPoint {
            type Output = DecFixedPoint;
            fn $method(self, rhs: &DecFixedPoint) -> DecFixedPoint {
                self.$impl(rhs)
            }
        }

        impl $trait<DecFixedPoint> for DecFixedPoint {
            type Output = DecFixedPoint;
            fn $method(self, rhs: DecFixedPoint) -> DecFixedPoint {
                (&self).$impl(&rhs)
            }
        }
    };
}

forward_binop!(Add, add, add_impl);
forward_binop!(Sub, sub, sub_impl);
forward_binop!(Mul, mul, mul_impl);

impl Div<&DecFixedPoint> for &DecFixedPoint {
    type Output = DecFixedPoint;

    /// # Panics
    ///
    /// Panics on division by zero.
    #[allow(clippy::panic)]
    fn div(self, rhs: &DecFixedPoint) -> DecFixedPoint {
        if rhs.is_zero() {
            panic!("decimal division by zero");
        }
        self.div_unchecked(rhs)
    }
}

impl Div<DecFixedPoint> for DecFixedPoint {
    type Output = DecFixedPoint;

    fn div(self, rhs: DecFixedPoint) -> DecFixedPoint {
        &self / &rhs
    }
}

impl Neg for &DecFixedPoint {
    type Output = DecFixedPoint;
    fn neg(self) -> DecFixedPoint {
        DecFixedPoint::new(-self.n.clone(), self.p)
    }
}

impl Neg for DecFixedPoint {
    type Output = DecFixedPoint;
    fn neg(self) -> DecFixedPoint {
        DecFixedPoint::new(-self.n, self.p)
    }
}

impl Serialize for DecFixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DecFixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
