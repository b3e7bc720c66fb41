//! Self-minimizing decimal.
//!
//! A [`DecFloatPoint`] wraps a [`DecFixedPoint`] and, after every operation,
//! drops trailing fractional zeros so the stored precision is the smallest
//! one that represents the value exactly. Two equal values therefore always
//! have identical mantissa and precision, which makes the binary encoding
//! canonical.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{DecFixedPoint, DecimalError, Result, FLOAT_DIV_PRECISION_INCREASE, MAX_PRECISION};

/// Decimal number with automatically minimized precision.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecFloatPoint {
    inner: DecFixedPoint,
}

impl DecFloatPoint {
    /// Zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Create from an integer.
    pub fn from_int(value: impl Into<BigInt>) -> Self {
        Self { inner: DecFixedPoint::from_int(value, 0) }
    }

    /// Create from a fixed-point value, minimizing its precision.
    pub fn from_fixed(value: &DecFixedPoint) -> Self {
        Self::shrink(value.clone())
    }

    /// Create from a raw mantissa and precision, minimizing the precision.
    pub fn new(mantissa: BigInt, prec: u8) -> Self {
        Self::shrink(DecFixedPoint::new(mantissa, prec))
    }

    /// Convert an `f64`, keeping the shortest decimal that round-trips.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError::OutOfRange`] for NaN and infinities.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(DecimalError::OutOfRange(value.to_string()));
        }
        value.to_string().parse()
    }

    /// The underlying fixed-point value.
    pub fn as_fixed(&self) -> &DecFixedPoint {
        &self.inner
    }

    /// The value as fixed point at the requested precision.
    pub fn to_fixed(&self, prec: u8) -> DecFixedPoint {
        self.inner.set_prec(prec)
    }

    /// Current (minimal) precision.
    pub fn prec(&self) -> u8 {
        self.inner.prec()
    }

    /// Round to at most `prec` fractional digits.
    ///
    /// Values that already fit are returned unchanged.
    pub fn set_prec(&self, prec: u8) -> Self {
        if self.prec() <= prec {
            return self.clone();
        }
        Self::shrink(self.inner.set_prec(prec))
    }

    /// Raw mantissa at the current precision.
    pub fn mantissa(&self) -> &BigInt {
        self.inner.mantissa()
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.inner.is_zero()
    }

    /// Whether the value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.inner.is_negative()
    }

    /// Sign of the value: -1, 0 or 1.
    pub fn sign(&self) -> i8 {
        self.inner.sign()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Self { inner: self.inner.abs() }
    }

    /// Division returning `None` when `rhs` is zero.
    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        Some(self.div_unchecked(rhs))
    }

    /// Multiplicative inverse, `None` for zero.
    pub fn checked_inv(&self) -> Option<Self> {
        Self::from_int(1).checked_div(self)
    }

    /// Multiplicative inverse.
    ///
    /// # Panics
    ///
    /// Panics if the value is zero.
    pub fn inv(&self) -> Self {
        &Self::from_int(1) / self
    }

    /// Lossy conversion for display and ratios.
    pub fn to_f64(&self) -> f64 {
        self.inner.to_f64()
    }

    /// Integer part, truncated toward zero.
    pub fn to_big_int(&self) -> BigInt {
        self.inner.to_big_int()
    }

    /// Encode to the binary representation described in [`crate::codec`].
    pub fn marshal_binary(&self) -> Vec<u8> {
        self.inner.marshal_binary()
    }

    /// Decode from the binary representation, minimizing the precision.
    pub fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        Ok(Self::shrink(DecFixedPoint::unmarshal_binary(data)?))
    }

    fn shrink(value: DecFixedPoint) -> Self {
        let mut n = value.mantissa().clone();
        let mut p = value.prec();
        if n.is_zero() {
            return Self { inner: DecFixedPoint::zero(0) };
        }
        let ten = BigInt::from(10u8);
        while p > 0 {
            let (q, r) = n.div_rem(&ten);
            if !r.is_zero() {
                break;
            }
            n = q;
            p -= 1;
        }
        Self { inner: DecFixedPoint::new(n, p) }
    }

    fn add_impl(&self, rhs: &Self) -> Self {
        let p = self.prec().max(rhs.prec());
        Self::shrink(&self.inner.set_prec(p) + &rhs.inner)
    }

    fn sub_impl(&self, rhs: &Self) -> Self {
        let p = self.prec().max(rhs.prec());
        Self::shrink(&self.inner.set_prec(p) - &rhs.inner)
    }

    fn mul_impl(&self, rhs: &Self) -> Self {
        let exact = u32::from(self.prec()) + u32::from(rhs.prec());
        let n = self.mantissa() * rhs.mantissa();
        if exact <= u32::from(MAX_PRECISION) {
            return Self::new(n, exact as u8);
        }
        // Round the exact product down to the largest representable precision.
        let wide = DecFixedPoint::new(n, 0);
        let drop = exact - u32::from(MAX_PRECISION);
        let scaled = crate::round::div_round(wide.mantissa(), &crate::round::pow10(drop));
        Self::new(scaled, MAX_PRECISION)
    }

    fn div_unchecked(&self, rhs: &Self) -> Self {
        let p = self
            .prec()
            .max(rhs.prec())
            .saturating_add(FLOAT_DIV_PRECISION_INCREASE)
            .min(MAX_PRECISION);
        Self::shrink(&self.inner.set_prec(p) / &rhs.inner)
    }
}

impl From<DecFixedPoint> for DecFloatPoint {
    fn from(value: DecFixedPoint) -> Self {
        Self::shrink(value)
    }
}

impl From<i64> for DecFloatPoint {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl fmt::Display for DecFloatPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl FromStr for DecFloatPoint {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::shrink(s.parse::<DecFixedPoint>()?))
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $impl:ident) => {
        impl $trait<&DecFloatPoint> for &DecFloatPoint {
            type Output = DecFloatPoint;
            fn $method(self, rhs: &DecFloatPoint) -> DecFloatPoint {
                self.$impl(rhs)
            }
        }

        impl $trait<DecFloatPoint> for DecFloatPoint {
            type Output = DecFloatPoint;
            fn $method(self, rhs: DecFloatPoint) -> DecFloatPoint {
                (&self).$impl(&rhs)
            }
        }
    };
}

forward_binop!(Add, add, add_impl);
forward_binop!(Sub, sub, sub_impl);
forward_binop!(Mul, mul, mul_impl);

impl Div<&DecFloatPoint> for &DecFloatPoint {
    type Output = DecFloatPoint;

    /// # Panics
    ///
    /// Panics on division by zero.
    #[allow(clippy::panic)]
    fn div(self, rhs: &DecFloatPoint) -> DecFloatPoint {
        if rhs.is_zero() {
            panic!("decimal division by zero");
        }
        self.div_unchecked(rhs)
    }
}

impl Div<DecFloatPoint> for DecFloatPoint {
    type Output = DecFloatPoint;

    fn div(self, rhs: DecFloatPoint) -> DecFloatPoint {
        &self / &rhs
    }
}

impl Neg for &DecFloatPoint {
    type Output = DecFloatPoint;
    fn neg(self) -> DecFloatPoint {
        DecFloatPoint { inner: -&self.inner }
    }
}

impl Neg for DecFloatPoint {
    type Output = DecFloatPoint;
    fn neg(self) -> DecFloatPoint {
        DecFloatPoint { inner: -self.inner }
    }
}

impl PartialEq<DecFixedPoint> for DecFloatPoint {
    fn eq(&self, other: &DecFixedPoint) -> bool {
        self.inner.cmp(other) == Ordering::Equal
    }
}

impl Serialize for DecFloatPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DecFloatPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn f(s: &str) -> DecFloatPoint {
        s.parse().expect("valid decimal")
    }

    #[test]
    fn test_parse_minimizes() {
        let x = f("1.2500");
        assert_eq!(x.prec(), 2);
        assert_eq!(x.to_string(), "1.25");
        assert_eq!(f("100").prec(), 0);
        assert_eq!(f("0.000").prec(), 0);
    }

    #[test]
    fn test_add_minimizes() {
        let r = &f("0.25") + &f("0.75");
        assert_eq!(r.prec(), 0);
        assert_eq!(r, DecFloatPoint::from_int(1));
    }

    #[test]
    fn test_mul_exact() {
        let r = &f("1.5") * &f("0.25");
        assert_eq!(r.to_string(), "0.375");
        assert_eq!(r.prec(), 3);
    }

    #[test]
    fn test_div_adds_precision() {
        let r = &f("1") / &f("3");
        assert_eq!(r.prec(), 16);
        assert_eq!(r.to_string(), "0.3333333333333333");
        let r = &f("1") / &f("4");
        assert_eq!(r.to_string(), "0.25");
    }

    #[test]
    fn test_inv() {
        assert_eq!(f("8").inv().to_string(), "0.125");
        assert!(f("0").checked_inv().is_none());
    }

    #[test]
    fn test_set_prec_only_reduces() {
        let x = f("1.23456");
        assert_eq!(x.set_prec(2).to_string(), "1.23");
        assert_eq!(x.set_prec(10), x);
        assert_eq!(f("1.996").set_prec(2).to_string(), "2");
    }

    #[test]
    fn test_mul_caps_precision() {
        let tiny = DecFloatPoint::new(BigInt::from(1), 200);
        let r = &tiny * &tiny;
        assert!(r.is_zero());
        assert!(r.prec() <= MAX_PRECISION);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(DecFloatPoint::from_f64(0.1).expect("finite").to_string(), "0.1");
        assert!(DecFloatPoint::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_binary_roundtrip_keeps_canonical_form() {
        let x = f("-12345.678");
        let decoded = DecFloatPoint::unmarshal_binary(&x.marshal_binary()).expect("decode");
        assert_eq!(decoded.mantissa(), x.mantissa());
        assert_eq!(decoded.prec(), x.prec());
    }

    fn minimal_prec(x: &DecFloatPoint) -> bool {
        x.prec() == 0 || !(x.mantissa() % BigInt::from(10u8)).is_zero()
    }

    proptest! {
        #[test]
        fn prop_operations_keep_precision_minimal(
            a in -1_000_000_000i64..1_000_000_000,
            ap in 0u8..12,
            b in -1_000_000_000i64..1_000_000_000,
            bp in 0u8..12,
        ) {
            let x = DecFloatPoint::new(BigInt::from(a), ap);
            let y = DecFloatPoint::new(BigInt::from(b), bp);
            prop_assert!(minimal_prec(&(&x + &y)));
            prop_assert!(minimal_prec(&(&x - &y)));
            prop_assert!(minimal_prec(&(&x * &y)));
            if let Some(q) = x.checked_div(&y) {
                prop_assert!(minimal_prec(&q));
            }
        }

        #[test]
        fn prop_add_sub_inverse(a in any::<i64>(), ap in 0u8..20, b in any::<i64>(), bp in 0u8..20) {
            let x = DecFloatPoint::new(BigInt::from(a), ap);
            let y = DecFloatPoint::new(BigInt::from(b), bp);
            prop_assert_eq!(&(&x + &y) - &y, x);
        }
    }
}
