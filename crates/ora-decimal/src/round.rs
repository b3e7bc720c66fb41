//! Integer helpers shared by the decimal kinds.

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use crate::{DecimalError, Result, MAX_PRECISION};

/// `10^exp` as a big integer.
pub(crate) fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u8).pow(exp)
}

/// Divide rounding half away from zero.
///
/// `d` must not be zero.
pub(crate) fn div_round(n: &BigInt, d: &BigInt) -> BigInt {
    let (q, r) = n.div_rem(d);
    if r.is_zero() {
        return q;
    }
    let twice = r.abs() * 2u8;
    if twice >= d.abs() {
        if (n.sign() == Sign::Minus) == (d.sign() == Sign::Minus) {
            q + BigInt::one()
        } else {
            q - BigInt::one()
        }
    } else {
        q
    }
}

/// Rescale a mantissa from precision `from` to precision `to`.
pub(crate) fn rescale(n: &BigInt, from: u32, to: u32) -> BigInt {
    match to.cmp(&from) {
        std::cmp::Ordering::Equal => n.clone(),
        std::cmp::Ordering::Greater => n * pow10(to - from),
        std::cmp::Ordering::Less => div_round(n, &pow10(from - to)),
    }
}

/// Parse a decimal string into an exact `(mantissa, scale)` pair where the
/// value is `mantissa * 10^-scale`. The scale may exceed [`MAX_PRECISION`];
/// callers round afterwards.
pub(crate) fn parse_exact(s: &str) -> Result<(BigInt, u32)> {
    let err = || DecimalError::Parse(s.to_string());
    let s = s.trim();
    if s.is_empty() {
        return Err(err());
    }

    let (body, exp) = match s.find(['e', 'E']) {
        Some(idx) => {
            let exp: i64 = s[idx + 1..].parse().map_err(|_| err())?;
            (&s[..idx], exp)
        }
        None => (s, 0),
    };

    let (negative, digits) = match body.as_bytes().first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }

    let all: String = format!("{int_part}{frac_part}");
    let mut mantissa = BigInt::parse_bytes(all.as_bytes(), 10).ok_or_else(err)?;
    if negative {
        mantissa = -mantissa;
    }

    let scale = frac_part.len() as i64 - exp;
    if scale.abs() > 4 * i64::from(MAX_PRECISION) {
        return Err(DecimalError::OutOfRange(s.to_string()));
    }
    if scale < 0 {
        mantissa *= pow10(scale.unsigned_abs() as u32);
        Ok((mantissa, 0))
    } else {
        Ok((mantissa, scale as u32))
    }
}

/// Format `mantissa * 10^-prec` with trailing fractional zeros stripped.
pub(crate) fn format(n: &BigInt, prec: u8) -> String {
    if n.is_zero() {
        return "0".to_string();
    }
    let digits = n.abs().to_str_radix(10);
    let prec = prec as usize;
    let (int_part, frac_part) = if digits.len() > prec {
        let (i, f) = digits.split_at(digits.len() - prec);
        (i.to_string(), f.to_string())
    } else {
        ("0".to_string(), format!("{}{}", "0".repeat(prec - digits.len()), digits))
    };
    let frac_part = frac_part.trim_end_matches('0');
    let sign = if n.sign() == Sign::Minus { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{sign}{int_part}")
    } else {
        format!("{sign}{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_round_half_away_from_zero() {
        assert_eq!(div_round(&BigInt::from(15), &BigInt::from(10)), BigInt::from(2));
        assert_eq!(div_round(&BigInt::from(14), &BigInt::from(10)), BigInt::from(1));
        assert_eq!(div_round(&BigInt::from(-15), &BigInt::from(10)), BigInt::from(-2));
        assert_eq!(div_round(&BigInt::from(-14), &BigInt::from(10)), BigInt::from(-1));
        assert_eq!(div_round(&BigInt::from(15), &BigInt::from(-10)), BigInt::from(-2));
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(&BigInt::from(125), 2, 1), BigInt::from(13));
        assert_eq!(rescale(&BigInt::from(125), 2, 4), BigInt::from(12500));
    }

    #[test]
    fn test_parse_exact() {
        assert_eq!(parse_exact("1.50").expect("parse"), (BigInt::from(150), 2));
        assert_eq!(parse_exact("-0.001").expect("parse"), (BigInt::from(-1), 3));
        assert_eq!(parse_exact("12e3").expect("parse"), (BigInt::from(12000), 0));
        assert_eq!(parse_exact("1.5e-2").expect("parse"), (BigInt::from(15), 3));
        assert_eq!(parse_exact(".5").expect("parse"), (BigInt::from(5), 1));
        assert!(parse_exact("").is_err());
        assert!(parse_exact("1.2.3").is_err());
        assert!(parse_exact("abc").is_err());
        assert!(parse_exact("-").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format(&BigInt::from(0), 5), "0");
        assert_eq!(format(&BigInt::from(1500), 3), "1.5");
        assert_eq!(format(&BigInt::from(-5), 3), "-0.005");
        assert_eq!(format(&BigInt::from(42), 0), "42");
        assert_eq!(format(&BigInt::from(4200), 2), "42");
    }
}
