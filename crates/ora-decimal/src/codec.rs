//! Binary encoding of decimals.
//!
//! ## Format
//!
//! ```text
//! byte 0      version (always 0)
//! byte 1      precision (fractional digits)
//! byte 2      big-integer marker: 0x02 | sign (1 = negative)
//! bytes 3..   big-endian magnitude of the mantissa (empty for zero)
//! ```
//!
//! The big-integer part uses sign-magnitude form, the same layout peers on
//! the network already produce, so encoded prices hash identically.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::{DecimalError, Result};

/// Current encoding version.
pub const CODEC_VERSION: u8 = 0;

/// Version of the embedded big-integer encoding, stored in the marker byte.
const BIG_INT_VERSION: u8 = 1;

pub(crate) fn encode(n: &BigInt, prec: u8) -> Vec<u8> {
    let (sign, magnitude) = n.to_bytes_be();
    let mut marker = BIG_INT_VERSION << 1;
    if sign == Sign::Minus {
        marker |= 1;
    }
    let mut out = Vec::with_capacity(3 + magnitude.len());
    out.push(CODEC_VERSION);
    out.push(prec);
    out.push(marker);
    if !n.is_zero() {
        out.extend_from_slice(&magnitude);
    }
    out
}

pub(crate) fn decode(data: &[u8]) -> Result<(BigInt, u8)> {
    let [version, prec, marker, magnitude @ ..] = data else {
        return Err(DecimalError::Malformed(format!(
            "need at least 3 bytes, got {}",
            data.len()
        )));
    };
    let (version, prec, marker) = (*version, *prec, *marker);
    if version != CODEC_VERSION {
        return Err(DecimalError::UnsupportedVersion(version));
    }
    if marker >> 1 != BIG_INT_VERSION {
        return Err(DecimalError::Malformed(format!(
            "unsupported big integer marker {marker:#04x}"
        )));
    }
    let negative = marker & 1 == 1;
    let n = BigInt::from_bytes_be(Sign::Plus, magnitude);
    if negative && n.is_zero() {
        return Err(DecimalError::Malformed("negative zero".to_string()));
    }
    if magnitude.first() == Some(&0) {
        return Err(DecimalError::Malformed("non-canonical magnitude".to_string()));
    }
    Ok((if negative { -n } else { n }, prec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecFixedPoint;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let x = DecFixedPoint::new(BigInt::from(-258), 2);
        assert_eq!(x.marshal_binary(), vec![0, 2, 0x03, 0x01, 0x02]);
    }

    #[test]
    fn test_zero_has_no_magnitude() {
        let x = DecFixedPoint::zero(18);
        assert_eq!(x.marshal_binary(), vec![0, 18, 0x02]);
    }

    #[test]
    fn test_rejects_short_input() {
        assert!(matches!(decode(&[0, 1]), Err(DecimalError::Malformed(_))));
        assert!(matches!(decode(&[]), Err(DecimalError::Malformed(_))));
    }

    #[test]
    fn test_rejects_unknown_version() {
        assert_eq!(decode(&[1, 0, 0x02]), Err(DecimalError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_rejects_negative_zero() {
        assert!(decode(&[0, 0, 0x03]).is_err());
    }

    #[test]
    fn test_rejects_leading_zero_magnitude() {
        assert!(decode(&[0, 0, 0x02, 0x00, 0x01]).is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_is_bit_identical(bytes in proptest::collection::vec(any::<u8>(), 0..40), neg in any::<bool>(), prec in any::<u8>()) {
            let mut n = BigInt::from_bytes_be(Sign::Plus, &bytes);
            if neg {
                n = -n;
            }
            let x = DecFixedPoint::new(n, prec);
            let encoded = x.marshal_binary();
            let y = DecFixedPoint::unmarshal_binary(&encoded).expect("decode");
            prop_assert_eq!(y.mantissa(), x.mantissa());
            prop_assert_eq!(y.prec(), x.prec());
            prop_assert_eq!(y.marshal_binary(), encoded);
        }
    }
}
