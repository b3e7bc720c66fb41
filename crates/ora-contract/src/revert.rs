//! Decoding of revert data returned with failed calls.
//!
//! Revert data is a selector followed by ABI-encoded arguments. Besides the
//! built-in `Error(string)` and `Panic(uint256)`, the oracle contracts
//! define custom errors which are looked up in a registry built once on
//! first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use ora_types::Address;

use crate::abi::{self, ParamType, Token};

const ERROR_SIGNATURE: &str = "Error(string)";
const PANIC_SIGNATURE: &str = "Panic(uint256)";

/// Custom errors raised by Scribe and OpScribe contracts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomError {
    StaleMessage { given: u32, current: u32 },
    FutureMessage { given: u32, current: u32 },
    BarNotReached { num_signers: u8, bar: u8 },
    SignerNotFeed(Address),
    SignersNotOrdered,
    SchnorrSignatureInvalid,
    InChallengePeriod,
    NoOpPokeToChallenge,
    SchnorrDataMismatch { given: BigUint, expected: BigUint },
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomError::StaleMessage { given, current } => write!(f, "StaleMessage({given}, {current})"),
            CustomError::FutureMessage { given, current } => write!(f, "FutureMessage({given}, {current})"),
            CustomError::BarNotReached { num_signers, bar } => write!(f, "BarNotReached({num_signers}, {bar})"),
            CustomError::SignerNotFeed(addr) => write!(f, "SignerNotFeed({addr})"),
            CustomError::SignersNotOrdered => f.write_str("SignersNotOrdered()"),
            CustomError::SchnorrSignatureInvalid => f.write_str("SchnorrSignatureInvalid()"),
            CustomError::InChallengePeriod => f.write_str("InChallengePeriod()"),
            CustomError::NoOpPokeToChallenge => f.write_str("NoOpPokeToChallenge()"),
            CustomError::SchnorrDataMismatch { given, expected } => {
                write!(f, "SchnorrDataMismatch({given:#x}, {expected:#x})")
            }
        }
    }
}

/// A decoded revert reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Revert {
    /// `require(cond, "reason")` or `revert("reason")`.
    Error(String),
    /// Compiler-inserted panic with its code.
    Panic(BigUint),
    Custom(CustomError),
    /// Revert data that matches no known selector.
    Unknown(Vec<u8>),
}

impl Revert {
    /// Decode raw revert data. Never fails: unrecognized data is kept as
    /// [`Revert::Unknown`].
    pub fn decode(data: &[u8]) -> Self {
        let Some((sel, args)) = split_selector(data) else {
            return Revert::Unknown(data.to_vec());
        };
        if sel == abi::selector(ERROR_SIGNATURE) {
            if let Some(msg) = abi::decode(&[ParamType::Bytes], args)
                .ok()
                .and_then(|t| t.first().and_then(Token::as_bytes).map(|b| String::from_utf8_lossy(b).into_owned()))
            {
                return Revert::Error(msg);
            }
        } else if sel == abi::selector(PANIC_SIGNATURE) {
            if let Some(code) = abi::decode(&[ParamType::Uint], args)
                .ok()
                .and_then(|t| t.first().and_then(Token::as_uint).cloned())
            {
                return Revert::Panic(code);
            }
        } else if let Some(spec) = CUSTOM_ERRORS.get(&sel) {
            if let Some(err) = abi::decode(&spec.params, args).ok().and_then(|t| (spec.build)(&t)) {
                return Revert::Custom(err);
            }
        }
        Revert::Unknown(data.to_vec())
    }

    /// Name of the revert reason as declared in Solidity.
    pub fn name(&self) -> &str {
        match self {
            Revert::Error(_) => "Error",
            Revert::Panic(_) => "Panic",
            Revert::Custom(err) => custom_error_name(err),
            Revert::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revert::Error(msg) => write!(f, "Error({msg:?})"),
            Revert::Panic(code) => write!(f, "Panic({code:#x})"),
            Revert::Custom(err) => err.fmt(f),
            Revert::Unknown(data) if data.is_empty() => f.write_str("execution reverted"),
            Revert::Unknown(data) => write!(f, "unknown revert 0x{}", hex::encode(data)),
        }
    }
}

fn split_selector(data: &[u8]) -> Option<([u8; 4], &[u8])> {
    let (sel, rest) = data.split_first_chunk::<4>()?;
    Some((*sel, rest))
}

fn custom_error_name(err: &CustomError) -> &'static str {
    match err {
        CustomError::StaleMessage { .. } => "StaleMessage",
        CustomError::FutureMessage { .. } => "FutureMessage",
        CustomError::BarNotReached { .. } => "BarNotReached",
        CustomError::SignerNotFeed(_) => "SignerNotFeed",
        CustomError::SignersNotOrdered => "SignersNotOrdered",
        CustomError::SchnorrSignatureInvalid => "SchnorrSignatureInvalid",
        CustomError::InChallengePeriod => "InChallengePeriod",
        CustomError::NoOpPokeToChallenge => "NoOpPokeToChallenge",
        CustomError::SchnorrDataMismatch { .. } => "SchnorrDataMismatch",
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct ErrorSpec {
    params: Vec<ParamType>,
    build: fn(&[Token]) -> Option<CustomError>,
}

fn arg_u32(tokens: &[Token], i: usize) -> Option<u32> {
    tokens.get(i).and_then(Token::as_uint).and_then(ToPrimitive::to_u32)
}

fn arg_u8(tokens: &[Token], i: usize) -> Option<u8> {
    tokens.get(i).and_then(Token::as_uint).and_then(ToPrimitive::to_u8)
}

fn arg_uint(tokens: &[Token], i: usize) -> Option<BigUint> {
    tokens.get(i).and_then(Token::as_uint).cloned()
}

static CUSTOM_ERRORS: LazyLock<HashMap<[u8; 4], ErrorSpec>> = LazyLock::new(|| {
    use ParamType::{Address as A, Uint as U};

    let specs: Vec<(&str, Vec<ParamType>, fn(&[Token]) -> Option<CustomError>)> = vec![
        ("StaleMessage(uint32,uint32)", vec![U, U], |t| {
            Some(CustomError::StaleMessage { given: arg_u32(t, 0)?, current: arg_u32(t, 1)? })
        }),
        ("FutureMessage(uint32,uint32)", vec![U, U], |t| {
            Some(CustomError::FutureMessage { given: arg_u32(t, 0)?, current: arg_u32(t, 1)? })
        }),
        ("BarNotReached(uint8,uint8)", vec![U, U], |t| {
            Some(CustomError::BarNotReached { num_signers: arg_u8(t, 0)?, bar: arg_u8(t, 1)? })
        }),
        ("SignerNotFeed(address)", vec![A], |t| {
            Some(CustomError::SignerNotFeed(t.first()?.as_address()?))
        }),
        ("SignersNotOrdered()", vec![], |_| Some(CustomError::SignersNotOrdered)),
        ("SchnorrSignatureInvalid()", vec![], |_| Some(CustomError::SchnorrSignatureInvalid)),
        ("InChallengePeriod()", vec![], |_| Some(CustomError::InChallengePeriod)),
        ("NoOpPokeToChallenge()", vec![], |_| Some(CustomError::NoOpPokeToChallenge)),
        ("SchnorrDataMismatch(uint160,uint160)", vec![U, U], |t| {
            Some(CustomError::SchnorrDataMismatch { given: arg_uint(t, 0)?, expected: arg_uint(t, 1)? })
        }),
    ];

    specs
        .into_iter()
        .map(|(signature, params, build)| (abi::selector(signature), ErrorSpec { params, build }))
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    fn revert_data(signature: &str, tokens: &[Token]) -> Vec<u8> {
        abi::encode_call(signature, tokens).expect("encode")
    }

    #[test]
    fn test_decode_error_string() {
        let data = revert_data(ERROR_SIGNATURE, &[Token::Bytes(b"Median/stale-message".to_vec())]);
        let revert = Revert::decode(&data);
        assert_eq!(revert, Revert::Error("Median/stale-message".to_string()));
        assert_eq!(revert.name(), "Error");
    }

    #[test]
    fn test_decode_panic() {
        let data = revert_data(PANIC_SIGNATURE, &[Token::uint(0x11u8)]);
        assert_eq!(Revert::decode(&data), Revert::Panic(BigUint::from(0x11u8)));
    }

    #[test]
    fn test_decode_custom_errors() {
        let data = revert_data("StaleMessage(uint32,uint32)", &[Token::uint(10u8), Token::uint(20u8)]);
        assert_eq!(
            Revert::decode(&data),
            Revert::Custom(CustomError::StaleMessage { given: 10, current: 20 })
        );

        let data = revert_data("BarNotReached(uint8,uint8)", &[Token::uint(2u8), Token::uint(13u8)]);
        let revert = Revert::decode(&data);
        assert_eq!(revert.name(), "BarNotReached");
        assert_eq!(revert.to_string(), "BarNotReached(2, 13)");

        let data = revert_data("SchnorrSignatureInvalid()", &[]);
        assert_eq!(Revert::decode(&data), Revert::Custom(CustomError::SchnorrSignatureInvalid));

        let signer = Address([5u8; 20]);
        let data = revert_data("SignerNotFeed(address)", &[Token::Address(signer)]);
        assert_eq!(Revert::decode(&data), Revert::Custom(CustomError::SignerNotFeed(signer)));
    }

    #[test]
    fn test_unknown_data() {
        assert_eq!(Revert::decode(&[1, 2]), Revert::Unknown(vec![1, 2]));
        assert_eq!(Revert::decode(&[0xde, 0xad, 0xbe, 0xef]).name(), "Unknown");
        assert_eq!(Revert::decode(&[]).to_string(), "execution reverted");
    }

    #[test]
    fn test_truncated_custom_error_is_unknown() {
        let mut data = revert_data("StaleMessage(uint32,uint32)", &[Token::uint(1u8), Token::uint(2u8)]);
        data.truncate(4 + 32);
        assert!(matches!(Revert::decode(&data), Revert::Unknown(_)));
    }
}
