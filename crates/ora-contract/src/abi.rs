//! Solidity ABI encoding and decoding.
//!
//! Only the types used by the oracle contracts are supported:
//! `uint<N>`, `address`, `bytes32`, `bytes`, `bool`, dynamic arrays and
//! tuples. Every value occupies one or more 32-byte words; dynamic values
//! are referenced from the head by an offset relative to the start of the
//! enclosing tuple.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use ora_crypto::keccak::keccak256;
use ora_types::Address;

use crate::{ContractError, Result};

const WORD: usize = 32;

/// ABI type of a value to decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    /// Any `uintN`.
    Uint,
    Address,
    FixedBytes32,
    Bytes,
    Bool,
    Array(Box<ParamType>),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::Array(_) => true,
            ParamType::Tuple(types) => types.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(types) if !self.is_dynamic() => types.iter().map(ParamType::head_size).sum(),
            _ => WORD,
        }
    }
}

/// An ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Uint(BigUint),
    Address(Address),
    FixedBytes32([u8; 32]),
    Bytes(Vec<u8>),
    Bool(bool),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn uint(value: impl Into<BigUint>) -> Self {
        Token::Uint(value.into())
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(tokens) => tokens.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::Tuple(tokens) if !self.is_dynamic() => tokens.iter().map(Token::head_size).sum(),
            _ => WORD,
        }
    }

    pub fn as_uint(&self) -> Option<&BigUint> {
        match self {
            Token::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_uint().and_then(ToPrimitive::to_u64)
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_bytes32(&self) -> Option<[u8; 32]> {
        match self {
            Token::FixedBytes32(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Token::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Token]> {
        match self {
            Token::Array(tokens) => Some(tokens),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Token]> {
        match self {
            Token::Tuple(tokens) => Some(tokens),
            _ => None,
        }
    }
}

/// First four bytes of the Keccak-256 of a canonical signature such as
/// `"poke(uint256[],uint256[],uint8[],bytes32[],bytes32[])"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode `tokens` as the arguments of a call.
///
/// # Errors
///
/// Returns [`ContractError::Abi`] if an integer does not fit in 256 bits.
pub fn encode(tokens: &[Token]) -> Result<Vec<u8>> {
    encode_tuple(tokens)
}

/// Selector of `signature` followed by the encoded `tokens`.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_call(signature: &str, tokens: &[Token]) -> Result<Vec<u8>> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens)?);
    Ok(out)
}

fn encode_tuple(tokens: &[Token]) -> Result<Vec<u8>> {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_token(token)?);
        } else {
            head.extend(encode_token(token)?);
        }
    }
    head.extend(tail);
    Ok(head)
}

fn encode_token(token: &Token) -> Result<Vec<u8>> {
    Ok(match token {
        Token::Uint(v) => uint_word(v)?.to_vec(),
        Token::Address(a) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(a.as_bytes());
            word.to_vec()
        }
        Token::FixedBytes32(b) => b.to_vec(),
        Token::Bool(b) => usize_word(usize::from(*b)).to_vec(),
        Token::Bytes(b) => {
            let mut out = usize_word(b.len()).to_vec();
            out.extend_from_slice(b);
            out.resize(WORD + b.len().div_ceil(WORD) * WORD, 0);
            out
        }
        Token::Array(tokens) => {
            let mut out = usize_word(tokens.len()).to_vec();
            out.extend(encode_tuple(tokens)?);
            out
        }
        Token::Tuple(tokens) => encode_tuple(tokens)?,
    })
}

fn uint_word(v: &BigUint) -> Result<[u8; WORD]> {
    let mut word = [0u8; WORD];
    if v.is_zero() {
        return Ok(word);
    }
    let bytes = v.to_bytes_be();
    if bytes.len() > WORD {
        return Err(ContractError::Abi(format!("integer {v} overflows uint256")));
    }
    word[WORD - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

fn usize_word(v: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(v as u64).to_be_bytes());
    word
}

/// Decode `data` as a tuple of `types`.
///
/// # Errors
///
/// Returns [`ContractError::Abi`] if the data is truncated or an offset
/// points outside of it.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    decode_tuple(types, data, 0)
}

fn decode_tuple(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>> {
    let mut pos = base;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, pos)?;
            let start = base
                .checked_add(offset)
                .ok_or_else(|| ContractError::Abi("offset overflow".to_string()))?;
            out.push(decode_token(ty, data, start)?);
            pos += WORD;
        } else {
            out.push(decode_token(ty, data, pos)?);
            pos += ty.head_size();
        }
    }
    Ok(out)
}

fn decode_token(ty: &ParamType, data: &[u8], pos: usize) -> Result<Token> {
    Ok(match ty {
        ParamType::Uint => Token::Uint(BigUint::from_bytes_be(read_word(data, pos)?)),
        ParamType::Address => {
            let word = read_word(data, pos)?;
            Token::Address(Address::from_slice(&word[12..]).map_err(|e| ContractError::Abi(e.to_string()))?)
        }
        ParamType::FixedBytes32 => {
            let mut b = [0u8; WORD];
            b.copy_from_slice(read_word(data, pos)?);
            Token::FixedBytes32(b)
        }
        ParamType::Bool => Token::Bool(read_word(data, pos)?.iter().any(|&b| b != 0)),
        ParamType::Bytes => {
            let len = read_usize(data, pos)?;
            Token::Bytes(read_slice(data, pos + WORD, len)?.to_vec())
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, pos)?;
            if len > data.len() / WORD {
                return Err(ContractError::Abi(format!("array length {len} exceeds data")));
            }
            let types = vec![(**inner).clone(); len];
            Token::Array(decode_tuple(&types, data, pos + WORD)?)
        }
        ParamType::Tuple(types) => Token::Tuple(decode_tuple(types, data, pos)?),
    })
}

fn read_slice(data: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    pos.checked_add(len)
        .and_then(|end| data.get(pos..end))
        .ok_or_else(|| ContractError::Abi(format!("need {len} bytes at {pos}, have {}", data.len())))
}

fn read_word(data: &[u8], pos: usize) -> Result<&[u8]> {
    read_slice(data, pos, WORD)
}

fn read_usize(data: &[u8], pos: usize) -> Result<usize> {
    BigUint::from_bytes_be(read_word(data, pos)?)
        .to_usize()
        .ok_or_else(|| ContractError::Abi(format!("length or offset at {pos} too large")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("Error(string)")), "08c379a0");
    }

    #[test]
    fn test_encode_static() {
        let data = encode(&[Token::uint(1u8), Token::Bool(true)]).expect("encode");
        assert_eq!(data.len(), 64);
        assert_eq!(data[31], 1);
        assert_eq!(data[63], 1);
    }

    #[test]
    fn test_encode_dynamic_array_layout() {
        let data = encode(&[Token::Array(vec![Token::uint(5u8), Token::uint(6u8)])]).expect("encode");
        // offset, length, two elements
        assert_eq!(data.len(), 4 * 32);
        assert_eq!(data[31], 0x20);
        assert_eq!(data[63], 2);
        assert_eq!(data[95], 5);
        assert_eq!(data[127], 6);
    }

    #[test]
    fn test_bytes_are_padded() {
        let data = encode(&[Token::Bytes(vec![1, 2, 3])]).expect("encode");
        assert_eq!(data.len(), 3 * 32);
        assert_eq!(&data[64..67], &[1, 2, 3]);
        assert!(data[67..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_static_tuple_inline_dynamic_tuple_offset() {
        let poke = Token::Tuple(vec![Token::uint(100u8), Token::uint(7u8)]);
        let schnorr = Token::Tuple(vec![
            Token::FixedBytes32([9u8; 32]),
            Token::Address(Address([1u8; 20])),
            Token::Bytes(vec![0, 1]),
        ]);
        let data = encode(&[poke.clone(), schnorr.clone()]).expect("encode");
        // head: two words of the static tuple, one offset word
        assert_eq!(data[95], 0x60);

        let types = vec![
            ParamType::Tuple(vec![ParamType::Uint, ParamType::Uint]),
            ParamType::Tuple(vec![ParamType::FixedBytes32, ParamType::Address, ParamType::Bytes]),
        ];
        let decoded = decode(&types, &data).expect("decode");
        assert_eq!(decoded, vec![poke, schnorr]);
    }

    #[test]
    fn test_decode_nested_arrays() {
        let tokens = vec![
            Token::Array(vec![Token::Address(Address([2u8; 20])), Token::Address(Address([3u8; 20]))]),
            Token::Array(vec![Token::uint(1u8), Token::uint(2u8)]),
        ];
        let data = encode(&tokens).expect("encode");
        let types = vec![
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::Uint)),
        ];
        assert_eq!(decode(&types, &data).expect("decode"), tokens);
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode(&[ParamType::Uint], &[0u8; 31]).is_err());
        let mut bad_offset = [0u8; 32];
        bad_offset[31] = 0xff;
        assert!(decode(&[ParamType::Bytes], &bad_offset).is_err());
    }

    #[test]
    fn test_uint_overflow() {
        let too_big = BigUint::from(1u8) << 256;
        assert!(encode(&[Token::Uint(too_big)]).is_err());
    }
}
