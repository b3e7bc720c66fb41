//! Median oracle.
//!
//! The Median contract accepts a batch of feed-signed prices and stores
//! their median. Prices must be submitted in ascending order and the batch
//! must contain exactly `bar` entries signed by distinct feeds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use ora_decimal::{DecFixedPoint, DecFloatPoint};
use ora_types::eth::bytes32_to_string;
use ora_types::{Address, Signature, TxHash};

use crate::abi::{ParamType, Token};
use crate::rpc::RpcClient;
use crate::{call_decode, decode_packed_poke, first, price_to_wei, send_call, slot, token_u8, ContractError, Result};

/// Storage slot holding `[age][val]`.
pub const MEDIAN_VAL_SLOT: u8 = 1;

const POKE_SIGNATURE: &str = "poke(uint256[],uint256[],uint8[],bytes32[],bytes32[])";

/// One signed price submitted in a `poke` batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedianVal {
    pub val: DecFloatPoint,
    pub age: DateTime<Utc>,
    pub signature: Signature,
}

/// Operations on a Median contract.
#[async_trait]
pub trait MedianApi: Send + Sync {
    fn address(&self) -> Address;

    /// Current median price.
    async fn val(&self) -> Result<DecFixedPoint>;

    /// Time of the last update.
    async fn age(&self) -> Result<DateTime<Utc>>;

    /// Asset identifier.
    async fn wat(&self) -> Result<String>;

    /// Required number of signed prices.
    async fn bar(&self) -> Result<u8>;

    /// Submit a batch of signed prices.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::InvalidArgument`] if the batch is empty or
    /// not sorted by price, otherwise the classified RPC error.
    async fn poke(&self, vals: &[MedianVal]) -> Result<TxHash>;
}

/// Median contract bound to an RPC client.
#[derive(Clone)]
pub struct Median {
    client: Arc<dyn RpcClient>,
    address: Address,
}

impl Median {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self { client, address }
    }
}

/// ABI arguments of a `poke` call.
///
/// # Errors
///
/// Returns [`ContractError::InvalidArgument`] if `vals` is empty, not sorted
/// ascending by price, or holds a negative price.
pub fn poke_args(vals: &[MedianVal]) -> Result<Vec<Token>> {
    if vals.is_empty() {
        return Err(ContractError::InvalidArgument("no values to poke".to_string()));
    }
    if vals.windows(2).any(|w| w[0].val > w[1].val) {
        return Err(ContractError::InvalidArgument("values must be sorted ascending".to_string()));
    }
    let mut val_ = Vec::with_capacity(vals.len());
    let mut age_ = Vec::with_capacity(vals.len());
    let mut v = Vec::with_capacity(vals.len());
    let mut r = Vec::with_capacity(vals.len());
    let mut s = Vec::with_capacity(vals.len());
    for entry in vals {
        let age = u64::try_from(entry.age.timestamp())
            .map_err(|_| ContractError::InvalidArgument(format!("age {} before epoch", entry.age)))?;
        val_.push(Token::Uint(price_to_wei(&entry.val)?));
        age_.push(Token::uint(age));
        v.push(Token::uint(entry.signature.v));
        r.push(Token::FixedBytes32(entry.signature.r));
        s.push(Token::FixedBytes32(entry.signature.s));
    }
    Ok(vec![
        Token::Array(val_),
        Token::Array(age_),
        Token::Array(v),
        Token::Array(r),
        Token::Array(s),
    ])
}

#[async_trait]
impl MedianApi for Median {
    fn address(&self) -> Address {
        self.address
    }

    async fn val(&self) -> Result<DecFixedPoint> {
        let word = self.client.storage_at(self.address, slot(MEDIAN_VAL_SLOT)).await?;
        Ok(decode_packed_poke(&word).0)
    }

    async fn age(&self) -> Result<DateTime<Utc>> {
        let ret = call_decode(self.client.as_ref(), self.address, "age()", &[], &[ParamType::Uint]).await?;
        let secs = first(&ret, "age")?
            .as_uint()
            .and_then(ToPrimitive::to_u128)
            .ok_or_else(|| ContractError::Abi("age out of range".to_string()))?;
        Ok(crate::unix_time(secs))
    }

    async fn wat(&self) -> Result<String> {
        let ret = call_decode(self.client.as_ref(), self.address, "wat()", &[], &[ParamType::FixedBytes32]).await?;
        let wat = first(&ret, "wat")?
            .as_bytes32()
            .ok_or_else(|| ContractError::Abi("wat is not bytes32".to_string()))?;
        Ok(bytes32_to_string(&wat))
    }

    async fn bar(&self) -> Result<u8> {
        let ret = call_decode(self.client.as_ref(), self.address, "bar()", &[], &[ParamType::Uint]).await?;
        token_u8(first(&ret, "bar")?, "bar")
    }

    async fn poke(&self, vals: &[MedianVal]) -> Result<TxHash> {
        let args = poke_args(vals)?;
        send_call(self.client.as_ref(), self.address, POKE_SIGNATURE, &args).await
    }
}

/// Decode the arguments of a `poke` call back into prices, mainly for
/// inspection of submitted transactions.
///
/// # Errors
///
/// Returns [`ContractError::Abi`] if `data` is not a `poke` call.
pub fn decode_poke_prices(data: &[u8]) -> Result<Vec<BigUint>> {
    let Some(args) = data.strip_prefix(&crate::abi::selector(POKE_SIGNATURE)[..]) else {
        return Err(ContractError::Abi("not a poke call".to_string()));
    };
    let uint_array = || ParamType::Array(Box::new(ParamType::Uint));
    let bytes_array = || ParamType::Array(Box::new(ParamType::FixedBytes32));
    let tokens = crate::abi::decode(&[uint_array(), uint_array(), uint_array(), bytes_array(), bytes_array()], args)?;
    Ok(first(&tokens, "val_")?
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.as_uint().cloned())
        .collect())
}
