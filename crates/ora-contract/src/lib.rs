//! # ora-contract
//!
//! Typed wrappers over the oracle contracts' ABI.
//!
//! Wrappers are stateless over a shared [`RpcClient`]. Errors that carry
//! revert data are decoded into a [`Revert`] so callers can tell an
//! on-chain rejection from a network failure.
//!
//! ## Modules
//!
//! - [`abi`]: ABI encoding and decoding
//! - [`revert`]: revert reasons and the custom error registry
//! - [`rpc`]: RPC client interface
//! - [`jsonrpc`]: HTTP JSON-RPC client
//! - [`median`]: Median (ECDSA) oracle
//! - [`scribe`]: Scribe (Schnorr) oracle
//! - [`opscribe`]: optimistic Scribe oracle
//! - [`registry`]: WatRegistry
//! - [`chainlog`]: Chainlog
//! - [`pot`]: Pot (DSR)

pub mod abi;
pub mod chainlog;
pub mod jsonrpc;
pub mod median;
pub mod opscribe;
pub mod pot;
pub mod registry;
pub mod revert;
pub mod rpc;
pub mod scribe;

use chrono::{DateTime, TimeZone, Utc};
use num_bigint::{BigInt, BigUint, Sign};
use ora_decimal::{DecFixedPoint, DecFloatPoint};
use ora_types::{Address, PRICE_PRECISION};

use abi::{ParamType, Token};
pub use jsonrpc::JsonRpcClient;
pub use median::{Median, MedianApi, MedianVal};
pub use opscribe::{OpScribe, OpScribeApi};
pub use pot::Pot;
pub use revert::{CustomError, Revert};
pub use rpc::{RpcClient, RpcError, TransactionRequest};
pub use scribe::{Feeds, PokeData, SchnorrData, Scribe, ScribeApi};

/// Error types for contract calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    /// The RPC call failed without a revert.
    #[error(transparent)]
    Rpc(RpcError),

    /// The call reverted.
    #[error("execution reverted: {0}")]
    Revert(Revert),

    /// ABI encoding or decoding failed.
    #[error("abi error: {0}")]
    Abi(String),

    /// An argument is outside the range accepted by the contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ContractError {
    /// Whether the node rejected a replacement transaction as underpriced.
    pub fn is_replacement_underpriced(&self) -> bool {
        matches!(self, ContractError::Rpc(e) if e.is_replacement_underpriced())
    }

    pub fn revert(&self) -> Option<&Revert> {
        match self {
            ContractError::Revert(r) => Some(r),
            _ => None,
        }
    }
}

impl From<RpcError> for ContractError {
    fn from(e: RpcError) -> Self {
        match e.revert() {
            Some(revert) => ContractError::Revert(revert),
            None => ContractError::Rpc(e),
        }
    }
}

/// Convenience result type for contract calls.
pub type Result<T> = std::result::Result<T, ContractError>;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Call `signature` on `to` and decode the return data as `outputs`.
pub(crate) async fn call_decode(
    client: &dyn RpcClient,
    to: Address,
    signature: &str,
    args: &[Token],
    outputs: &[ParamType],
) -> Result<Vec<Token>> {
    let data = abi::encode_call(signature, args)?;
    let ret = client.call(to, data).await?;
    abi::decode(outputs, &ret)
}

/// Send a transaction calling `signature` on `to`.
pub(crate) async fn send_call(
    client: &dyn RpcClient,
    to: Address,
    signature: &str,
    args: &[Token],
) -> Result<ora_types::TxHash> {
    let data = abi::encode_call(signature, args)?;
    Ok(client.send_transaction(TransactionRequest::new(to, data)).await?)
}

pub(crate) fn first<'a>(tokens: &'a [Token], what: &str) -> Result<&'a Token> {
    tokens
        .first()
        .ok_or_else(|| ContractError::Abi(format!("missing {what} in return data")))
}

pub(crate) fn token_u8(token: &Token, what: &str) -> Result<u8> {
    token
        .as_u64()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| ContractError::Abi(format!("{what} does not fit into uint8")))
}

/// Price scaled by `10^18` as an unsigned integer.
///
/// # Errors
///
/// Returns [`ContractError::InvalidArgument`] for negative prices.
pub fn price_to_wei(price: &DecFloatPoint) -> Result<BigUint> {
    price
        .to_fixed(PRICE_PRECISION)
        .mantissa()
        .to_biguint()
        .ok_or_else(|| ContractError::InvalidArgument(format!("negative price {price}")))
}

/// Inverse of [`price_to_wei`].
pub fn wei_to_price(wei: &BigUint) -> DecFixedPoint {
    DecFixedPoint::new(BigInt::from_biguint(Sign::Plus, wei.clone()), PRICE_PRECISION)
}

/// Decode a `[16 bytes age][16 bytes val]` storage word.
pub(crate) fn decode_packed_poke(word: &[u8; 32]) -> (DecFixedPoint, DateTime<Utc>) {
    let val = wei_to_price(&BigUint::from_bytes_be(&word[16..]));
    let mut age_bytes = [0u8; 16];
    age_bytes.copy_from_slice(&word[..16]);
    (val, unix_time(u128::from_be_bytes(age_bytes)))
}

/// Unix seconds to a UTC time, saturating at the epoch for values chrono
/// cannot represent.
pub(crate) fn unix_time(secs: u128) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_default()
}

/// A storage slot index as a 32-byte key.
pub(crate) fn slot(index: u8) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[31] = index;
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory RPC client answering calls by selector.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    pub struct MockRpc {
        pub calls: Mutex<HashMap<[u8; 4], std::result::Result<Vec<u8>, RpcError>>>,
        pub storage: Mutex<HashMap<[u8; 32], [u8; 32]>>,
        pub sent: Mutex<Vec<TransactionRequest>>,
        pub send_error: Mutex<Option<RpcError>>,
    }

    impl MockRpc {
        pub fn on_call(&self, signature: &str, ret: &[Token]) {
            let data = abi::encode(ret).expect("encode");
            self.calls
                .lock()
                .expect("lock")
                .insert(abi::selector(signature), Ok(data));
        }

        pub fn on_storage(&self, index: u8, word: [u8; 32]) {
            self.storage.lock().expect("lock").insert(slot(index), word);
        }
    }

    #[async_trait]
    impl RpcClient for MockRpc {
        async fn call(&self, _to: Address, data: Vec<u8>) -> std::result::Result<Vec<u8>, RpcError> {
            let mut sel = [0u8; 4];
            sel.copy_from_slice(&data[..4]);
            self.calls
                .lock()
                .expect("lock")
                .get(&sel)
                .cloned()
                .unwrap_or_else(|| Err(RpcError::Transport("no mock for call".to_string())))
        }

        async fn storage_at(&self, _address: Address, slot: [u8; 32]) -> std::result::Result<[u8; 32], RpcError> {
            Ok(self
                .storage
                .lock()
                .expect("lock")
                .get(&slot)
                .copied()
                .unwrap_or([0u8; 32]))
        }

        async fn send_transaction(&self, tx: TransactionRequest) -> std::result::Result<ora_types::TxHash, RpcError> {
            if let Some(err) = self.send_error.lock().expect("lock").clone() {
                return Err(err);
            }
            self.sent.lock().expect("lock").push(tx);
            Ok([0xaa; 32])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_to_wei() {
        let wei = price_to_wei(&"1.5".parse().expect("decimal")).expect("positive");
        assert_eq!(wei, BigUint::from(1_500_000_000_000_000_000u64));
        assert!(price_to_wei(&"-1".parse().expect("decimal")).is_err());
        assert_eq!(wei_to_price(&wei).to_string(), "1.5");
    }

    #[test]
    fn test_decode_packed_poke() {
        let mut word = [0u8; 32];
        word[15] = 100;
        word[16..].copy_from_slice(&(2_000_000_000_000_000_000u128).to_be_bytes());
        let (val, age) = decode_packed_poke(&word);
        assert_eq!(val.to_string(), "2");
        assert_eq!(age.timestamp(), 100);
    }

    #[test]
    fn test_rpc_error_classification() {
        let err: ContractError = RpcError::Timeout.into();
        assert!(matches!(err, ContractError::Rpc(RpcError::Timeout)));

        let err: ContractError = RpcError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(abi::encode_call("SignersNotOrdered()", &[]).expect("encode")),
        }
        .into();
        assert_eq!(err.revert(), Some(&Revert::Custom(CustomError::SignersNotOrdered)));

        let err: ContractError = RpcError::Rpc {
            code: -32000,
            message: "replacement transaction underpriced".to_string(),
            data: None,
        }
        .into();
        assert!(err.is_replacement_underpriced());
    }
}
