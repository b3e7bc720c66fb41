//! WatRegistry: per-asset quorum and feed lists.

use std::sync::Arc;

use ora_types::eth::string_to_bytes32;
use ora_types::Address;

use crate::abi::{ParamType, Token};
use crate::rpc::RpcClient;
use crate::{call_decode, first, token_u8, ContractError, Result};

#[derive(Clone)]
pub struct WatRegistry {
    client: Arc<dyn RpcClient>,
    address: Address,
}

impl WatRegistry {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self { client, address }
    }

    fn wat_token(wat: &str) -> Result<Token> {
        string_to_bytes32(wat)
            .map(Token::FixedBytes32)
            .map_err(|e| ContractError::InvalidArgument(e.to_string()))
    }

    /// Quorum configured for `wat`.
    ///
    /// # Errors
    ///
    /// Returns the classified RPC error, or [`ContractError::Abi`] if the
    /// answer does not fit into `uint8`.
    pub async fn bar(&self, wat: &str) -> Result<u8> {
        let args = [Self::wat_token(wat)?];
        let ret = call_decode(self.client.as_ref(), self.address, "bar(bytes32)", &args, &[ParamType::Uint]).await?;
        token_u8(first(&ret, "bar")?, "bar")
    }

    /// Feeds allowed to sign prices for `wat`.
    ///
    /// # Errors
    ///
    /// Returns the classified RPC error.
    pub async fn feeds(&self, wat: &str) -> Result<Vec<Address>> {
        let args = [Self::wat_token(wat)?];
        let outputs = [ParamType::Array(Box::new(ParamType::Address))];
        let ret = call_decode(self.client.as_ref(), self.address, "feeds(bytes32)", &args, &outputs).await?;
        Ok(first(&ret, "feeds")?
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(Token::as_address)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRpc;

    #[tokio::test]
    async fn test_bar_and_feeds() {
        let rpc = Arc::new(MockRpc::default());
        rpc.on_call("bar(bytes32)", &[Token::uint(13u8)]);
        rpc.on_call(
            "feeds(bytes32)",
            &[Token::Array(vec![Token::Address(Address([1u8; 20])), Token::Address(Address([2u8; 20]))])],
        );
        let registry = WatRegistry::new(rpc, Address::ZERO);
        assert_eq!(registry.bar("BTC/USD").await.expect("bar"), 13);
        assert_eq!(registry.feeds("BTC/USD").await.expect("feeds").len(), 2);
    }

    #[tokio::test]
    async fn test_wat_too_long() {
        let registry = WatRegistry::new(Arc::new(MockRpc::default()), Address::ZERO);
        let err = registry.bar(&"X".repeat(40)).await;
        assert!(matches!(err, Err(ContractError::InvalidArgument(_))));
    }
}
