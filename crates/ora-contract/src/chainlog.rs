//! Chainlog: name to address directory.

use std::sync::Arc;

use ora_types::eth::string_to_bytes32;
use ora_types::Address;

use crate::abi::{ParamType, Token};
use crate::rpc::RpcClient;
use crate::{call_decode, ContractError, Result};

#[derive(Clone)]
pub struct Chainlog {
    client: Arc<dyn RpcClient>,
    address: Address,
}

impl Chainlog {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self { client, address }
    }

    /// Address registered under `key`, or `None` if the key is unknown.
    ///
    /// # Errors
    ///
    /// Returns the classified RPC error.
    pub async fn try_get(&self, key: &str) -> Result<Option<Address>> {
        let key = string_to_bytes32(key).map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
        let ret = call_decode(
            self.client.as_ref(),
            self.address,
            "tryGet(bytes32)",
            &[Token::FixedBytes32(key)],
            &[ParamType::Bool, ParamType::Address],
        )
        .await?;
        let found = ret.first().and_then(Token::as_bool).unwrap_or(false);
        Ok(if found { ret.get(1).and_then(Token::as_address) } else { None })
    }
}
