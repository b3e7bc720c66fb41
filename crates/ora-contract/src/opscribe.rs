//! Optimistic Scribe oracle.
//!
//! OpScribe accepts a price optimistically: the Schnorr data is not verified
//! on submission but attested by one feed's ECDSA signature, and can be
//! challenged during the challenge period.

use std::sync::Arc;

use async_trait::async_trait;
use ora_types::{Address, Signature, TxHash};

use crate::abi::Token;
use crate::rpc::RpcClient;
use crate::scribe::{Feeds, PokeData, SchnorrData, Scribe, ScribeApi};
use crate::{send_call, Result};

const OP_POKE_SIGNATURE: &str = "opPoke((uint128,uint32),(bytes32,address,bytes),(uint8,bytes32,bytes32))";

/// ABI tuple `(uint8 v, bytes32 r, bytes32 s)`.
pub fn ecdsa_token(signature: &Signature) -> Token {
    Token::Tuple(vec![
        Token::uint(signature.v),
        Token::FixedBytes32(signature.r),
        Token::FixedBytes32(signature.s),
    ])
}

/// Operations on an OpScribe contract.
#[async_trait]
pub trait OpScribeApi: ScribeApi {
    async fn op_poke(&self, poke: &PokeData, schnorr: &SchnorrData, ecdsa: &Signature) -> Result<TxHash>;
}

/// OpScribe contract bound to an RPC client.
#[derive(Clone)]
pub struct OpScribe {
    scribe: Scribe,
}

impl OpScribe {
    pub fn new(client: Arc<dyn RpcClient>, address: Address) -> Self {
        Self {
            scribe: Scribe::new(client, address),
        }
    }
}

#[async_trait]
impl ScribeApi for OpScribe {
    fn address(&self) -> Address {
        self.scribe.address
    }

    async fn wat(&self) -> Result<String> {
        self.scribe.wat().await
    }

    async fn bar(&self) -> Result<u8> {
        self.scribe.bar().await
    }

    async fn feeds(&self) -> Result<Feeds> {
        self.scribe.feeds().await
    }

    async fn read_poke_data(&self) -> Result<PokeData> {
        self.scribe.read_poke_data().await
    }

    async fn poke(&self, poke: &PokeData, schnorr: &SchnorrData) -> Result<TxHash> {
        self.scribe.poke(poke, schnorr).await
    }
}

#[async_trait]
impl OpScribeApi for OpScribe {
    async fn op_poke(&self, poke: &PokeData, schnorr: &SchnorrData, ecdsa: &Signature) -> Result<TxHash> {
        let args = [poke.to_token()?, schnorr.to_token(), ecdsa_token(ecdsa)];
        send_call(self.scribe.client.as_ref(), self.scribe.address, OP_POKE_SIGNATURE, &args).await
    }
}
