//! Ethereum RPC client interface.

use async_trait::async_trait;
use ora_types::{Address, TxHash};

use crate::revert::Revert;

/// Errors returned by an RPC client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The request could not be delivered or the response not read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node did not answer within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Vec<u8>>,
    },

    /// The node answered with something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Decoded revert reason, if the error is an execution revert.
    pub fn revert(&self) -> Option<Revert> {
        match self {
            RpcError::Rpc { data: Some(data), .. } => Some(Revert::decode(data)),
            RpcError::Rpc { message, data: None, .. } if message.contains("execution reverted") => {
                Some(Revert::Unknown(Vec::new()))
            }
            _ => None,
        }
    }

    /// Whether the node refused a transaction because one with the same
    /// nonce and a higher fee is pending.
    pub fn is_replacement_underpriced(&self) -> bool {
        match self {
            RpcError::Rpc { message, .. } | RpcError::Transport(message) => {
                message.contains("replacement transaction underpriced")
            }
            _ => false,
        }
    }
}

/// A transaction to be signed and sent by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Vec<u8>,
    pub gas: Option<u64>,
}

impl TransactionRequest {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to,
            data,
            gas: None,
        }
    }
}

/// Minimal set of Ethereum RPC methods used by contract wrappers.
///
/// Implementations must be safe to share between tasks and must not block
/// indefinitely.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, RpcError>;

    /// `eth_getStorageAt` against the latest block.
    async fn storage_at(&self, address: Address, slot: [u8; 32]) -> Result<[u8; 32], RpcError>;

    /// `eth_sendTransaction`.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_detection() {
        let err = RpcError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(vec![0xde, 0xad, 0xbe, 0xef]),
        };
        assert_eq!(err.revert(), Some(Revert::Unknown(vec![0xde, 0xad, 0xbe, 0xef])));

        let err = RpcError::Rpc {
            code: -32000,
            message: "execution reverted".to_string(),
            data: None,
        };
        assert!(err.revert().is_some());

        assert!(RpcError::Timeout.revert().is_none());
    }

    #[test]
    fn test_replacement_underpriced() {
        let err = RpcError::Rpc {
            code: -32000,
            message: "replacement transaction underpriced".to_string(),
            data: None,
        };
        assert!(err.is_replacement_underpriced());
        assert!(err.revert().is_none());
        assert!(!RpcError::Timeout.is_replacement_underpriced());
    }
}
