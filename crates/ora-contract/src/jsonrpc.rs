//! HTTP JSON-RPC client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ora_types::{Address, TxHash};
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use crate::rpc::{RpcClient, RpcError, TransactionRequest};

/// JSON-RPC 2.0 client over HTTP.
///
/// Every request carries the configured timeout. Transactions are sent with
/// `eth_sendTransaction`, so the node (or a signing proxy in front of it)
/// must hold the key of the `from` account.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    from: Option<Address>,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

impl JsonRpcClient {
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            from: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Account used as `from` for transactions without one.
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let value: serde_json::Value = response.json().await.map_err(map_reqwest_error)?;
        parse_response(value)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else {
        RpcError::Transport(e.to_string())
    }
}

fn parse_response(value: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let response: Response =
        serde_json::from_value(value).map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
    if let Some(err) = response.error {
        let data = err
            .data
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(|s| decode_hex(s).ok());
        return Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
            data,
        });
    }
    response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))
}

/// `0x`-prefixed lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with or without the `0x` prefix; odd lengths are left-padded.
///
/// # Errors
///
/// Returns [`RpcError::InvalidResponse`] on non-hex characters.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, RpcError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{digits}");
        padded.as_str()
    } else {
        digits
    };
    hex::decode(digits).map_err(|e| RpcError::InvalidResponse(format!("{s}: {e}")))
}

fn result_bytes(value: &serde_json::Value) -> Result<Vec<u8>, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::InvalidResponse(format!("expected hex string, got {value}")))?;
    decode_hex(s)
}

fn left_pad_32(bytes: &[u8]) -> Result<[u8; 32], RpcError> {
    if bytes.len() > 32 {
        return Err(RpcError::InvalidResponse(format!("expected at most 32 bytes, got {}", bytes.len())));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

#[async_trait]
impl RpcClient for JsonRpcClient {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let params = json!([{ "to": to.to_string(), "data": encode_hex(&data) }, "latest"]);
        let result = self.request("eth_call", params).await?;
        result_bytes(&result)
    }

    async fn storage_at(&self, address: Address, slot: [u8; 32]) -> Result<[u8; 32], RpcError> {
        let params = json!([address.to_string(), encode_hex(&slot), "latest"]);
        let result = self.request("eth_getStorageAt", params).await?;
        left_pad_32(&result_bytes(&result)?)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, RpcError> {
        let mut object = json!({
            "to": tx.to.to_string(),
            "data": encode_hex(&tx.data),
        });
        if let Some(from) = tx.from.or(self.from) {
            object["from"] = json!(from.to_string());
        }
        if let Some(gas) = tx.gas {
            object["gas"] = json!(format!("{gas:#x}"));
        }
        let result = self.request("eth_sendTransaction", json!([object])).await?;
        left_pad_32(&result_bytes(&result)?)
    }
}
