//! Command implementations.

pub mod agent;
pub mod models;
pub mod price;

use std::sync::Arc;

use anyhow::Context;
use ora_contract::{JsonRpcClient, RpcClient};
use ora_graph::builder::build_provider;
use ora_graph::GraphProvider;

use crate::config::Config;

/// JSON-RPC client for `ethereum.rpc_url`, or `None` if it is not set.
pub fn rpc_client(config: &Config) -> anyhow::Result<Option<Arc<dyn RpcClient>>> {
    let eth = &config.ethereum;
    if eth.rpc_url.is_empty() {
        return Ok(None);
    }
    let mut client = JsonRpcClient::new(eth.rpc_url.clone(), eth.timeout())
        .with_context(|| format!("invalid ethereum rpc url {}", eth.rpc_url))?;
    let from = match (eth.from, eth.key()?) {
        (Some(from), _) => Some(from),
        (None, Some(key)) => Some(key.address()),
        (None, None) => None,
    };
    if let Some(from) = from {
        client = client.with_from(from);
    }
    Ok(Some(Arc::new(client)))
}

/// Price model provider for the configured models and origins.
pub fn provider(config: &Config, client: Option<Arc<dyn RpcClient>>) -> anyhow::Result<GraphProvider> {
    build_provider(&config.models, &config.origins, client).context("failed to build price models")
}

/// `requested`, or every model of the provider if empty.
pub fn model_names(provider: &dyn ora_graph::Provider, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        provider.model_names()
    } else {
        requested.to_vec()
    }
}
