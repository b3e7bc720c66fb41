//! Assembles graphs from configuration.
//!
//! Models are described as nested node tables:
//!
//! ```toml
//! [[models]]
//! name = "BTC/USD"
//! type = "median"
//! pair = "BTC/USD"
//! min = 2
//!
//! [[models.sources]]
//! type = "origin"
//! origin = "kraken"
//! pair = "BTC/USD"
//! ```
//!
//! Origin leaves are shared by `(origin, pair)` across all models so every
//! origin is queried once per pair. `reference` nodes link to other models
//! by name; reference cycles are rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use ora_contract::RpcClient;
use ora_decimal::DecFloatPoint;
use ora_types::{Address, Pair};
use serde::{Deserialize, Serialize};

use crate::alias::{AliasNode, InvertNode};
use crate::indirect::IndirectNode;
use crate::median::MedianNode;
use crate::node::{origin_nodes, Node};
use crate::origin::{DsrOrigin, Origin, StaticOrigin};
use crate::origin_node::OriginNode;
use crate::provider::GraphProvider;
use crate::reference::ReferenceNode;
use crate::updater::Updater;
use crate::{GraphError, Result};

fn default_freshness_secs() -> u64 {
    60
}

fn default_expiry_secs() -> u64 {
    120
}

/// A named model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(flatten)]
    pub node: NodeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Origin {
        origin: String,
        pair: Pair,
        #[serde(default = "default_freshness_secs")]
        freshness_secs: u64,
        #[serde(default = "default_expiry_secs")]
        expiry_secs: u64,
    },
    Median {
        pair: Pair,
        min: usize,
        sources: Vec<NodeConfig>,
    },
    Indirect {
        sources: Vec<NodeConfig>,
    },
    Alias {
        pair: Pair,
        source: Box<NodeConfig>,
    },
    Invert {
        source: Box<NodeConfig>,
    },
    Reference {
        model: String,
    },
}

/// A named price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: OriginKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginKind {
    /// Constant prices.
    Static { prices: BTreeMap<Pair, DecFloatPoint> },
    /// Pot contracts per pair.
    Dsr { contracts: BTreeMap<Pair, Vec<Address>> },
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

struct GraphBuilder<'a> {
    configs: HashMap<&'a str, &'a ModelConfig>,
    built: HashMap<String, Arc<Node>>,
    leaves: HashMap<(String, Pair), Arc<Node>>,
    visiting: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    fn model(&mut self, name: &str) -> Result<Arc<Node>> {
        if let Some(node) = self.built.get(name) {
            return Ok(Arc::clone(node));
        }
        if self.visiting.iter().any(|v| v == name) {
            return Err(GraphError::InvalidConfig(format!(
                "reference cycle: {} -> {name}",
                self.visiting.join(" -> ")
            )));
        }
        let config = *self
            .configs
            .get(name)
            .ok_or_else(|| GraphError::UnknownModel(name.to_string()))?;

        self.visiting.push(name.to_string());
        let node = self.node(&config.node);
        self.visiting.pop();

        let node = node?;
        self.built.insert(name.to_string(), Arc::clone(&node));
        Ok(node)
    }

    fn node(&mut self, config: &NodeConfig) -> Result<Arc<Node>> {
        let (mut node, children) = match config {
            NodeConfig::Origin {
                origin,
                pair,
                freshness_secs,
                expiry_secs,
            } => {
                if freshness_secs > expiry_secs {
                    return Err(GraphError::InvalidConfig(format!(
                        "origin {origin} {pair}: freshness exceeds expiry"
                    )));
                }
                let leaf = self
                    .leaves
                    .entry((origin.clone(), pair.clone()))
                    .or_insert_with(|| {
                        Arc::new(Node::Origin(OriginNode::with_thresholds(
                            origin.as_str(),
                            pair.clone(),
                            Duration::from_secs(*freshness_secs),
                            Duration::from_secs(*expiry_secs),
                        )))
                    });
                return Ok(Arc::clone(leaf));
            }
            NodeConfig::Median { pair, min, sources } => {
                if sources.len() < *min {
                    return Err(GraphError::InvalidConfig(format!(
                        "median {pair} needs {min} sources, has {}",
                        sources.len()
                    )));
                }
                (Node::Median(MedianNode::new(pair.clone(), *min)), self.nodes(sources)?)
            }
            NodeConfig::Indirect { sources } => {
                if sources.len() < 2 {
                    return Err(GraphError::InvalidConfig("indirect node needs at least two sources".to_string()));
                }
                (Node::Indirect(IndirectNode::new()), self.nodes(sources)?)
            }
            NodeConfig::Alias { pair, source } => (Node::Alias(AliasNode::new(pair.clone())), vec![self.node(source)?]),
            NodeConfig::Invert { source } => (Node::Invert(InvertNode::new()), vec![self.node(source)?]),
            NodeConfig::Reference { model } => (Node::Reference(ReferenceNode::new(model.as_str())), vec![self.model(model)?]),
        };
        node.add_nodes(children)?;
        Ok(Arc::new(node))
    }

    fn nodes(&mut self, configs: &[NodeConfig]) -> Result<Vec<Arc<Node>>> {
        configs.iter().map(|c| self.node(c)).collect()
    }
}

/// Build the root node of every model.
///
/// # Errors
///
/// - [`GraphError::InvalidConfig`] for duplicate names, reference cycles or
///   inconsistent node parameters
/// - [`GraphError::UnknownModel`] for references to undefined models
pub fn build_models(configs: &[ModelConfig]) -> Result<BTreeMap<String, Arc<Node>>> {
    let mut by_name = HashMap::with_capacity(configs.len());
    for config in configs {
        if by_name.insert(config.name.as_str(), config).is_some() {
            return Err(GraphError::InvalidConfig(format!("duplicate model {}", config.name)));
        }
    }
    let mut builder = GraphBuilder {
        configs: by_name,
        built: HashMap::new(),
        leaves: HashMap::new(),
        visiting: Vec::new(),
    };
    configs
        .iter()
        .map(|c| builder.model(&c.name).map(|node| (c.name.clone(), node)))
        .collect()
}

// ---------------------------------------------------------------------------
// Origins
// ---------------------------------------------------------------------------

/// Instantiate configured origins.
///
/// # Errors
///
/// Returns [`GraphError::InvalidConfig`] for duplicate names or for origins
/// that need an RPC client when none is given.
pub fn build_origins(
    configs: &[OriginConfig],
    client: Option<Arc<dyn RpcClient>>,
) -> Result<HashMap<String, Arc<dyn Origin>>> {
    let mut out: HashMap<String, Arc<dyn Origin>> = HashMap::with_capacity(configs.len());
    for config in configs {
        let origin: Arc<dyn Origin> = match &config.kind {
            OriginKind::Static { prices } => Arc::new(StaticOrigin::new(
                config.name.as_str(),
                prices.iter().map(|(p, v)| (p.clone(), v.clone())).collect(),
            )),
            OriginKind::Dsr { contracts } => {
                let client = client.clone().ok_or_else(|| {
                    GraphError::InvalidConfig(format!("origin {} needs an ethereum client", config.name))
                })?;
                Arc::new(DsrOrigin::new(
                    config.name.as_str(),
                    client,
                    contracts.iter().map(|(p, a)| (p.clone(), a.clone())).collect(),
                ))
            }
        };
        if out.insert(config.name.clone(), origin).is_some() {
            return Err(GraphError::InvalidConfig(format!("duplicate origin {}", config.name)));
        }
    }
    Ok(out)
}

/// Build models and origins into a provider that refreshes origins on
/// demand.
///
/// # Errors
///
/// Returns the errors of [`build_models`] and [`build_origins`], and
/// [`GraphError::UnknownOrigin`] if a model uses an origin that is not
/// configured.
pub fn build_provider(
    models: &[ModelConfig],
    origins: &[OriginConfig],
    client: Option<Arc<dyn RpcClient>>,
) -> Result<GraphProvider> {
    let roots = build_models(models)?;
    let origins = build_origins(origins, client)?;
    let all: Vec<Arc<Node>> = roots.values().cloned().collect();
    for leaf in origin_nodes(&all) {
        if let Some(origin) = leaf.as_origin() {
            if !origins.contains_key(origin.origin()) {
                return Err(GraphError::UnknownOrigin(origin.origin().to_string()));
            }
        }
    }
    Ok(GraphProvider::new(roots, Some(Updater::new(origins))))
}
