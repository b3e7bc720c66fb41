//! Model descriptions.

use serde::{Deserialize, Serialize};

use crate::point::Meta;

/// Shape of a data model graph, mirroring the node tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_models: Vec<Model>,
}

impl Model {
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Node kind recorded under the `type` meta key.
    pub fn kind(&self) -> Option<&str> {
        self.meta.get("type").and_then(serde_json::Value::as_str)
    }

    /// Number of nodes in the tree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.sub_models.iter().map(Model::node_count).sum::<usize>()
    }
}
