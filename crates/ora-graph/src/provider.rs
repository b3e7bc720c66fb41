//! Named models backed by the graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ora_types::{Model, Point};

use crate::node::Node;
use crate::updater::Updater;
use crate::{GraphError, Result};

/// Source of data points for named models.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Names of all known models, sorted.
    fn model_names(&self) -> Vec<String>;

    /// Evaluate one model.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownModel`] if no model is named `model`.
    async fn data_point(&self, model: &str) -> Result<Point>;

    /// Evaluate several models.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownModel`] for the first unknown name.
    async fn data_points(&self, models: &[String]) -> Result<BTreeMap<String, Point>>;

    /// Shape of one model.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownModel`] if no model is named `name`.
    fn model(&self, name: &str) -> Result<Model>;
}

/// [`Provider`] over model roots built by [`crate::builder`].
///
/// If an [`Updater`] is attached, origin leaves of the requested models
/// are refreshed before evaluation.
#[derive(Clone)]
pub struct GraphProvider {
    models: BTreeMap<String, Arc<Node>>,
    updater: Option<Updater>,
}

impl GraphProvider {
    pub fn new(models: BTreeMap<String, Arc<Node>>, updater: Option<Updater>) -> Self {
        Self { models, updater }
    }

    pub fn updater(&self) -> Option<&Updater> {
        self.updater.as_ref()
    }

    /// Roots of all models.
    pub fn roots(&self) -> Vec<Arc<Node>> {
        self.models.values().cloned().collect()
    }

    fn root(&self, name: &str) -> Result<&Arc<Node>> {
        self.models
            .get(name)
            .ok_or_else(|| GraphError::UnknownModel(name.to_string()))
    }
}

#[async_trait]
impl Provider for GraphProvider {
    fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    async fn data_point(&self, model: &str) -> Result<Point> {
        let root = Arc::clone(self.root(model)?);
        if let Some(updater) = &self.updater {
            updater.update(std::slice::from_ref(&root)).await;
        }
        Ok(root.data_point())
    }

    async fn data_points(&self, models: &[String]) -> Result<BTreeMap<String, Point>> {
        let roots = models
            .iter()
            .map(|m| self.root(m).map(|r| (m.clone(), Arc::clone(r))))
            .collect::<Result<Vec<_>>>()?;
        if let Some(updater) = &self.updater {
            let nodes: Vec<Arc<Node>> = roots.iter().map(|(_, r)| Arc::clone(r)).collect();
            updater.update(&nodes).await;
        }
        Ok(roots
            .into_iter()
            .map(|(name, root)| (name, root.data_point()))
            .collect())
    }

    fn model(&self, name: &str) -> Result<Model> {
        Ok(self.root(name)?.model())
    }
}
