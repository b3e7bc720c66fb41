//! Refreshes origin leaves.
//!
//! Stale origin nodes are grouped by origin so each origin receives one
//! batch query per update. Origins are queried concurrently, each bounded by
//! a timeout. A failed or timed-out query sets an errored point on every
//! node of that origin; the node keeps its last price until it expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ora_types::{Pair, Point, PointError};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::node::{origin_nodes, Node};
use crate::origin::Origin;

/// Default bound on a single origin query.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Updater {
    origins: HashMap<String, Arc<dyn Origin>>,
    timeout: Duration,
}

impl Updater {
    pub fn new(origins: HashMap<String, Arc<dyn Origin>>) -> Self {
        Self {
            origins,
            timeout: DEFAULT_ORIGIN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn origin_names(&self) -> impl Iterator<Item = &str> {
        self.origins.keys().map(String::as_str)
    }

    /// Refresh every non-fresh origin node reachable from `roots`.
    pub async fn update(&self, roots: &[Arc<Node>]) {
        let now = Utc::now();
        let mut groups: HashMap<String, Vec<Arc<Node>>> = HashMap::new();
        for node in origin_nodes(roots) {
            let Some(origin) = node.as_origin() else { continue };
            if origin.is_fresh(now) {
                continue;
            }
            groups.entry(origin.origin().to_string()).or_default().push(Arc::clone(&node));
        }
        if groups.is_empty() {
            return;
        }

        let mut tasks = JoinSet::new();
        for (name, nodes) in groups {
            let Some(origin) = self.origins.get(&name).cloned() else {
                warn!(origin = %name, advice = "check the origin name in the model configuration", "unknown origin");
                set_error(&nodes, &name, "unknown origin");
                continue;
            };
            let timeout = self.timeout;
            tasks.spawn(async move {
                let mut pairs: Vec<Pair> = nodes
                    .iter()
                    .filter_map(|n| n.as_origin().map(|o| o.pair().clone()))
                    .collect();
                pairs.sort();
                pairs.dedup();

                debug!(origin = %name, pairs = pairs.len(), "querying origin");
                match tokio::time::timeout(timeout, origin.fetch_data_points(&pairs)).await {
                    Ok(Ok(points)) => apply(&nodes, &name, points),
                    Ok(Err(e)) => {
                        warn!(origin = %name, error = %e, "origin query failed");
                        set_error(&nodes, &name, &e.to_string());
                    }
                    Err(_) => {
                        warn!(origin = %name, timeout_secs = timeout.as_secs(), "origin query timed out");
                        set_error(&nodes, &name, "timeout");
                    }
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "origin task failed");
            }
        }
    }

    /// Update `roots` every `interval` until shutdown.
    pub async fn run(&self, roots: Vec<Arc<Node>>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        info!(interval_secs = interval.as_secs(), "origin updater started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.update(&roots).await,
                _ = shutdown.recv() => break,
            }
        }
        info!("origin updater stopped");
    }
}

fn apply(nodes: &[Arc<Node>], origin: &str, points: HashMap<Pair, Point>) {
    for node in nodes {
        let Some(leaf) = node.as_origin() else { continue };
        let point = points.get(leaf.pair()).cloned().unwrap_or_else(|| {
            Point::errored(PointError::Origin {
                origin: origin.to_string(),
                message: format!("no point returned for {}", leaf.pair()),
            })
        });
        if let Err(e) = leaf.set_point(point) {
            debug!(origin, pair = %leaf.pair(), error = %e, "point rejected");
        }
    }
}

fn set_error(nodes: &[Arc<Node>], origin: &str, message: &str) {
    for node in nodes {
        if let Some(leaf) = node.as_origin() {
            let _ = leaf.set_point(Point::errored(PointError::Origin {
                origin: origin.to_string(),
                message: message.to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::median::MedianNode;
    use crate::node::testing::pair;
    use crate::origin::testing::CountingOrigin;
    use crate::origin_node::OriginNode;

    fn leaf(origin: &str, p: &str) -> Arc<Node> {
        Arc::new(Node::Origin(OriginNode::new(origin, pair(p))))
    }

    fn updater(origins: Vec<(&str, Arc<CountingOrigin>)>) -> Updater {
        let map = origins
            .into_iter()
            .map(|(name, o)| (name.to_string(), o as Arc<dyn Origin>))
            .collect();
        Updater::new(map).with_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_update_sets_points_once_per_origin() {
        let a = Arc::new(CountingOrigin::with_price("BTC/USD", "100"));
        let b = Arc::new(CountingOrigin::with_price("BTC/USD", "102"));
        let mut median = Node::Median(MedianNode::new(pair("BTC/USD"), 2));
        median
            .add_nodes(vec![leaf("a", "BTC/USD"), leaf("b", "BTC/USD")])
            .expect("add");
        let root = Arc::new(median);

        let updater = updater(vec![("a", a.clone()), ("b", b.clone())]);
        updater.update(&[root.clone()]).await;
        let point = root.data_point();
        assert!(point.is_valid(), "{:?}", point.error);
        assert_eq!(point.tick().map(|t| t.price.to_string()), Some("101".to_string()));

        // Fresh leaves are not queried again.
        updater.update(&[root]).await;
        assert_eq!(a.queries(), 1);
        assert_eq!(b.queries(), 1);
    }

    #[tokio::test]
    async fn test_failures_become_errored_points() {
        let failing = Arc::new(CountingOrigin {
            fail: true,
            ..CountingOrigin::default()
        });
        let slow = Arc::new(CountingOrigin {
            delay: Some(Duration::from_secs(5)),
            ..CountingOrigin::with_price("BTC/USD", "1")
        });
        let roots = vec![leaf("failing", "BTC/USD"), leaf("slow", "BTC/USD"), leaf("missing", "BTC/USD")];

        updater(vec![("failing", failing), ("slow", slow)]).update(&roots).await;
        for root in &roots {
            assert!(matches!(root.data_point().error, Some(PointError::Origin { .. })));
        }
    }

    #[tokio::test]
    async fn test_shared_pair_in_group() {
        let a = Arc::new(CountingOrigin::with_price("BTC/USD", "100"));
        let roots = vec![leaf("a", "BTC/USD"), leaf("a", "BTC/USD")];
        updater(vec![("a", a.clone())]).update(&roots).await;
        assert_eq!(a.queries.load(Ordering::SeqCst), 1);
        assert!(roots.iter().all(|r| r.data_point().is_valid()));
    }
}
