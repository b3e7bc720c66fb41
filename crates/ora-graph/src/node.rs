//! Graph nodes.

use std::sync::Arc;

use ora_types::{Model, Point, PointError, Tick};

use crate::alias::{AliasNode, InvertNode};
use crate::indirect::IndirectNode;
use crate::median::MedianNode;
use crate::origin_node::OriginNode;
use crate::reference::ReferenceNode;
use crate::{GraphError, Result};

/// A node of the aggregation graph.
///
/// Parents own their children through [`Arc`], so a node may be shared by
/// several parents (and several models) but the graph is never cyclic.
#[derive(Debug)]
pub enum Node {
    Origin(OriginNode),
    Alias(AliasNode),
    Invert(InvertNode),
    Indirect(IndirectNode),
    Median(MedianNode),
    Reference(ReferenceNode),
}

impl Node {
    /// Node kind as written into point and model metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Origin(_) => "origin",
            Node::Alias(_) => "alias",
            Node::Invert(_) => "invert",
            Node::Indirect(_) => "indirect",
            Node::Median(_) => "median",
            Node::Reference(_) => "reference",
        }
    }

    /// Attach child nodes.
    ///
    /// # Errors
    ///
    /// - [`GraphError::LeafNode`] for origin nodes
    /// - [`GraphError::TooManyChildren`] if a single-child node would end up
    ///   with more than one child
    pub fn add_nodes(&mut self, nodes: Vec<Arc<Node>>) -> Result<()> {
        match self {
            Node::Origin(_) => Err(GraphError::LeafNode),
            Node::Alias(n) => add_single(&mut n.child, nodes, "alias"),
            Node::Invert(n) => add_single(&mut n.child, nodes, "invert"),
            Node::Reference(n) => add_single(&mut n.child, nodes, "reference"),
            Node::Indirect(n) => {
                n.children.extend(nodes);
                Ok(())
            }
            Node::Median(n) => {
                n.children.extend(nodes);
                Ok(())
            }
        }
    }

    /// Direct children.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        match self {
            Node::Origin(_) => Vec::new(),
            Node::Alias(n) => n.child.iter().cloned().collect(),
            Node::Invert(n) => n.child.iter().cloned().collect(),
            Node::Reference(n) => n.child.iter().cloned().collect(),
            Node::Indirect(n) => n.children.clone(),
            Node::Median(n) => n.children.clone(),
        }
    }

    /// Evaluate the node.
    pub fn data_point(&self) -> Point {
        let mut point = match self {
            Node::Origin(n) => n.data_point(),
            Node::Alias(n) => n.data_point(),
            Node::Invert(n) => n.data_point(),
            Node::Indirect(n) => n.data_point(),
            Node::Median(n) => n.data_point(),
            Node::Reference(n) => n.data_point(),
        };
        point.meta.insert("type".to_string(), self.kind().into());
        point
    }

    /// Shape of the subtree rooted at this node.
    pub fn model(&self) -> Model {
        let mut model = Model {
            meta: Default::default(),
            sub_models: self.nodes().iter().map(|n| n.model()).collect(),
        }
        .with_meta("type", self.kind());
        match self {
            Node::Origin(n) => {
                model = model.with_meta("origin", n.origin()).with_meta("pair", n.pair().to_string());
            }
            Node::Alias(n) => model = model.with_meta("pair", n.pair.to_string()),
            Node::Median(n) => {
                model = model.with_meta("pair", n.pair.to_string()).with_meta("min", n.min);
            }
            Node::Reference(n) => model = model.with_meta("model", n.model.as_str()),
            Node::Invert(_) | Node::Indirect(_) => {}
        }
        model
    }

    pub fn as_origin(&self) -> Option<&OriginNode> {
        match self {
            Node::Origin(n) => Some(n),
            _ => None,
        }
    }
}

fn add_single(slot: &mut Option<Arc<Node>>, mut nodes: Vec<Arc<Node>>, kind: &'static str) -> Result<()> {
    let total = nodes.len() + usize::from(slot.is_some());
    if total > 1 {
        return Err(GraphError::TooManyChildren { kind, max: 1 });
    }
    if let Some(node) = nodes.pop() {
        *slot = Some(node);
    }
    Ok(())
}

/// All distinct origin nodes reachable from `roots`, depth-first.
pub fn origin_nodes(roots: &[Arc<Node>]) -> Vec<Arc<Node>> {
    fn walk(node: &Arc<Node>, out: &mut Vec<Arc<Node>>) {
        if node.as_origin().is_some() {
            if !out.iter().any(|n| Arc::ptr_eq(n, node)) {
                out.push(Arc::clone(node));
            }
            return;
        }
        for child in node.nodes() {
            walk(&child, out);
        }
    }

    let mut out = Vec::new();
    for root in roots {
        walk(root, &mut out);
    }
    out
}

/// The valid tick of a child point, or the error to report for the parent.
pub(crate) fn child_tick(index: usize, point: &Point) -> std::result::Result<Tick, PointError> {
    point.validate().map_err(|e| PointError::Child {
        index,
        source: Box::new(e),
    })?;
    point.tick().cloned().ok_or_else(|| {
        PointError::UnexpectedValue(point.value.as_ref().map_or("none", |v| v.kind()).to_string())
    })
}

/// Evaluate the only child of a single-child node.
pub(crate) fn single_child_point(child: &Option<Arc<Node>>) -> std::result::Result<Point, Point> {
    match child {
        Some(node) => Ok(node.data_point()),
        None => Err(Point::errored(PointError::Other("node has no child".to_string()))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, Utc};
    use ora_types::Pair;

    use super::*;

    pub fn pair(s: &str) -> Pair {
        s.parse().expect("valid pair")
    }

    pub fn tick_point(p: &str, price: &str, time: DateTime<Utc>) -> Point {
        Point::new(Tick::new(pair(p), price.parse().expect("decimal")), time)
    }

    /// An origin node already holding a point.
    pub fn origin(name: &str, p: &str, price: &str) -> Arc<Node> {
        origin_at(name, p, price, Utc::now())
    }

    pub fn origin_at(name: &str, p: &str, price: &str, time: DateTime<Utc>) -> Arc<Node> {
        let node = OriginNode::new(name, pair(p));
        node.set_point(tick_point(p, price, time)).expect("set point");
        Arc::new(Node::Origin(node))
    }

    pub fn failing_origin(name: &str, p: &str) -> Arc<Node> {
        let node = OriginNode::new(name, pair(p));
        node.set_point(Point::errored(PointError::Origin {
            origin: name.to_string(),
            message: "connection refused".to_string(),
        }))
        .expect("set point");
        Arc::new(Node::Origin(node))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_origin_is_leaf() {
        let mut node = Node::Origin(OriginNode::new("a", pair("BTC/USD")));
        assert_eq!(node.add_nodes(vec![origin("b", "BTC/USD", "1")]), Err(GraphError::LeafNode));
    }

    #[test]
    fn test_single_child_nodes_reject_second_child() {
        let mut node = Node::Alias(AliasNode::new(pair("XBT/USD")));
        node.add_nodes(vec![origin("a", "BTC/USD", "1")]).expect("first child");
        let err = node.add_nodes(vec![origin("b", "BTC/USD", "1")]);
        assert_eq!(err, Err(GraphError::TooManyChildren { kind: "alias", max: 1 }));

        let mut node = Node::Invert(InvertNode::new());
        let err = node.add_nodes(vec![origin("a", "BTC/USD", "1"), origin("b", "BTC/USD", "1")]);
        assert!(err.is_err());
    }

    #[test]
    fn test_origin_nodes_deduplicates_shared_leaves() {
        let shared = origin("a", "BTC/USD", "1");
        let mut m1 = Node::Median(MedianNode::new(pair("BTC/USD"), 1));
        m1.add_nodes(vec![shared.clone(), origin("b", "BTC/USD", "1")]).expect("add");
        let mut m2 = Node::Median(MedianNode::new(pair("BTC/USD"), 1));
        m2.add_nodes(vec![shared]).expect("add");

        let leaves = origin_nodes(&[Arc::new(m1), Arc::new(m2)]);
        assert_eq!(leaves.len(), 2);
    }

    #[test]
    fn test_model_shape() {
        let mut median = Node::Median(MedianNode::new(pair("BTC/USD"), 2));
        median
            .add_nodes(vec![origin("a", "BTC/USD", "1"), origin("b", "BTC/USD", "1")])
            .expect("add");
        let model = median.model();
        assert_eq!(model.kind(), Some("median"));
        assert_eq!(model.sub_models.len(), 2);
        assert_eq!(model.sub_models[0].kind(), Some("origin"));
        assert_eq!(model.meta["min"], 2);
    }

    #[test]
    fn test_data_point_meta_type() {
        let node = origin("a", "BTC/USD", "1");
        let point = node.data_point();
        assert_eq!(point.meta_str("type"), Some("origin"));
        assert!(point.is_valid());
    }
}
