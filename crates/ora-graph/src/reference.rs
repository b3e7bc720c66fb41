//! Links to other models by name.

use std::sync::Arc;

use ora_types::Point;

use crate::node::{child_tick, single_child_point, Node};

/// Passes through the root of another model.
///
/// The referenced root is shared, not copied, so a model referenced from
/// several places is evaluated against the same origin leaves.
#[derive(Debug)]
pub struct ReferenceNode {
    pub(crate) model: String,
    pub(crate) child: Option<Arc<Node>>,
}

impl ReferenceNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            child: None,
        }
    }

    pub fn data_point(&self) -> Point {
        let child = match single_child_point(&self.child) {
            Ok(point) => point,
            Err(point) => return point,
        };
        let point = match child_tick(0, &child) {
            Ok(_) => Point {
                value: child.value.clone(),
                time: child.time,
                ..Point::default()
            },
            Err(err) => Point::errored(err),
        };
        point.with_meta("model", self.model.as_str()).with_sub_points(vec![child])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::median::MedianNode;
    use crate::node::testing::{origin, pair};

    #[test]
    fn test_reference_passes_value_through() {
        let mut median = Node::Median(MedianNode::new(pair("BTC/USD"), 1));
        median.add_nodes(vec![origin("a", "BTC/USD", "5")]).expect("add");

        let mut node = Node::Reference(ReferenceNode::new("BTC/USD"));
        node.add_nodes(vec![Arc::new(median)]).expect("add");
        let point = node.data_point();
        assert!(point.is_valid());
        assert_eq!(point.meta_str("type"), Some("reference"));
        assert_eq!(point.meta_str("model"), Some("BTC/USD"));
        assert_eq!(point.tick().map(|t| t.price.to_string()), Some("5".to_string()));
    }
}
