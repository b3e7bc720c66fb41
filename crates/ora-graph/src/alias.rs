//! Single-child nodes that rename or invert a pair.

use std::sync::Arc;

use ora_types::{Pair, Point, PointError};

use crate::node::{child_tick, single_child_point, Node};

/// Reports the child's tick under another pair name, price unchanged.
#[derive(Debug)]
pub struct AliasNode {
    pub(crate) pair: Pair,
    pub(crate) child: Option<Arc<Node>>,
}

impl AliasNode {
    pub fn new(pair: Pair) -> Self {
        Self { pair, child: None }
    }

    pub fn data_point(&self) -> Point {
        let child = match single_child_point(&self.child) {
            Ok(point) => point,
            Err(point) => return point,
        };
        let mut tick = match child_tick(0, &child) {
            Ok(tick) => tick,
            Err(err) => return Point::errored(err).with_sub_points(vec![child]),
        };
        tick.pair = self.pair.clone();
        Point::new(tick, child.time).with_sub_points(vec![child])
    }
}

/// Swaps base and quote: `price -> 1/price`, `volume -> volume * price`.
#[derive(Debug, Default)]
pub struct InvertNode {
    pub(crate) child: Option<Arc<Node>>,
}

impl InvertNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_point(&self) -> Point {
        let child = match single_child_point(&self.child) {
            Ok(point) => point,
            Err(point) => return point,
        };
        let mut tick = match child_tick(0, &child) {
            Ok(tick) => tick,
            Err(err) => return Point::errored(err).with_sub_points(vec![child]),
        };
        let Some(inverted) = tick.price.checked_inv() else {
            return Point::errored(PointError::DivisionByZero).with_sub_points(vec![child]);
        };
        tick.volume24h = tick.volume24h.map(|v| &v * &tick.price);
        tick.pair = tick.pair.invert();
        tick.price = inverted;
        Point::new(tick, child.time).with_sub_points(vec![child])
    }
}
