//! Median of same-pair children.

use std::sync::Arc;

use ora_decimal::DecFloatPoint;
use ora_types::{Pair, Point, PointError, Tick};

use crate::node::Node;

#[derive(Debug)]
pub struct MedianNode {
    pub(crate) pair: Pair,
    pub(crate) min: usize,
    pub(crate) children: Vec<Arc<Node>>,
}

impl MedianNode {
    /// A median node requiring at least `min` valid children.
    pub fn new(pair: Pair, min: usize) -> Self {
        Self {
            pair,
            min,
            children: Vec::new(),
        }
    }

    pub fn data_point(&self) -> Point {
        let points: Vec<Point> = self.children.iter().map(|c| c.data_point()).collect();
        let result = aggregate(&self.pair, self.min, &points);
        let point = match result {
            Ok(point) => point,
            Err(err) => Point::errored(err),
        };
        point.with_sub_points(points)
    }
}

fn aggregate(pair: &Pair, min: usize, points: &[Point]) -> Result<Point, PointError> {
    let valid: Vec<(&Tick, &Point)> = points
        .iter()
        .filter(|p| p.is_valid())
        .filter_map(|p| p.tick().map(|t| (t, p)))
        .collect();

    let need = min.max(1);
    if valid.len() < need {
        return Err(PointError::NotEnoughValues {
            got: valid.len(),
            need,
        });
    }
    for (tick, _) in &valid {
        if tick.pair != *pair {
            return Err(PointError::PairMismatch {
                expected: pair.to_string(),
                got: tick.pair.to_string(),
            });
        }
    }

    let mut prices: Vec<DecFloatPoint> = valid.iter().map(|(t, _)| t.price.clone()).collect();
    let time = valid.iter().map(|(_, p)| p.time).min().unwrap_or_default();

    let tick = Tick::new(pair.clone(), median(&mut prices)).with_volume(DecFloatPoint::zero());
    Ok(Point::new(tick, time))
}

/// Median of a non-empty list; sorts `prices` in place.
pub(crate) fn median(prices: &mut [DecFloatPoint]) -> DecFloatPoint {
    prices.sort();
    let n = prices.len();
    if n == 0 {
        return DecFloatPoint::zero();
    }
    if n % 2 == 1 {
        prices[n / 2].clone()
    } else {
        (prices[n / 2 - 1].clone() + prices[n / 2].clone()) / DecFloatPoint::from_int(2)
    }
}
