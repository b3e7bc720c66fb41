//! Cross rates over chained pairs.
//!
//! Children are folded left to right. Each step joins the running tick with
//! the next one on their shared symbol:
//!
//! | left  | right | result | price        |
//! |-------|-------|--------|--------------|
//! | A/B   | B/C   | A/C    | pl * pr      |
//! | A/B   | C/B   | A/C    | pl / pr      |
//! | B/A   | B/C   | A/C    | pr / pl      |
//! | B/A   | C/B   | A/C    | 1/(pl * pr)  |
//!
//! The first matching row wins.

use std::sync::Arc;

use ora_types::{Pair, Point, PointError, Tick};

use crate::node::{child_tick, Node};

#[derive(Debug, Default)]
pub struct IndirectNode {
    pub(crate) children: Vec<Arc<Node>>,
}

impl IndirectNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_point(&self) -> Point {
        let points: Vec<Point> = self.children.iter().map(|c| c.data_point()).collect();
        let point = match resolve(&points) {
            Ok(point) => point,
            Err(err) => Point::errored(err),
        };
        point.with_sub_points(points)
    }
}

fn resolve(points: &[Point]) -> Result<Point, PointError> {
    if points.len() < 2 {
        return Err(PointError::NotEnoughValues {
            got: points.len(),
            need: 2,
        });
    }
    let mut ticks = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        ticks.push(child_tick(index, point)?);
    }

    let mut iter = ticks.into_iter();
    let first = iter.next().ok_or(PointError::MissingValue)?;
    let tick = iter.try_fold(first, |acc, next| cross(&acc, &next))?;
    let time = points.iter().map(|p| p.time).min().unwrap_or_default();
    Ok(Point::new(tick, time))
}

/// Join two ticks on their shared symbol.
///
/// # Errors
///
/// - [`PointError::NoCommonSymbol`] if the pairs share no symbol
/// - [`PointError::DivisionByZero`] if a divisor price is zero
pub fn cross(left: &Tick, right: &Tick) -> Result<Tick, PointError> {
    let (l, r) = (&left.pair, &right.pair);
    let (pl, pr) = (&left.price, &right.price);

    let (base, quote, price) = if l.quote() == r.base() {
        (l.base(), r.quote(), pl * pr)
    } else if l.quote() == r.quote() {
        (l.base(), r.base(), pl.checked_div(pr).ok_or(PointError::DivisionByZero)?)
    } else if l.base() == r.base() {
        (l.quote(), r.quote(), pr.checked_div(pl).ok_or(PointError::DivisionByZero)?)
    } else if l.base() == r.quote() {
        (l.quote(), r.base(), (pl * pr).checked_inv().ok_or(PointError::DivisionByZero)?)
    } else {
        return Err(PointError::NoCommonSymbol {
            left: l.to_string(),
            right: r.to_string(),
        });
    };

    let pair = Pair::new(base, quote).map_err(|e| PointError::InvalidValue(e.to_string()))?;
    Ok(Tick::new(pair, price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::{failing_origin, origin, pair};

    fn tick(p: &str, price: &str) -> Tick {
        Tick::new(pair(p), price.parse().expect("decimal"))
    }

    fn indirect(children: Vec<Arc<Node>>) -> Node {
        let mut node = Node::Indirect(IndirectNode::new());
        node.add_nodes(children).expect("add");
        node
    }

    #[test]
    fn test_cross_cases() {
        let t = cross(&tick("A/B", "2"), &tick("B/C", "3")).expect("cross");
        assert_eq!((t.pair.to_string(), t.price.to_string()), ("A/C".to_string(), "6".to_string()));

        let t = cross(&tick("B/A", "2"), &tick("B/C", "3")).expect("cross");
        assert_eq!((t.pair.to_string(), t.price.to_string()), ("A/C".to_string(), "1.5".to_string()));

        let t = cross(&tick("A/B", "3"), &tick("C/B", "2")).expect("cross");
        assert_eq!((t.pair.to_string(), t.price.to_string()), ("A/C".to_string(), "1.5".to_string()));

        let t = cross(&tick("B/A", "2"), &tick("C/B", "4")).expect("cross");
        assert_eq!((t.pair.to_string(), t.price.to_string()), ("A/C".to_string(), "0.125".to_string()));
    }

    #[test]
    fn test_cross_without_common_symbol() {
        let err = cross(&tick("A/B", "1"), &tick("C/D", "1"));
        assert!(matches!(err, Err(PointError::NoCommonSymbol { .. })));
    }

    #[test]
    fn test_cross_division_by_zero() {
        let err = cross(&tick("A/B", "1"), &tick("C/B", "0"));
        assert_eq!(err, Err(PointError::DivisionByZero));
    }

    #[test]
    fn test_chain_of_three() {
        let node = indirect(vec![
            origin("a", "BTC/ETH", "20"),
            origin("b", "ETH/USDT", "2000"),
            origin("c", "USDT/USD", "0.5"),
        ]);
        let point = node.data_point();
        assert!(point.is_valid());
        let tick = point.tick().expect("tick");
        assert_eq!(tick.pair.to_string(), "BTC/USD");
        assert_eq!(tick.price.to_string(), "20000");
        assert_eq!(point.sub_points.len(), 3);
        assert_eq!(point.meta_str("type"), Some("indirect"));
    }

    #[test]
    fn test_invalid_child_fails_node() {
        let node = indirect(vec![origin("a", "BTC/ETH", "20"), failing_origin("b", "ETH/USD")]);
        let point = node.data_point();
        assert!(matches!(point.error, Some(PointError::Child { index: 1, .. })));
    }

    #[test]
    fn test_single_child_is_not_enough() {
        let node = indirect(vec![origin("a", "BTC/ETH", "20")]);
        assert!(!node.data_point().is_valid());
    }
}
