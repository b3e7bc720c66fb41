//! Integration test: price models over several origins.
//!
//! A `BTC/USD` reference model points at a median of five origins. The
//! origins are queried through the provider's updater, so failures travel
//! the same path as in the agent.

use ora_graph::Provider;
use ora_integration_tests::{median_provider, BTC_USD};
use ora_types::Point;

fn price(point: &Point) -> Option<String> {
    point.tick().map(|t| t.price.to_string())
}

#[tokio::test]
async fn five_origins_same_price() {
    let provider = median_provider(&[Some("1"); 5], 3);
    let point = provider.data_point(BTC_USD).await.expect("model");

    assert!(point.validate().is_ok(), "point should validate: {:?}", point.error);
    assert_eq!(point.meta_str("type"), Some("reference"));
    assert_eq!(price(&point).as_deref(), Some("1"));

    // The median below the reference carries one sub-point per origin.
    let median = &point.sub_points[0];
    assert_eq!(median.meta_str("type"), Some("median"));
    assert_eq!(median.sub_points.len(), 5);
}

#[tokio::test]
async fn four_correct_one_zero() {
    let provider = median_provider(&[Some("1"), Some("1"), Some("0"), Some("1"), Some("1")], 3);
    let point = provider.data_point(BTC_USD).await.expect("model");

    assert!(point.validate().is_ok(), "point should validate: {:?}", point.error);
    assert_eq!(price(&point).as_deref(), Some("1"));
}

#[tokio::test]
async fn three_correct_two_erroring() {
    let provider = median_provider(&[Some("1"), None, Some("1"), None, Some("1")], 3);
    let point = provider.data_point(BTC_USD).await.expect("model");

    assert!(point.validate().is_ok(), "point should validate: {:?}", point.error);
    assert_eq!(price(&point).as_deref(), Some("1"));

    let median = &point.sub_points[0];
    let errored = median.sub_points.iter().filter(|p| p.error.is_some()).count();
    assert_eq!(errored, 2);
}

#[tokio::test]
async fn two_correct_is_below_min() {
    let provider = median_provider(&[Some("1"), None, None, None, Some("1")], 3);
    let point = provider.data_point(BTC_USD).await.expect("model");

    assert!(point.error.is_some());
    assert!(point.validate().is_err());
    assert!(!point.error.as_ref().map(|e| e.to_string()).unwrap_or_default().is_empty());
}

#[tokio::test]
async fn median_ignores_origin_order() {
    let prices = ["10", "7.5", "12", "9", "11"];
    for rotation in 0..prices.len() {
        let rotated: Vec<Option<&str>> = prices
            .iter()
            .cycle()
            .skip(rotation)
            .take(prices.len())
            .map(|p| Some(*p))
            .collect();
        let provider = median_provider(&rotated, 3);
        let point = provider.data_point(BTC_USD).await.expect("model");
        assert_eq!(price(&point).as_deref(), Some("10"), "rotation {rotation}");
    }
}
