//! Point transformations run by the feeder.
//!
//! Hooks run in the order they were added. `before_sign` may change the
//! signed fields; `before_broadcast` runs on the signed point and must only
//! touch metadata.

use std::collections::BTreeMap;

use ora_types::Point;

use crate::Result;

pub trait Hook: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns [`crate::FeederError::Hook`] to skip signing the point.
    fn before_sign(&self, _model: &str, _point: &mut Point) -> Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`crate::FeederError::Hook`] to skip broadcasting the point.
    fn before_broadcast(&self, _model: &str, _point: &mut Point) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Precision clamp
// ---------------------------------------------------------------------------

/// Rounds prices and volumes to a maximum number of fractional digits,
/// including those of sub-points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionClamp {
    pub max_price_prec: u8,
    pub max_volume_prec: u8,
}

impl PrecisionClamp {
    pub fn new(max_price_prec: u8, max_volume_prec: u8) -> Self {
        Self {
            max_price_prec,
            max_volume_prec,
        }
    }

    fn clamp(&self, point: &mut Point) {
        if let Some(tick) = point.tick_mut() {
            tick.price = tick.price.set_prec(self.max_price_prec);
            if let Some(volume) = &tick.volume24h {
                tick.volume24h = Some(volume.set_prec(self.max_volume_prec));
            }
        }
        for sub in &mut point.sub_points {
            self.clamp(sub);
        }
    }
}

impl Hook for PrecisionClamp {
    fn name(&self) -> &'static str {
        "precision_clamp"
    }

    fn before_sign(&self, _model: &str, point: &mut Point) -> Result<()> {
        self.clamp(point);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Records the origin prices a point was derived from under meta `trace`,
/// keyed `pair@origin`. Origins whose point does not validate are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceHook;

impl TraceHook {
    fn collect(point: &Point, out: &mut BTreeMap<String, serde_json::Value>) {
        if point.meta_str("type") == Some("origin") && point.is_valid() {
            if let (Some(origin), Some(tick)) = (point.meta_str("origin"), point.tick()) {
                out.insert(format!("{}@{}", tick.pair, origin), tick.price.to_string().into());
            }
        }
        for sub in &point.sub_points {
            Self::collect(sub, out);
        }
    }
}

impl Hook for TraceHook {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn before_broadcast(&self, _model: &str, point: &mut Point) -> Result<()> {
        let mut trace = BTreeMap::new();
        Self::collect(point, &mut trace);
        if !trace.is_empty() {
            point
                .meta
                .insert("trace".to_string(), serde_json::Value::Object(trace.into_iter().collect()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ora_types::{PointError, Tick};

    use super::*;

    fn tick_point(pair: &str, price: &str) -> Point {
        Point::new(Tick::new(pair.parse().expect("pair"), price.parse().expect("decimal")), Utc::now())
    }

    fn origin_point(origin: &str, pair: &str, price: &str) -> Point {
        tick_point(pair, price).with_meta("type", "origin").with_meta("origin", origin)
    }

    #[test]
    fn test_precision_clamp_is_recursive() {
        let mut point = tick_point("BTC/USD", "1.23456789")
            .with_sub_points(vec![origin_point("a", "BTC/USD", "9.87654321")]);
        if let Some(tick) = point.tick_mut() {
            tick.volume24h = Some("10.555".parse().expect("decimal"));
        }

        PrecisionClamp::new(4, 1).before_sign("BTC/USD", &mut point).expect("hook");

        let tick = point.tick().expect("tick");
        assert_eq!(tick.price.prec(), 4);
        assert_eq!(tick.volume24h.as_ref().map(|v| v.prec()), Some(1));
        assert_eq!(point.sub_points[0].tick().map(|t| t.price.prec()), Some(4));
    }

    #[test]
    fn test_precision_clamp_keeps_short_values() {
        let mut point = tick_point("BTC/USD", "1.5");
        PrecisionClamp::new(8, 8).before_sign("BTC/USD", &mut point).expect("hook");
        assert_eq!(point.tick().map(|t| t.price.to_string()), Some("1.5".to_string()));
    }

    #[test]
    fn test_trace_collects_origin_prices() {
        let mut point = tick_point("BTC/USD", "101")
            .with_meta("type", "median")
            .with_sub_points(vec![
                origin_point("kraken", "BTC/USD", "100"),
                tick_point("BTC/USD", "102")
                    .with_meta("type", "alias")
                    .with_sub_points(vec![origin_point("binance", "BTC/USDT", "102")]),
            ]);

        TraceHook.before_broadcast("BTC/USD", &mut point).expect("hook");

        let trace = point.meta.get("trace").expect("trace");
        assert_eq!(trace["BTC/USD@kraken"], "100");
        assert_eq!(trace["BTC/USDT@binance"], "102");
        assert_eq!(trace.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_trace_skips_invalid_origins() {
        let mut point = tick_point("BTC/USD", "100")
            .with_meta("type", "median")
            .with_sub_points(vec![
                origin_point("kraken", "BTC/USD", "100"),
                origin_point("dead", "BTC/USD", "5").with_error(PointError::Expired),
            ]);

        TraceHook.before_broadcast("BTC/USD", &mut point).expect("hook");

        let trace = point.meta.get("trace").and_then(|t| t.as_object()).expect("trace");
        assert_eq!(trace.len(), 1);
        assert_eq!(trace["BTC/USD@kraken"], "100");
        assert!(!trace.contains_key("BTC/USD@dead"));
    }

    #[test]
    fn test_trace_skipped_without_origins() {
        let mut point = tick_point("BTC/USD", "1");
        TraceHook.before_broadcast("BTC/USD", &mut point).expect("hook");
        assert!(!point.meta.contains_key("trace"));
    }
}
