//! Data points produced by graph nodes.
//!
//! A [`Point`] never signals failure by returning `Err`: evaluation errors are
//! carried on the point itself so that a parent node can decide whether to
//! drop the child (median) or propagate the failure (indirect, alias).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::{Tick, Validatable, Value};

/// Free-form metadata attached to a point.
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Reasons a point may be invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// The origin failed to produce a price.
    #[error("origin {origin}: {message}")]
    Origin { origin: String, message: String },

    /// The point is older than the expiry threshold.
    #[error("expired")]
    Expired,

    /// Too few valid children to aggregate.
    #[error("not enough values: got {got}, need {need}")]
    NotEnoughValues { got: usize, need: usize },

    /// Children of a median node disagree on the pair.
    #[error("pair mismatch: expected {expected}, got {got}")]
    PairMismatch { expected: String, got: String },

    /// Adjacent pairs in an indirect chain share no symbol.
    #[error("pairs {left} and {right} have no common symbol")]
    NoCommonSymbol { left: String, right: String },

    /// A node received a value kind it cannot handle.
    #[error("unexpected value kind {0}")]
    UnexpectedValue(String),

    /// A price of zero was used as a divisor.
    #[error("division by zero")]
    DivisionByZero,

    #[error("value is not set")]
    MissingValue,

    #[error("time is not set")]
    MissingTime,

    /// The value failed its own validation.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A child point is invalid.
    #[error("child {index}: {source}")]
    Child {
        index: usize,
        source: Box<PointError>,
    },

    /// Any other failure, including errors received from remote peers.
    #[error("{0}")]
    Other(String),
}

impl Serialize for PointError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PointError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "expired" => PointError::Expired,
            "division by zero" => PointError::DivisionByZero,
            "value is not set" => PointError::MissingValue,
            "time is not set" => PointError::MissingTime,
            _ => PointError::Other(s),
        })
    }
}

/// Output of a graph node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_points: Vec<Point>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PointError>,
}

impl Point {
    /// A point carrying `value` observed at `time`.
    pub fn new(value: impl Into<Value>, time: DateTime<Utc>) -> Self {
        Self {
            value: Some(value.into()),
            time,
            ..Self::default()
        }
    }

    /// A point that only carries an error.
    pub fn errored(error: PointError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn with_sub_points(mut self, sub_points: Vec<Point>) -> Self {
        self.sub_points = sub_points;
        self
    }

    pub fn with_error(mut self, error: PointError) -> Self {
        self.error = Some(error);
        self
    }

    /// Check that the point is usable.
    ///
    /// A point is valid iff it carries no error, has a value that validates
    /// and has a non-zero time.
    ///
    /// # Errors
    ///
    /// Returns the first reason the point is invalid.
    pub fn validate(&self) -> Result<(), PointError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let Some(value) = &self.value else {
            return Err(PointError::MissingValue);
        };
        if is_zero_time(&self.time) {
            return Err(PointError::MissingTime);
        }
        value
            .validate()
            .map_err(|e| PointError::InvalidValue(e.to_string()))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The tick carried by this point, if the value is a tick.
    pub fn tick(&self) -> Option<&Tick> {
        self.value.as_ref().and_then(Value::as_tick)
    }

    pub fn tick_mut(&mut self) -> Option<&mut Tick> {
        self.value.as_mut().and_then(Value::as_tick_mut)
    }

    /// String metadata under `key`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(serde_json::Value::as_str)
    }

    /// A copy of this point without the derivation tree.
    ///
    /// Points sent over the network carry only their own value and meta.
    pub fn without_sub_points(&self) -> Self {
        Self {
            sub_points: Vec::new(),
            ..self.clone()
        }
    }
}

/// Whether `time` is the zero time (the Unix epoch).
pub fn is_zero_time(time: &DateTime<Utc>) -> bool {
    time.timestamp() == 0 && time.timestamp_subsec_nanos() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pair;
    use ora_decimal::DecFloatPoint;

    fn tick(price: &str) -> Tick {
        let pair: Pair = "BTC/USD".parse().expect("valid pair");
        Tick::new(pair, price.parse::<DecFloatPoint>().expect("decimal"))
    }

    #[test]
    fn test_valid_point() {
        let point = Point::new(tick("1"), Utc::now());
        assert!(point.is_valid());
        assert!(point.meta.is_empty());
        assert_eq!(point.tick().map(|t| t.price.to_string()), Some("1".to_string()));
    }

    #[test]
    fn test_invalid_points() {
        assert_eq!(Point::default().validate(), Err(PointError::MissingValue));

        let no_time = Point::new(tick("1"), DateTime::<Utc>::default());
        assert_eq!(no_time.validate(), Err(PointError::MissingTime));

        let errored = Point::new(tick("1"), Utc::now()).with_error(PointError::Expired);
        assert_eq!(errored.validate(), Err(PointError::Expired));

        let negative = Point::new(tick("-1"), Utc::now());
        assert!(matches!(negative.validate(), Err(PointError::InvalidValue(_))));
    }

    #[test]
    fn test_meta_helpers() {
        let point = Point::new(tick("1"), Utc::now()).with_meta("type", "origin");
        assert_eq!(point.meta_str("type"), Some("origin"));
        assert_eq!(point.meta_str("missing"), None);
    }

    #[test]
    fn test_without_sub_points() {
        let child = Point::new(tick("1"), Utc::now());
        let parent = Point::new(tick("2"), Utc::now()).with_sub_points(vec![child]);
        assert_eq!(parent.sub_points.len(), 1);
        let stripped = parent.without_sub_points();
        assert!(stripped.sub_points.is_empty());
        assert_eq!(stripped.value, parent.value);
    }

    #[test]
    fn test_error_serializes_as_string() {
        let point = Point::errored(PointError::NotEnoughValues { got: 2, need: 3 });
        let json = serde_json::to_value(&point).expect("serialize");
        assert_eq!(json["error"], "not enough values: got 2, need 3");

        let back: Point = serde_json::from_value(json).expect("deserialize");
        assert_eq!(
            back.error,
            Some(PointError::Other("not enough values: got 2, need 3".to_string()))
        );
    }

    #[test]
    fn test_child_error_display() {
        let err = PointError::Child {
            index: 1,
            source: Box::new(PointError::Expired),
        };
        assert_eq!(err.to_string(), "child 1: expired");
    }
}
