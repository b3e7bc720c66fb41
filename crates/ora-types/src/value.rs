//! Values carried by data points.
//!
//! [`Value`] is the closed set of payload kinds that flow through the
//! aggregation graph. Capabilities are expressed as traits:
//!
//! - [`NumericValue`]: the value can be reduced to a single number
//! - [`Validatable`]: the value can check its own invariants

use std::fmt;

use ora_decimal::DecFloatPoint;
use serde::{Deserialize, Serialize};

use crate::{Pair, Result, TypesError};

/// A value that can be reduced to a single decimal number.
pub trait NumericValue {
    fn number(&self) -> DecFloatPoint;
}

/// A value that can validate its own invariants.
pub trait Validatable {
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidValue`] describing the first violated
    /// invariant.
    fn validate(&self) -> Result<()>;
}

/// Price of a pair, optionally with its 24h volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub pair: Pair,
    pub price: DecFloatPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume24h: Option<DecFloatPoint>,
}

impl Tick {
    pub fn new(pair: Pair, price: DecFloatPoint) -> Self {
        Self {
            pair,
            price,
            volume24h: None,
        }
    }

    pub fn with_volume(mut self, volume: DecFloatPoint) -> Self {
        self.volume24h = Some(volume);
        self
    }
}

impl NumericValue for Tick {
    fn number(&self) -> DecFloatPoint {
        self.price.clone()
    }
}

impl Validatable for Tick {
    fn validate(&self) -> Result<()> {
        if self.price.is_negative() {
            return Err(TypesError::InvalidValue(format!(
                "price of {} is negative: {}",
                self.pair, self.price
            )));
        }
        if let Some(volume) = &self.volume24h {
            if volume.is_negative() {
                return Err(TypesError::InvalidValue(format!(
                    "volume of {} is negative: {volume}",
                    self.pair
                )));
            }
        }
        Ok(())
    }
}

/// A constant number, used for fixed rates and test fixtures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticValue(pub DecFloatPoint);

impl NumericValue for StaticValue {
    fn number(&self) -> DecFloatPoint {
        self.0.clone()
    }
}

/// The value of a data point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Value {
    Tick(Tick),
    Static(StaticValue),
}

impl Value {
    /// Short name of the value kind, as used in logs and JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Tick(_) => "tick",
            Value::Static(_) => "static",
        }
    }

    pub fn as_tick(&self) -> Option<&Tick> {
        match self {
            Value::Tick(tick) => Some(tick),
            Value::Static(_) => None,
        }
    }

    pub fn as_tick_mut(&mut self) -> Option<&mut Tick> {
        match self {
            Value::Tick(tick) => Some(tick),
            Value::Static(_) => None,
        }
    }
}

impl NumericValue for Value {
    fn number(&self) -> DecFloatPoint {
        match self {
            Value::Tick(tick) => tick.number(),
            Value::Static(value) => value.number(),
        }
    }
}

impl Validatable for Value {
    fn validate(&self) -> Result<()> {
        match self {
            Value::Tick(tick) => tick.validate(),
            Value::Static(_) => Ok(()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Tick(tick) => write!(f, "{} {}", tick.pair, tick.price),
            Value::Static(value) => write!(f, "{}", value.0),
        }
    }
}

impl From<Tick> for Value {
    fn from(tick: Tick) -> Self {
        Value::Tick(tick)
    }
}
