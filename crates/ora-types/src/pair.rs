//! Asset pairs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, TypesError};

/// An ordered `(base, quote)` asset pair such as `BTC/USD`.
///
/// Symbols are opaque; they are compared byte for byte and never normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    /// Create a pair.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidPair`] if either symbol is empty or
    /// contains a `/`.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self> {
        let base = base.into();
        let quote = quote.into();
        if base.is_empty() || quote.is_empty() || base.contains('/') || quote.contains('/') {
            return Err(TypesError::InvalidPair(format!("{base}/{quote}")));
        }
        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// The same pair in the opposite direction (`USD/BTC` for `BTC/USD`).
    pub fn invert(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// Whether `other` is this pair in the opposite direction.
    pub fn is_inverted_of(&self, other: &Pair) -> bool {
        self.base == other.quote && self.quote == other.base
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((base, quote)) => Self::new(base, quote),
            None => Err(TypesError::InvalidPair(s.to_string())),
        }
    }
}

impl Serialize for Pair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
