//! Origin leaves.
//!
//! An origin node holds the last point fetched for one `(origin, pair)`.
//! The point is replaced by the [`crate::Updater`]; evaluation applies the
//! freshness policy:
//!
//! - older than the freshness threshold: still valid, flagged `stale`
//! - older than the expiry threshold: invalid with [`PointError::Expired`]

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ora_types::{Pair, Point, PointError};

use crate::{GraphError, Result};

/// Default age after which a point is refreshed and flagged stale.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(60);

/// Default age after which a point is rejected.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct OriginNode {
    origin: String,
    pair: Pair,
    freshness: Duration,
    expiry: Duration,
    point: RwLock<Point>,
}

impl OriginNode {
    pub fn new(origin: impl Into<String>, pair: Pair) -> Self {
        Self::with_thresholds(origin, pair, DEFAULT_FRESHNESS, DEFAULT_EXPIRY)
    }

    pub fn with_thresholds(origin: impl Into<String>, pair: Pair, freshness: Duration, expiry: Duration) -> Self {
        Self {
            origin: origin.into(),
            pair,
            freshness,
            expiry,
            point: RwLock::new(Point::default()),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    /// Replace the held point.
    ///
    /// An errored point only replaces a point that has no value, so a
    /// transient origin failure does not discard the last known price
    /// before it expires.
    ///
    /// # Errors
    ///
    /// - [`GraphError::PairMismatch`] if the point carries a tick for
    ///   another pair
    /// - [`GraphError::OlderPoint`] if the point is older than the held one
    pub fn set_point(&self, point: Point) -> Result<()> {
        if let Some(tick) = point.tick() {
            if tick.pair != self.pair {
                return Err(GraphError::PairMismatch {
                    expected: self.pair.to_string(),
                    got: tick.pair.to_string(),
                });
            }
        }
        let mut held = self.point.write().unwrap_or_else(PoisonError::into_inner);
        if point.error.is_some() {
            if held.value.is_none() {
                *held = point;
            }
            return Ok(());
        }
        if held.value.is_some() && point.time < held.time {
            return Err(GraphError::OlderPoint);
        }
        *held = point;
        Ok(())
    }

    /// Whether the held point is valid and younger than the freshness
    /// threshold at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let held = self.point.read().unwrap_or_else(PoisonError::into_inner);
        held.is_valid() && age(&held, now) < self.freshness
    }

    pub fn data_point(&self) -> Point {
        self.data_point_at(Utc::now())
    }

    /// Evaluate the node as of `now`.
    pub fn data_point_at(&self, now: DateTime<Utc>) -> Point {
        let mut point = self.point.read().unwrap_or_else(PoisonError::into_inner).clone();
        point = point.with_meta("origin", self.origin.as_str());
        if point.value.is_none() && point.error.is_none() {
            return point.with_error(PointError::Origin {
                origin: self.origin.clone(),
                message: "no data fetched yet".to_string(),
            });
        }
        if point.error.is_some() {
            return point;
        }
        let age = age(&point, now);
        if age >= self.expiry {
            return point.with_error(PointError::Expired);
        }
        if age >= self.freshness {
            point = point.with_meta("stale", true);
        }
        point
    }
}

fn age(point: &Point, now: DateTime<Utc>) -> Duration {
    (now - point.time).to_std().unwrap_or(Duration::ZERO)
}
