//! # ora-relay
//!
//! Decides when to push signed prices on-chain and submits them.
//!
//! Each worker owns one contract and one data model. On every tick it reads
//! the contract state, compares it with the freshest signed data available
//! locally and submits at most one transaction when the on-chain price is
//! stale (spread above threshold) or expired (older than the expiration).
//!
//! ## Modules
//!
//! - [`spread`]: relative price difference
//! - [`median`]: Median (ECDSA quorum) worker
//! - [`scribe`]: Scribe (Schnorr) worker
//! - [`opscribe`]: optimistic Scribe worker
//! - [`relay`]: worker scheduling and write error classification

pub mod median;
pub mod opscribe;
pub mod relay;
pub mod scribe;
pub mod spread;

use std::time::Duration;

use chrono::{DateTime, Utc};
use ora_contract::ContractError;

pub use median::MedianWorker;
pub use opscribe::OpScribeWorker;
pub use relay::{Relay, Worker};
pub use scribe::ScribeWorker;
pub use spread::spread;

/// Error types for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Reading contract state failed.
    #[error("failed to read {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: ContractError,
    },

    /// Submitting a transaction failed.
    #[error("failed to submit update: {0}")]
    Write(ContractError),

    /// The contract serves another asset than the configured data model.
    #[error("contract wat {got} does not match data model {expected}")]
    WatMismatch { expected: String, got: String },

    /// Worker parameters are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

pub(crate) fn read(what: &'static str) -> impl FnOnce(ContractError) -> RelayError {
    move |source| RelayError::Read { what, source }
}

/// Parameters shared by all worker kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub data_model: String,
    /// Minimum spread in percent that triggers an update.
    pub spread: f64,
    /// Maximum age of the on-chain price.
    pub expiration: Duration,
}

impl WorkerConfig {
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] for an empty data model or a
    /// spread that is negative or not finite.
    pub fn new(data_model: impl Into<String>, spread: f64, expiration: Duration) -> Result<Self> {
        let data_model = data_model.into();
        if data_model.is_empty() {
            return Err(RelayError::InvalidConfig("data model must not be empty".to_string()));
        }
        if !spread.is_finite() || spread < 0.0 {
            return Err(RelayError::InvalidConfig(format!("spread {spread} must be a non-negative number")));
        }
        Ok(Self {
            data_model,
            spread,
            expiration,
        })
    }

    /// `(expired, stale)` for an on-chain price of age `age` that differs
    /// from the local one by `spread` percent.
    pub(crate) fn needs_update(&self, spread: f64, age: DateTime<Utc>, now: DateTime<Utc>) -> (bool, bool) {
        let expired = chrono::Duration::from_std(self.expiration).is_ok_and(|exp| now - age >= exp);
        let stale = spread >= self.spread;
        (expired, stale)
    }
}
