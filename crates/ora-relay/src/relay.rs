//! Worker scheduling.
//!
//! Every worker runs in its own task with its own ticker, so a slow
//! contract never delays another. Ticks of one worker never overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ora_types::TxHash;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{RelayError, Result};

/// Default interval between worker ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Worker: Send + Sync {
    /// Name used in logs, for example `median:BTC/USD`.
    fn name(&self) -> String;

    /// Run one update cycle at `now`. Returns the hash of the submitted
    /// transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns the read or write failure that ended the cycle.
    async fn update(&self, now: DateTime<Utc>) -> Result<Option<TxHash>>;

    /// Run one update cycle and log its outcome.
    async fn tick(&self) -> Option<TxHash> {
        let name = self.name();
        match self.update(Utc::now()).await {
            Ok(Some(tx)) => {
                info!(worker = %name, tx = %format!("0x{}", hex::encode(tx)), "update submitted");
                Some(tx)
            }
            Ok(None) => {
                debug!(worker = %name, "no update needed");
                None
            }
            Err(e) => {
                log_error(&name, &e);
                None
            }
        }
    }
}

/// Log a failed cycle at the level its cause deserves.
pub fn log_error(worker: &str, err: &RelayError) {
    match err {
        RelayError::Read { what, source } => warn!(
            worker,
            what,
            error = %source,
            advice = "check the ethereum client and the contract address",
            "failed to read contract state"
        ),
        RelayError::Write(e) if e.is_replacement_underpriced() => warn!(
            worker,
            error = %e,
            advice = "a previous transaction is still pending",
            "update not submitted"
        ),
        RelayError::Write(e) => match e.revert() {
            Some(revert) => error!(worker, revert = %revert, "update reverted"),
            None => error!(worker, error = %e, "failed to submit update"),
        },
        RelayError::WatMismatch { .. } | RelayError::InvalidConfig(_) => error!(
            worker,
            error = %err,
            advice = "check the relay configuration",
            "worker misconfigured"
        ),
    }
}

/// Runs workers on a fixed interval.
pub struct Relay {
    workers: Vec<Arc<dyn Worker>>,
    interval: Duration,
}

impl Relay {
    pub fn new(interval: Duration) -> Self {
        Self {
            workers: Vec::new(),
            interval,
        }
    }

    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn workers(&self) -> &[Arc<dyn Worker>] {
        &self.workers
    }

    /// Tick every worker on the interval until `shutdown` fires.
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) {
        info!(workers = self.workers.len(), interval_secs = self.interval.as_secs(), "relay started");
        let mut tasks = JoinSet::new();
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let mut shutdown = shutdown.resubscribe();
            let mut ticker = tokio::time::interval(self.interval);
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            worker.tick().await;
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "relay worker task failed");
            }
        }
        info!("relay stopped");
    }
}
