//! # ora-store
//!
//! In-memory stores of the latest signed messages received from feeds.
//!
//! Both stores keep one entry per (data model, feed). A newer entry replaces
//! an older one; an older entry never replaces a newer one. Nothing is
//! persisted.
//!
//! ## Modules
//!
//! - [`datapoint`]: signed data points from `data_point/v1`
//! - [`musig`]: aggregated signatures from `musig_signature/v1`

pub mod datapoint;
pub mod musig;

use std::sync::Arc;

use ora_transport::{ReceivedMessage, Transport, TransportError};
use ora_types::Address;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use datapoint::{DataPointStore, StoredDataPoint};
pub use musig::MuSigStore;

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The transport delivered a message it could not decode.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The feed address could not be recovered from the signature.
    #[error("signature recovery failed: {0}")]
    Recovery(#[from] ora_crypto::CryptoError),

    /// The message kind does not belong to this store.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    /// The data model is not on the allow-list.
    #[error("data model {0} is not allowed")]
    ModelNotAllowed(String),

    /// The feed is not on the allow-list.
    #[error("feed {0} is not allowed")]
    FeedNotAllowed(Address),

    /// The message content is not usable.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Convenience result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A store fed by one transport topic.
pub trait MessageHandler: Send + Sync + 'static {
    /// Topic the handler consumes.
    const TOPIC: &'static str;

    /// Name used in logs.
    const NAME: &'static str;

    /// Apply one received message. Returns whether the store changed.
    ///
    /// # Errors
    ///
    /// Returns an error for messages that are rejected.
    fn handle(&self, msg: &ReceivedMessage) -> Result<bool>;
}

/// Subscribe `store` to its topic and feed it until `shutdown` fires or the
/// transport closes the subscription.
///
/// # Errors
///
/// Returns [`StoreError::Transport`] if the subscription fails.
pub fn spawn<S, T>(
    store: Arc<S>,
    transport: &T,
    shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>>
where
    S: MessageHandler,
    T: Transport + ?Sized,
{
    let rx = transport.messages(S::TOPIC)?;
    Ok(tokio::spawn(run(store, rx, shutdown)))
}

async fn run<S: MessageHandler>(
    store: Arc<S>,
    mut rx: mpsc::Receiver<ReceivedMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(store = S::NAME, topic = S::TOPIC, "store started");
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match store.handle(&msg) {
                    Ok(true) => debug!(store = S::NAME, author = %msg.author, "message stored"),
                    Ok(false) => debug!(store = S::NAME, author = %msg.author, "older message ignored"),
                    Err(e) => warn!(
                        store = S::NAME,
                        author = %msg.author,
                        error = %e,
                        advice = "check that the feed runs a compatible version and is configured for this model",
                        "message rejected"
                    ),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    info!(store = S::NAME, "store stopped");
}
