//! # ora-feeder
//!
//! Periodically evaluates data models, signs their points and broadcasts
//! them as `data_point/v1` messages.
//!
//! ## Modules
//!
//! - [`feeder`]: the evaluate, sign and broadcast loop
//! - [`hooks`]: point transformations run before signing and broadcasting

pub mod feeder;
pub mod hooks;

pub use feeder::Feeder;
pub use hooks::{Hook, PrecisionClamp, TraceHook};

/// Error types for feeder operations.
#[derive(Debug, thiserror::Error)]
pub enum FeederError {
    /// A model could not be evaluated.
    #[error("graph error: {0}")]
    Graph(#[from] ora_graph::GraphError),

    /// A point could not be signed.
    #[error("signing error: {0}")]
    Crypto(#[from] ora_crypto::CryptoError),

    /// A message could not be broadcast.
    #[error("transport error: {0}")]
    Transport(#[from] ora_transport::TransportError),

    /// A hook rejected the point.
    #[error("hook {hook} failed: {reason}")]
    Hook { hook: &'static str, reason: String },
}

/// Convenience result type for feeder operations.
pub type Result<T> = std::result::Result<T, FeederError>;
