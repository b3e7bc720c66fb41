//! # ora-transport
//!
//! Topic-addressed pub/sub of signed oracle messages.
//!
//! Every topic carries exactly one message kind. Messages are framed in a
//! deterministic protobuf-shaped binary form so that peers running other
//! implementations decode them byte for byte.
//!
//! ## Modules
//!
//! - [`proto`]: protobuf wire-format reader and writer
//! - [`messages`]: data point, price and greet messages plus the [`Message`] sum type
//! - [`musig`]: MuSig session messages
//! - [`local`]: in-process transport
//! - [`json`]: JSON translation for downstream consumers
//!
//! ## Topics
//!
//! ```text
//! price/v0                     legacy price (JSON)
//! price/v1                     legacy price
//! data_point/v1                signed data point
//! greet/v1                     peer greeting
//! musig_initialize/v1          MuSig session start
//! musig_commitment/v1          MuSig nonce commitment
//! musig_partial_signature/v1   MuSig partial signature
//! musig_signature/v1           MuSig final signature
//! musig_terminate/v1           MuSig session abort
//! ```

pub mod json;
pub mod local;
pub mod messages;
pub mod musig;
pub mod proto;

use std::collections::BTreeMap;

use async_trait::async_trait;
use ora_types::Address;
use tokio::sync::{broadcast, mpsc};

pub use local::LocalTransport;
pub use messages::{DataPointMessage, GreetMessage, Message, PriceMessage};
pub use musig::{
    MuSigCommitment, MuSigInitialize, MuSigMeta, MuSigPartialSignature, MuSigSignature, MuSigTerminate,
    OptimisticAttestation, TickMeta,
};

pub const TOPIC_PRICE_V0: &str = "price/v0";
pub const TOPIC_PRICE_V1: &str = "price/v1";
pub const TOPIC_DATA_POINT_V1: &str = "data_point/v1";
pub const TOPIC_GREET_V1: &str = "greet/v1";
pub const TOPIC_MUSIG_INITIALIZE_V1: &str = "musig_initialize/v1";
pub const TOPIC_MUSIG_COMMITMENT_V1: &str = "musig_commitment/v1";
pub const TOPIC_MUSIG_PARTIAL_SIGNATURE_V1: &str = "musig_partial_signature/v1";
pub const TOPIC_MUSIG_SIGNATURE_V1: &str = "musig_signature/v1";
pub const TOPIC_MUSIG_TERMINATE_V1: &str = "musig_terminate/v1";

/// All registered topics.
pub const ALL_TOPICS: [&str; 9] = [
    TOPIC_PRICE_V0,
    TOPIC_PRICE_V1,
    TOPIC_DATA_POINT_V1,
    TOPIC_GREET_V1,
    TOPIC_MUSIG_INITIALIZE_V1,
    TOPIC_MUSIG_COMMITMENT_V1,
    TOPIC_MUSIG_PARTIAL_SIGNATURE_V1,
    TOPIC_MUSIG_SIGNATURE_V1,
    TOPIC_MUSIG_TERMINATE_V1,
];

/// Error types for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A message could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A payload could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A decoded field has an invalid length or value.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The topic is not registered.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The message kind does not belong to the topic.
    #[error("message {kind} cannot be sent on topic {topic}")]
    TopicMismatch { kind: &'static str, topic: String },

    /// The transport has been shut down.
    #[error("transport is closed")]
    Closed,

    /// The transport was started twice.
    #[error("transport already started")]
    AlreadyStarted,
}

/// Convenience result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Delivery metadata attached to a received message.
///
/// Keys are the ones listed in [`meta_keys`]; transports fill in what
/// they know and leave the rest empty.
pub type ReceivedMeta = BTreeMap<String, String>;

/// Metadata keys a transport may set.
pub mod meta_keys {
    pub const TRANSPORT: &str = "transport";
    pub const TOPIC: &str = "topic";
    pub const MESSAGE_ID: &str = "message_id";
    pub const PEER_ID: &str = "peer_id";
    pub const PEER_ADDR: &str = "peer_addr";
    pub const RECEIVED_FROM_PEER_ID: &str = "received_from_peer_id";
    pub const RECEIVED_FROM_PEER_ADDR: &str = "received_from_peer_addr";
    pub const USER_AGENT: &str = "user_agent";
}

/// A message delivered to a subscriber.
///
/// Delivery failures (for example a payload that does not decode) are
/// reported through `error` with `message` set to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message: Option<Message>,
    pub author: Address,
    pub meta: ReceivedMeta,
    pub error: Option<TransportError>,
}

/// Topic pub/sub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `message` on `topic`. Never blocks on slow subscribers.
    ///
    /// # Errors
    ///
    /// - [`TransportError::UnknownTopic`] or [`TransportError::TopicMismatch`]
    /// - [`TransportError::Closed`] after shutdown
    /// - encoding errors
    async fn broadcast(&self, topic: &str, message: Message) -> Result<()>;

    /// A new single-consumer receiver for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownTopic`] for unregistered topics.
    fn messages(&self, topic: &str) -> Result<mpsc::Receiver<ReceivedMessage>>;

    /// Start the transport; it stops when `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyStarted`] on a second call.
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<()>;

    /// Resolves once the transport has stopped.
    async fn wait(&self);
}

/// Whether `topic` is registered.
pub fn is_known_topic(topic: &str) -> bool {
    ALL_TOPICS.contains(&topic)
}

// ---------------------------------------------------------------------------
// Field validation helpers
// ---------------------------------------------------------------------------

pub(crate) fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| TransportError::InvalidField {
        field,
        reason: format!("expected {N} bytes, got {}", bytes.len()),
    })
}

pub(crate) fn address(field: &'static str, bytes: &[u8]) -> Result<Address> {
    Ok(Address(fixed::<20>(field, bytes)?))
}

pub(crate) fn non_empty(kind: &'static str, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(TransportError::Deserialization(format!("empty {kind} payload")));
    }
    Ok(())
}
