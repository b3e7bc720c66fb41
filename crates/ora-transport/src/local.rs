//! In-process transport.
//!
//! Handles created with [`LocalTransport::as_peer`] share one bus, so
//! several feeds and relays can run in one process (or one test). Every
//! broadcast is encoded and decoded again through the binary codec, which
//! keeps the local path as strict as the network path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ora_types::Address;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::messages::Message;
use crate::{is_known_topic, meta_keys, ReceivedMessage, ReceivedMeta, Result, Transport, TransportError};

/// Default per-subscriber queue length.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

struct Bus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<ReceivedMessage>>>>,
    queue_size: usize,
    next_id: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    stopped: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct LocalTransport {
    bus: Arc<Bus>,
    author: Address,
}

impl LocalTransport {
    /// A new bus with one handle publishing as `author`.
    pub fn new(author: Address, queue_size: usize) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            bus: Arc::new(Bus {
                subscribers: Mutex::new(HashMap::new()),
                queue_size: queue_size.max(1),
                next_id: AtomicU64::new(1),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                stopped,
            }),
            author,
        }
    }

    /// Another handle on the same bus publishing as `author`.
    pub fn as_peer(&self, author: Address) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            author,
        }
    }

    pub fn author(&self) -> Address {
        self.author
    }

    fn meta(&self, topic: &str, id: u64) -> ReceivedMeta {
        let author = self.author.to_string();
        let mut meta = ReceivedMeta::new();
        meta.insert(meta_keys::TRANSPORT.to_string(), "local".to_string());
        meta.insert(meta_keys::TOPIC.to_string(), topic.to_string());
        meta.insert(meta_keys::MESSAGE_ID.to_string(), format!("{id:016x}"));
        meta.insert(meta_keys::PEER_ID.to_string(), author.clone());
        meta.insert(meta_keys::RECEIVED_FROM_PEER_ID.to_string(), author);
        meta.insert(meta_keys::USER_AGENT.to_string(), concat!("ora/", env!("CARGO_PKG_VERSION")).to_string());
        meta
    }

    fn close(&self) {
        self.bus.closed.store(true, Ordering::SeqCst);
        self.bus
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.bus.stopped.send_replace(true);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn broadcast(&self, topic: &str, message: Message) -> Result<()> {
        if self.bus.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !is_known_topic(topic) {
            return Err(TransportError::UnknownTopic(topic.to_string()));
        }
        if message.topic() != topic {
            return Err(TransportError::TopicMismatch {
                kind: message.kind(),
                topic: topic.to_string(),
            });
        }

        let payload = message.marshal_binary()?;
        let id = self.bus.next_id.fetch_add(1, Ordering::Relaxed);
        let received = match Message::unmarshal_binary(topic, &payload) {
            Ok(message) => ReceivedMessage {
                message: Some(message),
                author: self.author,
                meta: self.meta(topic, id),
                error: None,
            },
            Err(e) => ReceivedMessage {
                message: None,
                author: self.author,
                meta: self.meta(topic, id),
                error: Some(e),
            },
        };

        let mut subscribers = self.bus.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = subscribers.get_mut(topic) {
            senders.retain(|tx| match tx.try_send(received.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic, message_id = id, "subscriber queue full, message dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
        debug!(topic, message_id = id, bytes = payload.len(), "message broadcast");
        Ok(())
    }

    fn messages(&self, topic: &str) -> Result<mpsc::Receiver<ReceivedMessage>> {
        if !is_known_topic(topic) {
            return Err(TransportError::UnknownTopic(topic.to_string()));
        }
        let (tx, rx) = mpsc::channel(self.bus.queue_size);
        if !self.bus.closed.load(Ordering::SeqCst) {
            self.bus
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(topic.to_string())
                .or_default()
                .push(tx);
        }
        Ok(rx)
    }

    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if self.bus.started.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        info!(author = %self.author, "local transport started");
        let this = self.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            this.close();
            info!("local transport stopped");
        });
        Ok(())
    }

    async fn wait(&self) {
        let mut stopped = self.bus.stopped.subscribe();
        let _ = stopped.wait_for(|s| *s).await;
    }
}
