//! Latest MuSig signature per (data model, feed).
//!
//! The data model is the `wat` of the tick meta; the feed is the author of
//! the message as reported by the transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use ora_transport::{Message, MuSigSignature, ReceivedMessage, TOPIC_MUSIG_SIGNATURE_V1};
use ora_types::Address;

use crate::{MessageHandler, Result, StoreError};

/// Aggregated signatures received on `musig_signature/v1`.
pub struct MuSigStore {
    models: HashSet<String>,
    signatures: Mutex<HashMap<(String, Address), MuSigSignature>>,
}

impl MuSigStore {
    pub fn new(models: impl IntoIterator<Item = String>) -> Self {
        Self {
            models: models.into_iter().collect(),
            signatures: Mutex::new(HashMap::new()),
        }
    }

    /// Insert `signature` from `author` unless the held one for the same model
    /// was computed strictly later. An equal `computed_at` replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMessage`] if the signature carries no
    /// tick meta, or [`StoreError::ModelNotAllowed`] for an unknown model.
    pub fn insert(&self, author: Address, signature: MuSigSignature) -> Result<bool> {
        let wat = signature
            .msg_meta
            .tick_v1()
            .map(|t| t.wat.clone())
            .ok_or_else(|| StoreError::InvalidMessage("signature has no tick meta".to_string()))?;
        if !self.models.contains(&wat) {
            return Err(StoreError::ModelNotAllowed(wat));
        }

        let mut signatures = self.signatures.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (wat, author);
        if let Some(held) = signatures.get(&key) {
            if held.computed_at > signature.computed_at {
                return Ok(false);
            }
        }
        signatures.insert(key, signature);
        Ok(true)
    }

    /// Signatures of `model` from every feed, newest first.
    pub fn signatures_by_data_model(&self, model: &str) -> Vec<MuSigSignature> {
        let mut out: Vec<MuSigSignature> = self
            .signatures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((wat, _), _)| wat == model)
            .map(|(_, sig)| sig.clone())
            .collect();
        out.sort_by(|a, b| b.computed_at.cmp(&a.computed_at));
        out
    }
}

impl MessageHandler for MuSigStore {
    const TOPIC: &'static str = TOPIC_MUSIG_SIGNATURE_V1;
    const NAME: &'static str = "musig_signature";

    fn handle(&self, msg: &ReceivedMessage) -> Result<bool> {
        if let Some(err) = &msg.error {
            return Err(err.clone().into());
        }
        match &msg.message {
            Some(Message::MuSigSignature(sig)) => self.insert(msg.author, sig.clone()),
            other => Err(StoreError::UnexpectedMessage(other.as_ref().map_or("none", Message::kind))),
        }
    }
}
