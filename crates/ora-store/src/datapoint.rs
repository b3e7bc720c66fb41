//! Latest signed data point per (data model, feed).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use ora_crypto::Recoverer;
use ora_transport::{Message, ReceivedMessage, TOPIC_DATA_POINT_V1};
use ora_types::{Address, Point, Signature};

use crate::{MessageHandler, Result, StoreError};

/// A data point as received from a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDataPoint {
    pub model: String,
    /// Feed address recovered from `signature`.
    pub from: Address,
    pub point: Point,
    pub signature: Signature,
}

/// Data points received on `data_point/v1`.
pub struct DataPointStore {
    models: HashSet<String>,
    feeds: Option<HashSet<Address>>,
    recoverers: Vec<Arc<dyn Recoverer>>,
    points: Mutex<HashMap<(String, Address), StoredDataPoint>>,
}

impl DataPointStore {
    /// A store accepting points for `models`, recovering feed addresses with
    /// the first recoverer that supports a point.
    pub fn new(models: impl IntoIterator<Item = String>, recoverers: Vec<Arc<dyn Recoverer>>) -> Self {
        Self {
            models: models.into_iter().collect(),
            feeds: None,
            recoverers,
            points: Mutex::new(HashMap::new()),
        }
    }

    /// Only accept points signed by `feeds`.
    pub fn with_feeds(mut self, feeds: impl IntoIterator<Item = Address>) -> Self {
        self.feeds = Some(feeds.into_iter().collect());
        self
    }

    /// Insert `entry` unless the stored point for the same model and feed is
    /// strictly newer. A point with an equal time replaces the stored one.
    pub fn insert(&self, entry: StoredDataPoint) -> bool {
        let mut points = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (entry.model.clone(), entry.from);
        if let Some(held) = points.get(&key) {
            if held.point.time > entry.point.time {
                return false;
            }
        }
        points.insert(key, entry);
        true
    }

    /// Latest point of `model` signed by `from`.
    pub fn latest_from(&self, from: &Address, model: &str) -> Option<StoredDataPoint> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(model.to_string(), *from))
            .cloned()
    }

    /// Latest point of `model` from every feed.
    pub fn latest(&self, model: &str) -> HashMap<Address, StoredDataPoint> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((m, _), _)| m == model)
            .map(|((_, from), entry)| (*from, entry.clone()))
            .collect()
    }

    fn recover(&self, model: &str, point: &Point, signature: &Signature) -> Result<Address> {
        let recoverer = self
            .recoverers
            .iter()
            .find(|r| r.supports(point))
            .ok_or_else(|| {
                StoreError::InvalidMessage(format!(
                    "no recoverer for value kind {}",
                    point.value.as_ref().map_or("none", |v| v.kind())
                ))
            })?;
        Ok(recoverer.recover(model, point, signature)?)
    }
}

impl MessageHandler for DataPointStore {
    const TOPIC: &'static str = TOPIC_DATA_POINT_V1;
    const NAME: &'static str = "data_point";

    fn handle(&self, msg: &ReceivedMessage) -> Result<bool> {
        if let Some(err) = &msg.error {
            return Err(err.clone().into());
        }
        let Some(Message::DataPoint(dp)) = &msg.message else {
            return Err(StoreError::UnexpectedMessage(
                msg.message.as_ref().map_or("none", Message::kind),
            ));
        };
        if !self.models.contains(&dp.model) {
            return Err(StoreError::ModelNotAllowed(dp.model.clone()));
        }
        dp.point
            .validate()
            .map_err(|e| StoreError::InvalidMessage(e.to_string()))?;

        let from = self.recover(&dp.model, &dp.point, &dp.signature)?;
        if let Some(feeds) = &self.feeds {
            if !feeds.contains(&from) {
                return Err(StoreError::FeedNotAllowed(from));
            }
        }

        Ok(self.insert(StoredDataPoint {
            model: dp.model.clone(),
            from,
            point: dp.point.clone(),
            signature: dp.signature,
        }))
    }
}
