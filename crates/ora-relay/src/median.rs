//! Median worker.
//!
//! The Median contract accepts a batch of `bar` ECDSA-signed prices sorted
//! ascending and stores their median. The worker gathers the batch from the
//! data point store, picking feeds in random order so no feed is favored.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ora_contract::{MedianApi, MedianVal};
use ora_decimal::DecFloatPoint;
use ora_store::DataPointStore;
use ora_types::{Address, TxHash};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::relay::Worker;
use crate::spread::spread;
use crate::{read, RelayError, Result, WorkerConfig};

pub struct MedianWorker {
    config: WorkerConfig,
    feeds: Vec<Address>,
    contract: Arc<dyn MedianApi>,
    store: Arc<DataPointStore>,
}

impl MedianWorker {
    pub fn new(config: WorkerConfig, feeds: Vec<Address>, contract: Arc<dyn MedianApi>, store: Arc<DataPointStore>) -> Self {
        Self {
            config,
            feeds,
            contract,
            store,
        }
    }

    /// Up to `bar` signed prices newer than `age`, one per feed.
    fn collect(&self, bar: usize, age: DateTime<Utc>) -> Vec<MedianVal> {
        let mut feeds = self.feeds.clone();
        feeds.shuffle(&mut OsRng);

        let mut vals = Vec::with_capacity(bar);
        for feed in feeds {
            if vals.len() >= bar {
                break;
            }
            let Some(stored) = self.store.latest_from(&feed, &self.config.data_model) else {
                continue;
            };
            if stored.point.time < age || !stored.signature.is_complete() {
                continue;
            }
            let Some(tick) = stored.point.tick() else {
                continue;
            };
            vals.push(MedianVal {
                val: tick.price.clone(),
                age: stored.point.time,
                signature: stored.signature,
            });
        }
        vals
    }
}

/// Median of `vals`, which must be sorted ascending.
fn median(vals: &[MedianVal]) -> Option<DecFloatPoint> {
    let n = vals.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        return Some(vals[n / 2].val.clone());
    }
    (&vals[n / 2 - 1].val + &vals[n / 2].val).checked_div(&DecFloatPoint::from_int(2))
}

#[async_trait]
impl Worker for MedianWorker {
    fn name(&self) -> String {
        format!("median:{}", self.config.data_model)
    }

    async fn update(&self, now: DateTime<Utc>) -> Result<Option<TxHash>> {
        let val = DecFloatPoint::from_fixed(&self.contract.val().await.map_err(read("val"))?);
        let age = self.contract.age().await.map_err(read("age"))?;
        let bar = usize::from(self.contract.bar().await.map_err(read("bar"))?);

        let mut vals = self.collect(bar, age);
        if vals.len() < bar || vals.is_empty() {
            warn!(
                worker = %self.name(),
                got = vals.len(),
                bar,
                advice = "check that enough feeds broadcast this data model",
                "not enough signed prices"
            );
            return Ok(None);
        }
        vals.sort_by(|a, b| a.val.cmp(&b.val));

        let Some(median) = median(&vals) else {
            return Ok(None);
        };
        let spread = spread(&median, &val);
        let (expired, stale) = self.config.needs_update(spread, age, now);
        debug!(worker = %self.name(), %median, current = %val, spread, expired, stale, "median state");
        if !expired && !stale {
            return Ok(None);
        }

        self.contract.poke(&vals).await.map(Some).map_err(RelayError::Write)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use ora_crypto::{PrivateKey, Signer, TickRecoverer, TickSigner};
    use ora_store::StoredDataPoint;
    use ora_types::{Point, Signature, Tick};

    use super::*;
    use crate::testing::{revert_error, underpriced_error, MockMedian};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("time")
    }

    fn store_with(prices: &[(&str, i64)]) -> (Arc<DataPointStore>, Vec<Address>) {
        let store = Arc::new(DataPointStore::new(vec!["BTC/USD".to_string()], vec![Arc::new(TickRecoverer)]));
        let mut feeds = Vec::new();
        for (price, secs) in prices {
            let signer = TickSigner::new(PrivateKey::generate());
            let point = Point::new(
                Tick::new("BTC/USD".parse().expect("pair"), price.parse().expect("decimal")),
                at(*secs),
            );
            let signature = signer.sign("BTC/USD", &point).expect("sign");
            store.insert(StoredDataPoint {
                model: "BTC/USD".to_string(),
                from: signer.address(),
                point,
                signature,
            });
            feeds.push(signer.address());
        }
        (store, feeds)
    }

    fn worker(contract: Arc<MockMedian>, store: Arc<DataPointStore>, feeds: Vec<Address>) -> MedianWorker {
        let config = WorkerConfig::new("BTC/USD", 1.0, Duration::from_secs(3600)).expect("config");
        MedianWorker::new(config, feeds, contract, store)
    }

    #[tokio::test]
    async fn test_pokes_sorted_batch_when_stale() {
        let (store, feeds) = store_with(&[("103", 2_000), ("101", 2_000), ("102", 2_000)]);
        let contract = Arc::new(MockMedian::new("100", at(1_900), 3));
        let worker = worker(contract.clone(), store, feeds);

        assert_eq!(worker.update(at(2_010)).await.expect("update"), Some([0xaa; 32]));
        let pokes = contract.pokes();
        assert_eq!(pokes.len(), 1);
        let prices: Vec<String> = pokes[0].iter().map(|v| v.val.to_string()).collect();
        assert_eq!(prices, vec!["101", "102", "103"]);
    }

    #[tokio::test]
    async fn test_no_poke_within_spread() {
        let (store, feeds) = store_with(&[("100.1", 2_000), ("100.2", 2_000), ("100.3", 2_000)]);
        let contract = Arc::new(MockMedian::new("100", at(1_900), 3));
        let worker = worker(contract.clone(), store, feeds);

        assert_eq!(worker.update(at(2_010)).await.expect("update"), None);
        assert!(contract.pokes().is_empty());
    }

    #[tokio::test]
    async fn test_expired_price_is_poked() {
        let (store, feeds) = store_with(&[("100", 9_000)]);
        let contract = Arc::new(MockMedian::new("100", at(1_000), 1));
        let worker = worker(contract.clone(), store, feeds);

        assert!(worker.update(at(9_010)).await.expect("update").is_some());
    }

    #[tokio::test]
    async fn test_zero_on_chain_price_is_always_stale() {
        let (store, feeds) = store_with(&[("100", 2_000)]);
        let contract = Arc::new(MockMedian::new("0", at(1_999), 1));
        let worker = worker(contract.clone(), store, feeds);

        assert!(worker.update(at(2_000)).await.expect("update").is_some());
    }

    #[tokio::test]
    async fn test_older_points_and_missing_quorum() {
        let (store, feeds) = store_with(&[("110", 2_000), ("111", 1_000), ("112", 2_000)]);
        let contract = Arc::new(MockMedian::new("100", at(1_500), 3));
        let worker = worker(contract.clone(), store, feeds);

        assert_eq!(worker.update(at(2_010)).await.expect("update"), None);
        assert!(contract.pokes().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_signature_is_skipped() {
        let (store, mut feeds) = store_with(&[("110", 2_000)]);
        let unsigned = Address([7u8; 20]);
        store.insert(StoredDataPoint {
            model: "BTC/USD".to_string(),
            from: unsigned,
            point: Point::new(Tick::new("BTC/USD".parse().expect("pair"), "1".parse().expect("decimal")), at(2_000)),
            signature: Signature::default(),
        });
        feeds.push(unsigned);
        let contract = Arc::new(MockMedian::new("100", at(1_500), 2));
        let worker = worker(contract.clone(), store, feeds);

        assert_eq!(worker.update(at(2_010)).await.expect("update"), None);
    }

    #[tokio::test]
    async fn test_read_and_write_errors() {
        let (store, feeds) = store_with(&[("110", 2_000)]);
        let mut mock = MockMedian::new("100", at(1_500), 1);
        mock.fail_reads = true;
        let w = worker(Arc::new(mock), store.clone(), feeds.clone());
        assert!(matches!(w.update(at(2_010)).await, Err(RelayError::Read { what: "val", .. })));
        assert_eq!(w.tick().await, None);

        let mut mock = MockMedian::new("100", at(1_500), 1);
        mock.poke_error = Some(revert_error());
        let w = worker(Arc::new(mock), store.clone(), feeds.clone());
        assert!(matches!(w.update(at(2_010)).await, Err(RelayError::Write(e)) if e.revert().is_some()));

        let mut mock = MockMedian::new("100", at(1_500), 1);
        mock.poke_error = Some(underpriced_error());
        let contract = Arc::new(mock);
        let w = worker(contract.clone(), store, feeds);
        assert!(matches!(w.update(at(2_010)).await, Err(RelayError::Write(e)) if e.is_replacement_underpriced()));
        assert_eq!(contract.pokes().len(), 1, "at most one transaction per tick");
    }

    #[test]
    fn test_median_of_even_batch() {
        let sig = Signature::default();
        let vals: Vec<MedianVal> = ["1", "2", "3", "4"]
            .iter()
            .map(|p| MedianVal {
                val: p.parse().expect("decimal"),
                age: at(0),
                signature: sig,
            })
            .collect();
        assert_eq!(median(&vals).map(|m| m.to_string()), Some("2.5".to_string()));
        assert_eq!(median(&vals[..3]).map(|m| m.to_string()), Some("2".to_string()));
        assert_eq!(median(&[]), None);
    }
}
