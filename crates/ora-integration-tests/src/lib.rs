//! Integration test fixtures for the ora workspace.
//!
//! The tests under `tests/` exercise flows across several crates: price
//! graphs fed by origins, the feeder broadcasting over the local transport
//! into the stores, and relay workers deciding whether to update a contract.
//! Contracts are replaced by the recording mocks in this crate.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p ora-integration-tests
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ora_contract::{Feeds, MedianApi, MedianVal, OpScribeApi, PokeData, SchnorrData, ScribeApi};
use ora_decimal::{DecFixedPoint, DecFloatPoint};
use ora_graph::builder::{build_models, ModelConfig};
use ora_graph::origin::StaticOrigin;
use ora_graph::{GraphError, GraphProvider, Origin, Updater};
use ora_types::{Address, Pair, Point, Signature, TxHash};

/// Data model used throughout the tests.
pub const BTC_USD: &str = "BTC/USD";

/// Transaction hash returned by [`MockMedian::poke`].
pub const MEDIAN_TX: TxHash = [0xaa; 32];
/// Transaction hash returned by [`MockScribe`] pokes.
pub const SCRIBE_TX: TxHash = [0xbb; 32];

pub fn pair(s: &str) -> Pair {
    s.parse().expect("pair")
}

pub fn address(last: u8) -> Address {
    let mut a = [0u8; 20];
    a[19] = last;
    Address(a)
}

// ---------------------------------------------------------------------------
// Price graphs
// ---------------------------------------------------------------------------

/// An origin whose queries always fail.
pub struct FailingOrigin {
    name: String,
}

impl FailingOrigin {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl Origin for FailingOrigin {
    async fn fetch_data_points(&self, _pairs: &[Pair]) -> ora_graph::Result<HashMap<Pair, Point>> {
        Err(GraphError::Origin {
            origin: self.name.clone(),
            message: "connection refused".to_string(),
        })
    }
}

/// A provider with model `BTC/USD` referencing a BTC/USD median over one
/// origin per entry of `prices`. `None` entries are failing origins.
pub fn median_provider(prices: &[Option<&str>], min: usize) -> GraphProvider {
    let mut origins: HashMap<String, Arc<dyn Origin>> = HashMap::new();
    let mut sources = Vec::new();
    for (i, price) in prices.iter().enumerate() {
        let name = format!("origin{i}");
        let origin: Arc<dyn Origin> = match price {
            Some(price) => Arc::new(StaticOrigin::new(
                name.as_str(),
                HashMap::from([(pair(BTC_USD), price.parse::<DecFloatPoint>().expect("decimal"))]),
            )),
            None => Arc::new(FailingOrigin::new(&name)),
        };
        origins.insert(name.clone(), origin);
        sources.push(serde_json::json!({ "type": "origin", "origin": name, "pair": BTC_USD }));
    }

    let models: Vec<ModelConfig> = serde_json::from_value(serde_json::json!([
        { "name": "BTC/USD-median", "type": "median", "pair": BTC_USD, "min": min, "sources": sources },
        { "name": BTC_USD, "type": "reference", "model": "BTC/USD-median" },
    ]))
    .expect("model config");
    let roots: BTreeMap<_, _> = build_models(&models).expect("models");
    GraphProvider::new(roots, Some(Updater::new(origins).with_timeout(Duration::from_secs(1))))
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Median contract holding one price and recording every poke.
pub struct MockMedian {
    pub val: DecFixedPoint,
    pub age: DateTime<Utc>,
    pub bar: u8,
    pokes: Mutex<Vec<Vec<MedianVal>>>,
}

impl MockMedian {
    pub fn new(val: &str, age: DateTime<Utc>, bar: u8) -> Self {
        Self {
            val: val.parse().expect("decimal"),
            age,
            bar,
            pokes: Mutex::new(Vec::new()),
        }
    }

    pub fn pokes(&self) -> Vec<Vec<MedianVal>> {
        self.pokes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MedianApi for MockMedian {
    fn address(&self) -> Address {
        Address([0x11; 20])
    }

    async fn val(&self) -> ora_contract::Result<DecFixedPoint> {
        Ok(self.val.clone())
    }

    async fn age(&self) -> ora_contract::Result<DateTime<Utc>> {
        Ok(self.age)
    }

    async fn wat(&self) -> ora_contract::Result<String> {
        Ok(BTC_USD.to_string())
    }

    async fn bar(&self) -> ora_contract::Result<u8> {
        Ok(self.bar)
    }

    async fn poke(&self, vals: &[MedianVal]) -> ora_contract::Result<TxHash> {
        self.pokes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(vals.to_vec());
        Ok(MEDIAN_TX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScribeCall {
    Poke(PokeData, SchnorrData),
    OpPoke(PokeData, SchnorrData, Signature),
}

/// Scribe and OpScribe contract recording every poke.
pub struct MockScribe {
    pub bar: u8,
    pub feeds: Feeds,
    pub poke_data: PokeData,
    calls: Mutex<Vec<ScribeCall>>,
}

impl MockScribe {
    pub fn new(val: &str, age: DateTime<Utc>, bar: u8, feeds: Feeds) -> Self {
        Self {
            bar,
            feeds,
            poke_data: PokeData {
                val: val.parse().expect("decimal"),
                age,
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ScribeCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, call: ScribeCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

#[async_trait]
impl ScribeApi for MockScribe {
    fn address(&self) -> Address {
        Address([0x22; 20])
    }

    async fn wat(&self) -> ora_contract::Result<String> {
        Ok(BTC_USD.to_string())
    }

    async fn bar(&self) -> ora_contract::Result<u8> {
        Ok(self.bar)
    }

    async fn feeds(&self) -> ora_contract::Result<Feeds> {
        Ok(self.feeds.clone())
    }

    async fn read_poke_data(&self) -> ora_contract::Result<PokeData> {
        Ok(self.poke_data.clone())
    }

    async fn poke(&self, poke: &PokeData, schnorr: &SchnorrData) -> ora_contract::Result<TxHash> {
        self.record(ScribeCall::Poke(poke.clone(), schnorr.clone()));
        Ok(SCRIBE_TX)
    }
}

#[async_trait]
impl OpScribeApi for MockScribe {
    async fn op_poke(&self, poke: &PokeData, schnorr: &SchnorrData, ecdsa: &Signature) -> ora_contract::Result<TxHash> {
        self.record(ScribeCall::OpPoke(poke.clone(), schnorr.clone(), *ecdsa));
        Ok([0xcc; 32])
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
