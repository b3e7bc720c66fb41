//! Price sources.
//!
//! An [`Origin`] answers a batch query for several pairs at once. Failures
//! that affect a single pair are reported as an errored [`Point`] for that
//! pair; an `Err` means the whole query failed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ora_contract::pot::RAY_DECIMALS;
use ora_contract::{Pot, RpcClient};
use ora_decimal::DecFloatPoint;
use ora_types::{Address, Pair, Point, PointError, Tick};
use tracing::debug;

use crate::Result;

#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch the current point for each of `pairs`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GraphError::Origin`] if the origin could not be
    /// queried at all.
    async fn fetch_data_points(&self, pairs: &[Pair]) -> Result<HashMap<Pair, Point>>;
}

fn unsupported(origin: &str, pair: &Pair) -> Point {
    Point::errored(PointError::Origin {
        origin: origin.to_string(),
        message: format!("pair {pair} is not supported"),
    })
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// Constant prices, stamped with the query time.
#[derive(Debug, Clone, Default)]
pub struct StaticOrigin {
    name: String,
    prices: HashMap<Pair, DecFloatPoint>,
}

impl StaticOrigin {
    pub fn new(name: impl Into<String>, prices: HashMap<Pair, DecFloatPoint>) -> Self {
        Self {
            name: name.into(),
            prices,
        }
    }
}

#[async_trait]
impl Origin for StaticOrigin {
    async fn fetch_data_points(&self, pairs: &[Pair]) -> Result<HashMap<Pair, Point>> {
        let now = Utc::now();
        Ok(pairs
            .iter()
            .map(|pair| {
                let point = match self.prices.get(pair) {
                    Some(price) => Point::new(Tick::new(pair.clone(), price.clone()), now),
                    None => unsupported(&self.name, pair),
                };
                (pair.clone(), point)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// DSR
// ---------------------------------------------------------------------------

/// DAI Savings Rate read from one or more Pot contracts per pair.
///
/// The per-second rate is a ray; values from several contracts are
/// averaged.
pub struct DsrOrigin {
    name: String,
    client: Arc<dyn RpcClient>,
    contracts: HashMap<Pair, Vec<Address>>,
}

impl DsrOrigin {
    pub fn new(name: impl Into<String>, client: Arc<dyn RpcClient>, contracts: HashMap<Pair, Vec<Address>>) -> Self {
        Self {
            name: name.into(),
            client,
            contracts,
        }
    }

    async fn fetch_pair(&self, pair: &Pair, addresses: &[Address]) -> Point {
        if addresses.is_empty() {
            return unsupported(&self.name, pair);
        }
        let mut sum = DecFloatPoint::zero();
        for address in addresses {
            let rate = match Pot::new(Arc::clone(&self.client), *address).dsr().await {
                Ok(rate) => rate,
                Err(e) => {
                    return Point::errored(PointError::Origin {
                        origin: self.name.clone(),
                        message: e.to_string(),
                    })
                }
            };
            if rate.prec() != RAY_DECIMALS {
                return Point::errored(PointError::Origin {
                    origin: self.name.clone(),
                    message: format!("dsr precision {} is not a ray", rate.prec()),
                });
            }
            debug!(origin = %self.name, %address, %rate, "dsr");
            sum = sum + DecFloatPoint::from(rate);
        }
        let count = i64::try_from(addresses.len()).unwrap_or(i64::MAX);
        let avg = sum / DecFloatPoint::from_int(count);
        Point::new(Tick::new(pair.clone(), avg), Utc::now())
    }
}

#[async_trait]
impl Origin for DsrOrigin {
    async fn fetch_data_points(&self, pairs: &[Pair]) -> Result<HashMap<Pair, Point>> {
        let mut out = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let point = match self.contracts.get(pair) {
                Some(addresses) => self.fetch_pair(pair, addresses).await,
                None => unsupported(&self.name, pair),
            };
            out.insert(pair.clone(), point);
        }
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use num_bigint::BigUint;
    use ora_contract::{RpcError, TransactionRequest};
    use ora_types::TxHash;

    use super::*;

    fn pair(s: &str) -> Pair {
        s.parse().expect("pair")
    }

    #[tokio::test]
    async fn test_static_origin() {
        let mut prices = HashMap::new();
        prices.insert(pair("BTC/USD"), "100".parse().expect("decimal"));
        let origin = StaticOrigin::new("static", prices);
        let points = origin
            .fetch_data_points(&[pair("BTC/USD"), pair("ETH/USD")])
            .await
            .expect("fetch");
        assert!(points[&pair("BTC/USD")].is_valid());
        assert!(matches!(points[&pair("ETH/USD")].error, Some(PointError::Origin { .. })));
    }

    /// Answers `eth_call`s with queued rays.
    struct RayRpc(Mutex<Vec<BigUint>>);

    #[async_trait]
    impl RpcClient for RayRpc {
        async fn call(&self, _to: Address, _data: Vec<u8>) -> std::result::Result<Vec<u8>, RpcError> {
            let ray = self.0.lock().expect("lock").remove(0);
            let mut word = [0u8; 32];
            let bytes = ray.to_bytes_be();
            word[32 - bytes.len()..].copy_from_slice(&bytes);
            Ok(word.to_vec())
        }

        async fn storage_at(&self, _address: Address, _slot: [u8; 32]) -> std::result::Result<[u8; 32], RpcError> {
            Err(RpcError::Transport("unused".to_string()))
        }

        async fn send_transaction(&self, _tx: TransactionRequest) -> std::result::Result<TxHash, RpcError> {
            Err(RpcError::Transport("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_dsr_origin_averages_contracts() {
        let rays = vec![
            "1000000000000000000000000002".parse().expect("uint"),
            "1000000000000000000000000004".parse().expect("uint"),
        ];
        let rpc = Arc::new(RayRpc(Mutex::new(rays)));
        let mut contracts = HashMap::new();
        contracts.insert(pair("DSR/RATE"), vec![Address([1; 20]), Address([2; 20])]);
        let origin = DsrOrigin::new("dsr", rpc, contracts);

        let points = origin.fetch_data_points(&[pair("DSR/RATE")]).await.expect("fetch");
        let point = &points[&pair("DSR/RATE")];
        assert!(point.is_valid());
        assert_eq!(
            point.tick().map(|t| t.price.to_string()),
            Some("1.000000000000000000000000003".to_string())
        );
    }

    #[tokio::test]
    async fn test_dsr_origin_rpc_failure() {
        let rpc = Arc::new(RayRpc(Mutex::new(Vec::new())));
        let origin = DsrOrigin::new("dsr", rpc, HashMap::new());
        let points = origin.fetch_data_points(&[pair("DSR/RATE")]).await.expect("fetch");
        assert!(!points[&pair("DSR/RATE")].is_valid());
    }
}
