//! The feeder loop.
//!
//! On every tick the feeder evaluates the configured data models, signs
//! each valid point with every signer that supports its value kind and
//! broadcasts the result. A failure for one model or signer is logged and
//! never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use ora_crypto::Signer;
use ora_graph::Provider;
use ora_transport::{DataPointMessage, Message, Transport, TOPIC_DATA_POINT_V1};
use ora_types::Point;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::hooks::Hook;
use crate::Result;

/// Default interval between broadcasts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub struct Feeder {
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
    signers: Vec<Arc<dyn Signer>>,
    hooks: Vec<Arc<dyn Hook>>,
    data_models: Vec<String>,
    interval: Duration,
}

impl Feeder {
    pub fn new(provider: Arc<dyn Provider>, transport: Arc<dyn Transport>, data_models: Vec<String>) -> Self {
        Self {
            provider,
            transport,
            signers: Vec::new(),
            hooks: Vec::new(),
            data_models,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Configured models the provider knows, in configuration order.
    fn models(&self) -> Vec<String> {
        let known = self.provider.model_names();
        self.data_models
            .iter()
            .filter(|m| {
                let found = known.contains(m);
                if !found {
                    warn!(model = %m, advice = "add the model to the graph configuration", "data model is not provided");
                }
                found
            })
            .cloned()
            .collect()
    }

    /// Evaluate, sign and broadcast all models once. Returns the number of
    /// messages broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FeederError::Graph`] if the models cannot be
    /// evaluated. Per-model and per-signer failures are logged instead.
    pub async fn broadcast(&self) -> Result<usize> {
        let models = self.models();
        if models.is_empty() {
            return Ok(0);
        }
        let points = self.provider.data_points(&models).await?;

        let mut sent = 0;
        for (model, point) in points {
            if let Err(e) = point.validate() {
                warn!(model = %model, error = %e, advice = "check the origins of this model", "skipping invalid data point");
                continue;
            }

            let signers: Vec<&Arc<dyn Signer>> = self.signers.iter().filter(|s| s.supports(&point)).collect();
            if signers.is_empty() {
                warn!(
                    model = %model,
                    kind = point.value.as_ref().map_or("none", |v| v.kind()),
                    "no signer supports the data point value"
                );
                continue;
            }

            for signer in signers {
                match self.sign_and_broadcast(&model, point.clone(), signer.as_ref()).await {
                    Ok(()) => sent += 1,
                    Err(e) => error!(model = %model, signer = %signer.address(), error = %e, "failed to broadcast data point"),
                }
            }
        }
        Ok(sent)
    }

    async fn sign_and_broadcast(&self, model: &str, mut point: Point, signer: &dyn Signer) -> Result<()> {
        for hook in &self.hooks {
            hook.before_sign(model, &mut point)?;
        }
        let signature = signer.sign(model, &point)?;
        for hook in &self.hooks {
            hook.before_broadcast(model, &mut point)?;
        }
        let message = Message::DataPoint(DataPointMessage {
            model: model.to_string(),
            point: point.without_sub_points(),
            signature,
        });
        self.transport.broadcast(TOPIC_DATA_POINT_V1, message).await?;
        debug!(model, signer = %signer.address(), "data point broadcast");
        Ok(())
    }

    /// Broadcast on every interval tick until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(models = self.data_models.len(), interval_secs = self.interval.as_secs(), "feeder started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.broadcast().await {
                        Ok(sent) => debug!(sent, "feeder tick done"),
                        Err(e) => error!(error = %e, "feeder tick failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("feeder stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ora_crypto::{PrivateKey, Recoverer, TickRecoverer, TickSigner};
    use ora_graph::builder::{build_provider, ModelConfig, NodeConfig, OriginConfig, OriginKind};
    use ora_transport::LocalTransport;
    use ora_types::Address;

    use super::*;
    use crate::hooks::{PrecisionClamp, TraceHook};

    fn origin(name: &str) -> NodeConfig {
        NodeConfig::Origin {
            origin: name.to_string(),
            pair: "BTC/USD".parse().expect("pair"),
            freshness_secs: 60,
            expiry_secs: 120,
        }
    }

    fn static_origin(name: &str, price: &str) -> OriginConfig {
        let mut prices = BTreeMap::new();
        prices.insert("BTC/USD".parse().expect("pair"), price.parse().expect("decimal"));
        OriginConfig {
            name: name.to_string(),
            kind: OriginKind::Static { prices },
        }
    }

    fn provider() -> Arc<dyn Provider> {
        let models = vec![
            ModelConfig {
                name: "BTC/USD".to_string(),
                node: NodeConfig::Median {
                    pair: "BTC/USD".parse().expect("pair"),
                    min: 2,
                    sources: vec![origin("a"), origin("b"), origin("c")],
                },
            },
            ModelConfig {
                name: "BTC/USD-strict".to_string(),
                node: NodeConfig::Median {
                    pair: "BTC/USD".parse().expect("pair"),
                    min: 4,
                    sources: vec![origin("a"), origin("b"), origin("c")],
                },
            },
        ];
        let origins = vec![
            static_origin("a", "100.123456789"),
            static_origin("b", "101"),
            static_origin("c", "102"),
        ];
        Arc::new(build_provider(&models, &origins, None).expect("provider"))
    }

    #[tokio::test]
    async fn test_broadcasts_signed_points() {
        let transport = LocalTransport::new(Address::ZERO, 16);
        let mut rx = transport.messages(TOPIC_DATA_POINT_V1).expect("subscribe");
        let signer = TickSigner::new(PrivateKey::generate());
        let address = signer.address();

        let feeder = Feeder::new(
            provider(),
            Arc::new(transport.clone()),
            vec!["BTC/USD".to_string(), "BTC/USD-strict".to_string(), "XRP/USD".to_string()],
        )
        .with_signer(Arc::new(signer))
        .with_hook(Arc::new(PrecisionClamp::new(2, 2)))
        .with_hook(Arc::new(TraceHook));

        assert_eq!(feeder.broadcast().await.expect("tick"), 1);

        let received = rx.recv().await.expect("message");
        let dp = match received.message {
            Some(Message::DataPoint(dp)) => Some(dp),
            _ => None,
        }
        .expect("data point");
        assert_eq!(dp.model, "BTC/USD");
        assert!(dp.point.sub_points.is_empty());
        assert_eq!(dp.point.tick().map(|t| t.price.to_string()), Some("101".to_string()));
        let trace = dp.point.meta.get("trace").expect("trace");
        assert_eq!(trace["BTC/USD@a"], "100.12");
        assert_eq!(
            TickRecoverer.recover(&dp.model, &dp.point, &dp.signature).expect("recover"),
            address
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_every_supporting_signer_broadcasts() {
        let transport = LocalTransport::new(Address::ZERO, 16);
        let feeder = Feeder::new(provider(), Arc::new(transport), vec!["BTC/USD".to_string()])
            .with_signer(Arc::new(TickSigner::new(PrivateKey::generate())))
            .with_signer(Arc::new(TickSigner::new(PrivateKey::generate())));
        assert_eq!(feeder.broadcast().await.expect("tick"), 2);
    }

    #[tokio::test]
    async fn test_no_signer() {
        let transport = LocalTransport::new(Address::ZERO, 16);
        let feeder = Feeder::new(provider(), Arc::new(transport), vec!["BTC/USD".to_string()]);
        assert_eq!(feeder.broadcast().await.expect("tick"), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let transport = LocalTransport::new(Address::ZERO, 16);
        let feeder = Feeder::new(provider(), Arc::new(transport), vec!["BTC/USD".to_string()])
            .with_interval(Duration::from_millis(10));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { feeder.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).expect("shutdown");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stopped")
            .expect("join");
    }
}
