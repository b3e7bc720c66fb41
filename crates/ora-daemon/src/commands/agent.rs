//! `ora agent`: run the configured services until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ora_contract::{Median, OpScribe, RpcClient, Scribe};
use ora_crypto::{Recoverer, Signer, TickRecoverer, TickSigner};
use ora_feeder::{Feeder, PrecisionClamp, TraceHook};
use ora_relay::relay::Relay;
use ora_relay::{MedianWorker, OpScribeWorker, ScribeWorker, WorkerConfig};
use ora_store::{DataPointStore, MuSigStore};
use ora_transport::local::LocalTransport;
use ora_transport::Transport;
use ora_types::Address;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "ora agent starting");

    let key = config.ethereum.key()?;
    let client = super::rpc_client(&config)?;
    let author = key.as_ref().map_or(Address::ZERO, |k| k.address());

    let (shutdown_tx, _) = broadcast::channel(1);
    let transport = Arc::new(LocalTransport::new(author, config.transport.queue_size));
    transport.start(shutdown_tx.subscribe()).await?;

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Stores
    let store_models = config.store_models();
    let recoverers: Vec<Arc<dyn Recoverer>> = vec![Arc::new(TickRecoverer)];
    let mut points = DataPointStore::new(store_models.clone(), recoverers);
    if !config.store.feeds.is_empty() {
        points = points.with_feeds(config.store.feeds.iter().copied());
    }
    let points = Arc::new(points);
    let signatures = Arc::new(MuSigStore::new(store_models));
    tasks.push(ora_store::spawn(Arc::clone(&points), transport.as_ref(), shutdown_tx.subscribe())?);
    tasks.push(ora_store::spawn(Arc::clone(&signatures), transport.as_ref(), shutdown_tx.subscribe())?);

    // Feeder
    if config.feeder.enabled {
        let Some(key) = key else {
            anyhow::bail!("the feeder needs ethereum.private_key or ORA_PRIVATE_KEY");
        };
        let provider = Arc::new(super::provider(&config, client.clone())?);
        let signer: Arc<dyn Signer> = Arc::new(TickSigner::new(key));
        info!(feed = %signer.address(), models = ?config.feeder.data_models, "feeder enabled");
        let feeder = Feeder::new(provider, transport.clone(), config.feeder.data_models.clone())
            .with_signer(signer)
            .with_hook(Arc::new(PrecisionClamp::new(
                config.feeder.max_price_prec,
                config.feeder.max_volume_prec,
            )))
            .with_hook(Arc::new(TraceHook))
            .with_interval(Duration::from_secs(config.feeder.interval_secs));
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { feeder.run(shutdown).await }));
    }

    // Relays
    if !config.relay.is_empty() {
        let client = client.context("relays need ethereum.rpc_url")?;
        let relay = relay(&config, client, &points, &signatures)?;
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { relay.run(shutdown).await }));
    }

    if tasks.len() == 2 {
        warn!(advice = "enable the feeder or configure a relay", "only the stores are running");
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    // Receivers may all be gone already.
    let _ = shutdown_tx.send(());

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "task failed during shutdown");
        }
    }
    transport.wait().await;
    info!("ora agent stopped");
    Ok(())
}

fn relay(
    config: &Config,
    client: Arc<dyn RpcClient>,
    points: &Arc<DataPointStore>,
    signatures: &Arc<MuSigStore>,
) -> anyhow::Result<Relay> {
    let mut relay = Relay::new(Duration::from_secs(config.relay.interval_secs));
    for m in &config.relay.median {
        let worker_config = WorkerConfig::new(&m.data_model, m.spread, Duration::from_secs(m.expiration_secs))?;
        let contract = Arc::new(Median::new(Arc::clone(&client), m.contract));
        relay = relay.with_worker(Arc::new(MedianWorker::new(
            worker_config,
            m.feeds.clone(),
            contract,
            Arc::clone(points),
        )));
    }
    for s in &config.relay.scribe {
        let worker_config = WorkerConfig::new(&s.data_model, s.spread, Duration::from_secs(s.expiration_secs))?;
        let contract = Arc::new(Scribe::new(Arc::clone(&client), s.contract));
        relay = relay.with_worker(Arc::new(ScribeWorker::new(worker_config, contract, Arc::clone(signatures))));
    }
    for s in &config.relay.opscribe {
        let worker_config = WorkerConfig::new(&s.data_model, s.spread, Duration::from_secs(s.expiration_secs))?;
        let contract = Arc::new(OpScribe::new(Arc::clone(&client), s.contract));
        relay = relay.with_worker(Arc::new(OpScribeWorker::new(worker_config, contract, Arc::clone(signatures))));
    }
    for worker in relay.workers() {
        info!(worker = %worker.name(), "relay worker configured");
    }
    Ok(relay)
}
