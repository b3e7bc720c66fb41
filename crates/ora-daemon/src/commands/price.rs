//! `ora price`: evaluate models once.

use ora_graph::Provider;

use crate::config::Config;

pub async fn run(config: &Config, requested: &[String]) -> anyhow::Result<()> {
    let client = super::rpc_client(config)?;
    let provider = super::provider(config, client)?;
    let names = super::model_names(&provider, requested);
    let points = provider.data_points(&names).await?;
    println!("{}", serde_json::to_string_pretty(&points)?);
    Ok(())
}
