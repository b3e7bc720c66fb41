//! `ora models`: print the model graphs.

use std::collections::BTreeMap;

use ora_graph::Provider;

use crate::config::Config;

pub fn run(config: &Config, requested: &[String]) -> anyhow::Result<()> {
    // Building the graph does not query origins.
    let provider = super::provider(config, super::rpc_client(config)?)?;
    let mut out = BTreeMap::new();
    for name in super::model_names(&provider, requested) {
        let model = provider.model(&name)?;
        out.insert(name, model);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
