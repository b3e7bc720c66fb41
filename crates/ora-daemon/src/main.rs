//! ora: the oracle agent.
//!
//! One process runs any combination of the feeder (evaluates price models
//! and broadcasts signed data points), the message stores, and the relay
//! workers that keep Median, Scribe and OpScribe contracts up to date.
//!
//! ## Commands
//!
//! - `agent`: run the configured services until Ctrl-C (the default)
//! - `price`: evaluate models once and print the data points as JSON
//! - `models`: print the model graphs as JSON

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "ora", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "ORA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding `log.level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the feeder, stores and relays.
    Agent,
    /// Evaluate models and print their data points.
    Price {
        /// Models to evaluate. All models if empty.
        models: Vec<String>,
    },
    /// Print model graphs.
    Models {
        models: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(config.log.level.as_str());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("ora={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Agent) {
        Command::Agent => commands::agent::run(config).await,
        Command::Price { models } => commands::price::run(&config, &models).await,
        Command::Models { models } => commands::models::run(&config, &models),
    }
}
