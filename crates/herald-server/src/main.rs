//! # Herald Server
//!
//! Realtime broadcaster for service events.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! herald
//!
//! # Config file is read from ./herald.toml, /etc/herald/herald.toml
//! # or ~/.config/herald/herald.toml
//!
//! # Run with a single config file, no other sources
//! herald --config /path/to/herald.toml
//!
//! # Run with environment overrides
//! HERALD__PORT=8080 HERALD__HOST=0.0.0.0 herald
//! ```

mod channels;
mod config;
mod handlers;
mod metrics;
mod service;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Herald event broadcaster.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about = "Realtime service-event broadcaster")]
struct Cli {
    /// Read configuration from this TOML file only.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Herald server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
