//! Observed HTTP client.
//!
//! Sends one request to the configured target inside an observation and
//! reports it to the configured backends.
//!
//! # Architecture Overview
//!
//! ```text
//!   main ──▶ config (TOML + CLI overrides) ──▶ logging
//!     │
//!     ▼
//!   lifecycle::bootstrap
//!     ├─ metrics handler ──▶ Prometheus endpoint
//!     ├─ tracing handler ──▶ log / OTLP exporter
//!     └─ observed client
//!           │
//!           ▼
//!   "my.observation" ──▶ "http.client.requests" ──▶ target server
//!                                (traceparent)
//! ```

use std::path::PathBuf;

use clap::Parser;

use observed_client::config::{self, AppConfig};
use observed_client::lifecycle::{bootstrap, shutdown_signal};
use observed_client::observability::init_logging;

#[derive(Debug, Parser)]
#[command(name = "observed-client")]
#[command(about = "Sends an observed HTTP request and reports metrics and traces", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the target URL
    #[arg(short, long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(url) = cli.url {
        config = config.with_target_url(url)?;
    }

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        target_url = %config.client.target_url,
        exporter = ?config.tracing.exporter,
        "observed-client starting"
    );

    let app = bootstrap(config)?;

    let outcome = tokio::select! {
        result = app.run_once() => Some(result),
        _ = shutdown_signal() => None,
    };

    let result: Result<(), Box<dyn std::error::Error>> = match outcome {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Request failed");
            Err(e.into())
        }
        None => {
            tracing::warn!("Interrupted before the request completed");
            Ok(())
        }
    };

    app.shutdown().await;
    result
}
