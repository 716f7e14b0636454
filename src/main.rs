//! Demo host for route-labelled HTTP metrics.
//!
//! Serves a handful of axum routes instrumented with the configured labeling
//! strategy and exposes the resulting metrics on a Prometheus scrape
//! endpoint.
//!
//! ```text
//!   Client ──▶ TraceLayer ──▶ MetricsLayer ──▶ route handler
//!                                  │
//!                                  ▼
//!                             MetricsSink ──▶ Prometheus exporter ◀── scrape
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use route_metrics::config::{load_config, MetricsConfig};
use route_metrics::http::HttpServer;
use route_metrics::observability::{install_exporter, logging, MetricsSink};

#[derive(Parser)]
#[command(name = "route-metrics")]
#[command(about = "Demo server with route-labelled HTTP metrics", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MetricsConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("route-metrics v0.1.0 starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        strategy = ?config.routes.strategy,
        exporter_enabled = config.exporter.enabled,
        "Configuration loaded"
    );

    if config.exporter.enabled {
        install_exporter(&config.exporter)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let sink = Arc::new(MetricsSink::new(config.recorder.clone()));
    let server = HttpServer::new(&config, sink)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
