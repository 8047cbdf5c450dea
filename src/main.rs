//! broadcastd - real-time broadcast messaging server.
//!
//! Every text message a client sends is fanned out to the connected
//! clients over WebSocket (raw or event-tagged framing) or plain TCP lines.

mod broadcast;
mod config;
mod error;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;

use crate::broadcast::Broadcaster;
use crate::config::{Config, LogFormat};
use crate::network::Gateway;
use crate::state::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "broadcastd.toml".to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from the file, so this one goes to stderr.
            init_tracing(LogFormat::Pretty);
            error!(path = %config_path, error = %e, "Failed to load config");
            return Err(e.into());
        }
    };
    init_tracing(config.server.log_format);

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        attribution = ?config.broadcast.attribution,
        exclude_self = config.broadcast.exclude_self,
        protocol = ?config.listen.protocol,
        "Starting broadcastd"
    );

    let shutdown = CancellationToken::new();

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    match config.server.metrics_port() {
        None => info!("Metrics disabled"),
        Some(port) => {
            metrics::init();
            tokio::spawn(http::run_http_server(port, shutdown.clone()));
            info!(port, "Prometheus HTTP server started");
        }
    }

    let registry = Arc::new(Registry::new());
    let broadcaster = Arc::new(Broadcaster::new(registry, &config.broadcast));
    let gateway = Gateway::bind(&config, broadcaster, shutdown.clone()).await?;

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        });
    }

    gateway.run().await?;
    shutdown.cancel();

    Ok(())
}
