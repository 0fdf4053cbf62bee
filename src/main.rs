//! `tether`: standalone WebSocket event server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tether_server::{EventRouter, Router};
use tether_settings::TetherSettings;
use tether_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "tether", version, about = "WebSocket event server")]
struct Args {
    /// Settings file (defaults to ~/.tether/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port, overriding settings.
    #[arg(long)]
    port: Option<u16>,

    /// Log level, overriding settings.
    #[arg(long)]
    log_level: Option<String>,
}

fn load(args: &Args) -> anyhow::Result<TetherSettings> {
    let mut settings = match &args.config {
        Some(path) => tether_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => tether_settings::load_settings().context("failed to load settings")?,
    };
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(level) = &args.log_level {
        settings.logging.level.clone_from(level);
    }
    Ok(settings)
}

fn router() -> Arc<dyn Router> {
    let router = EventRouter::new()
        .on("echo", |conn, data| {
            let conn = Arc::clone(conn);
            let _ = tokio::spawn(async move {
                let _ = conn.emit("echo", &data).await;
            });
        })
        .on_connect(|conn| tracing::debug!(conn_id = %conn.id(), "client joined"))
        .on_close(|conn| tracing::debug!(conn_id = %conn.id(), "client left"));
    Arc::new(router)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load(&args)?;

    let telemetry = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    );
    init_telemetry(&telemetry)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting tether");

    let handle = tether_server::start(&settings, router())
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, "tether ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
