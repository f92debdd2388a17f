//! # meetspace
//!
//! Presence relay binary: loads settings, wires the URL suggester, and serves
//! the WebSocket endpoint until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use meetspace_server::connections::Heartbeat;
use meetspace_server::ServerConfig;
use meetspace_settings::MeetspaceSettings;
use meetspace_telemetry::{init_telemetry, parse_level, TelemetryConfig};
use tracing::Level;

/// Multi-user presence relay for shared 3D spaces.
#[derive(Parser, Debug)]
#[command(name = "meetspace", about = "Multi-user presence relay")]
struct Cli {
    /// Settings file (defaults to `~/.meetspace/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut MeetspaceSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn telemetry_config(settings: &MeetspaceSettings) -> TelemetryConfig {
    let logging = &settings.logging;
    let log_level = parse_level(&logging.level).unwrap_or_else(|| {
        eprintln!("unknown log level '{}', using info", logging.level);
        Level::INFO
    });
    let module_levels = logging
        .modules
        .iter()
        .filter_map(|(module, level)| parse_level(level).map(|l| (module.clone(), l)))
        .collect();
    TelemetryConfig {
        log_level,
        module_levels,
        json: logging.json,
    }
}

fn server_config(settings: &MeetspaceSettings) -> ServerConfig {
    let server = &settings.server;
    ServerConfig {
        host: server.host.clone(),
        port: server.port,
        max_send_queue: server.max_send_queue,
        broadcast_interval: Duration::from_millis(server.broadcast_interval_ms),
        heartbeat: Heartbeat {
            interval: Duration::from_millis(server.heartbeat_interval_ms),
            timeout: Duration::from_millis(server.client_timeout_ms),
        },
        suggest_timeout: Duration::from_millis(settings.suggest.timeout_ms),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(meetspace_settings::settings_path);
    let mut settings = match &cli.config {
        Some(path) => meetspace_settings::load_settings_from_path(path),
        None => meetspace_settings::load_settings(),
    }
    .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    init_telemetry(&telemetry_config(&settings));
    tracing::info!(path = %path.display(), "settings loaded");

    let suggester = meetspace_suggest::build_suggester(&settings.suggest);
    tracing::info!(suggester = suggester.name(), "URL suggester ready");

    let handle = meetspace_server::start(server_config(&settings), suggester)
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                settings.server.host, settings.server.port
            )
        })?;
    tracing::info!(port = handle.port, "meetspace ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}
