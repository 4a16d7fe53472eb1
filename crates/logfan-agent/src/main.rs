//! # logfan
//!
//! Reads log lines from stdin, marshals each into a log record and streams
//! the payloads to every connected `WebSocket` subscriber (and optionally to
//! a UDP collector).

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logfan_core::logging::{LogFormat, init_subscriber};
use logfan_emitter::{Emitter, LogEmitter, UdpSink};
use logfan_server::config::ServerConfig;
use logfan_server::server::LogfanServer;
use logfan_settings::LogfanSettings;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Stream log lines to `WebSocket` subscribers.
#[derive(Parser, Debug)]
#[command(name = "logfan", about = "Stream log lines to WebSocket subscribers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.logfan/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `logfan_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Application id stamped on every record.
    #[arg(long)]
    app_id: Option<String>,

    /// Source type stamped on every record, e.g. `DEA`.
    #[arg(long)]
    source_type: Option<String>,

    /// Also forward every payload to this `host:port` over UDP.
    #[arg(long)]
    udp_forward: Option<String>,

    /// Maximum concurrent subscribers (overrides settings).
    #[arg(long)]
    max_subscribers: Option<usize>,
}

impl Cli {
    /// Flags win over file and environment settings.
    fn apply(&self, settings: &mut LogfanSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(max) = self.max_subscribers {
            settings.server.max_subscribers = max;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(app_id) = &self.app_id {
            settings.emitter.app_id.clone_from(app_id);
        }
        if let Some(source_type) = &self.source_type {
            settings.emitter.source_type.clone_from(source_type);
        }
        if let Some(dest) = &self.udp_forward {
            settings.emitter.udp_forward = Some(dest.clone());
        }
    }
}

/// Emit every non-empty line of `input` for `app_id`. Returns how many
/// lines were accepted by the emitter.
async fn pump_lines<R>(input: R, emitter: &impl Emitter, app_id: &str) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut emitted = 0;
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        match emitter.emit(app_id, &line) {
            Ok(()) => emitted += 1,
            Err(e) => debug!(error = %e, "log line not delivered"),
        }
    }
    Ok(emitted)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(logfan_settings::settings_path);
    let mut settings = logfan_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let mut server = LogfanServer::new(ServerConfig::from(&settings));
    match logfan_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let mut emitter = LogEmitter::new(&settings.emitter.source_type)
        .context("Invalid source type")?
        .with_sink(server.hub().clone());
    let udp = match &settings.emitter.udp_forward {
        Some(dest) => {
            let sink = UdpSink::connect(dest, settings.emitter.queue_capacity)
                .await
                .with_context(|| format!("Failed to set up UDP forwarding to {dest}"))?;
            info!(destination = dest, "forwarding payloads over UDP");
            Some(Arc::new(sink))
        }
        None => None,
    };
    if let Some(udp) = &udp {
        emitter = emitter.with_sink(udp.clone());
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        source_type = %emitter.source_type(),
        app_id = %settings.emitter.app_id,
        "logfan listening on ws://{addr}/ws"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = pump_lines(stdin, &emitter, &settings.emitter.app_id) => {
            let emitted = result.context("Failed to read stdin")?;
            info!(emitted, "stdin closed");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("interrupt received");
        }
    }

    info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(server.hub(), vec![handle], None)
        .await;
    if let Some(udp) = udp {
        udp.shutdown().await;
    }
    info!("Shutdown complete");
    Ok(())
}
