//! Server configuration.

use std::time::Duration;

use logfan_settings::LogfanSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionConfig;

/// Configuration for the logfan server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent subscribers; further upgrades get 503.
    pub max_subscribers: usize,
    /// Payloads buffered per subscriber before drops begin.
    pub subscriber_queue_capacity: usize,
    /// Liveness timeout in milliseconds.
    pub keep_alive_timeout_ms: u64,
    /// Probe interval in milliseconds; half the timeout when unset.
    pub ping_interval_ms: Option<u64>,
    /// Wait for a subscriber's close reply, in milliseconds.
    pub close_grace_ms: u64,
    /// Bound on a single payload or ping write; the liveness timeout when unset.
    pub write_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_subscribers: 256,
            subscriber_queue_capacity: 1024,
            keep_alive_timeout_ms: 30_000,
            ping_interval_ms: None,
            close_grace_ms: 1_000,
            write_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Session timing derived from this configuration.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            liveness_timeout: Duration::from_millis(self.keep_alive_timeout_ms),
            ping_interval: self.ping_interval_ms.map(Duration::from_millis),
            close_grace: Duration::from_millis(self.close_grace_ms),
            write_timeout: self.write_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl From<&LogfanSettings> for ServerConfig {
    fn from(settings: &LogfanSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_subscribers: settings.server.max_subscribers,
            subscriber_queue_capacity: settings.server.subscriber_queue_capacity,
            keep_alive_timeout_ms: settings.session.keep_alive_timeout_ms,
            ping_interval_ms: settings.session.ping_interval_ms,
            close_grace_ms: settings.session.close_grace_ms,
            write_timeout_ms: settings.session.write_timeout_ms,
        }
    }
}
