//! Settings types.
//!
//! Every struct uses `#[serde(default)]`, so a settings file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogfanSettings {
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Per-subscriber streaming session settings.
    pub session: SessionSettings,
    /// Upstream log emitter settings.
    pub emitter: EmitterSettings,
    /// Process logging settings.
    pub logging: LoggingSettings,
}

impl LogfanSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.session.keep_alive_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "session.keepAliveTimeoutMs",
                "must be > 0",
            ));
        }
        if let Some(interval) = self.session.ping_interval_ms {
            if interval == 0 || interval >= self.session.keep_alive_timeout_ms {
                return Err(SettingsError::invalid(
                    "session.pingIntervalMs",
                    format!(
                        "{interval} must be > 0 and below keepAliveTimeoutMs ({})",
                        self.session.keep_alive_timeout_ms
                    ),
                ));
            }
        }
        if self.session.write_timeout_ms == Some(0) {
            return Err(SettingsError::invalid(
                "session.writeTimeoutMs",
                "must be > 0",
            ));
        }
        if self.server.subscriber_queue_capacity == 0 {
            return Err(SettingsError::invalid(
                "server.subscriberQueueCapacity",
                "must be > 0",
            ));
        }
        if self.emitter.queue_capacity == 0 {
            return Err(SettingsError::invalid("emitter.queueCapacity", "must be > 0"));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrent subscribers; upgrades beyond it are refused.
    pub max_subscribers: usize,
    /// Capacity of each subscriber's payload queue.
    pub subscriber_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_subscribers: 256,
            subscriber_queue_capacity: 1024,
        }
    }
}

/// Streaming session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Close a subscriber that shows no sign of life for this long.
    pub keep_alive_timeout_ms: u64,
    /// Ping interval; half the keep-alive timeout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,
    /// How long to wait for the subscriber's close reply on shutdown.
    pub close_grace_ms: u64,
    /// Give up on a subscriber whose payload or ping write stalls this
    /// long; the keep-alive timeout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive_timeout_ms: 30_000,
            ping_interval_ms: None,
            close_grace_ms: 1_000,
            write_timeout_ms: None,
        }
    }
}

/// Upstream emitter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmitterSettings {
    /// Source type name stamped on every record (e.g. `"DEA"`).
    pub source_type: String,
    /// Application ID stamped on records read from stdin.
    pub app_id: String,
    /// Optional `host:port` to also forward marshalled records to over UDP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_forward: Option<String>,
    /// Capacity of the emitter's outbound queue.
    pub queue_capacity: usize,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            source_type: "LOGGREGATOR".to_string(),
            app_id: "logfan".to_string(),
            udp_forward: None,
            queue_capacity: 4096,
        }
    }
}

/// Process logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        LogfanSettings::default().validate().unwrap();
    }

    #[test]
    fn default_values() {
        let settings = LogfanSettings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.keep_alive_timeout_ms, 30_000);
        assert!(settings.session.ping_interval_ms.is_none());
        assert_eq!(settings.emitter.source_type, "LOGGREGATOR");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut settings = LogfanSettings::default();
        settings.session.keep_alive_timeout_ms = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "session.keepAliveTimeoutMs", .. })
        );
    }

    #[test]
    fn ping_interval_must_be_below_timeout() {
        let mut settings = LogfanSettings::default();
        settings.session.ping_interval_ms = Some(30_000);
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { field, .. }) if field == "session.pingIntervalMs");

        settings.session.ping_interval_ms = Some(10_000);
        settings.validate().unwrap();
    }

    #[test]
    fn zero_write_timeout_rejected() {
        let mut settings = LogfanSettings::default();
        settings.session.write_timeout_ms = Some(0);
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "session.writeTimeoutMs", .. })
        );

        settings.session.write_timeout_ms = Some(5_000);
        settings.validate().unwrap();
    }

    #[test]
    fn empty_queues_rejected() {
        let mut settings = LogfanSettings::default();
        settings.server.subscriber_queue_capacity = 0;
        assert!(settings.validate().is_err());

        let mut settings = LogfanSettings::default();
        settings.emitter.queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(LogfanSettings::default()).unwrap();
        assert!(json["session"]["keepAliveTimeoutMs"].is_number());
        assert!(json["server"]["maxSubscribers"].is_number());
        assert!(json["session"].get("pingIntervalMs").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: LogfanSettings =
            serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.session, SessionSettings::default());
    }
}
