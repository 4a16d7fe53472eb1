//! The log record and its closed enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EmitterError;

/// Which output stream a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

/// Component category that produced a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Cloud controller API.
    CloudController,
    /// HTTP router.
    Router,
    /// User account and authentication service.
    Uaa,
    /// Droplet execution agent.
    Dea,
    /// Application container.
    WardenContainer,
    /// The log pipeline itself.
    Loggregator,
}

impl SourceType {
    /// All variants, in wire order.
    pub const ALL: [Self; 6] = [
        Self::CloudController,
        Self::Router,
        Self::Uaa,
        Self::Dea,
        Self::WardenContainer,
        Self::Loggregator,
    ];

    /// Wire name (`"WARDEN_CONTAINER"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CloudController => "CLOUD_CONTROLLER",
            Self::Router => "ROUTER",
            Self::Uaa => "UAA",
            Self::Dea => "DEA",
            Self::WardenContainer => "WARDEN_CONTAINER",
            Self::Loggregator => "LOGGREGATOR",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = EmitterError;

    /// Case-insensitive; `-` is accepted in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| EmitterError::UnknownSourceType(s.to_owned()))
    }
}

/// One structured log record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    /// Log line content.
    pub message: String,
    /// Application the line belongs to.
    pub app_id: String,
    /// Output stream.
    pub message_type: MessageType,
    /// Producing component.
    pub source_type: SourceType,
    /// Unix time in nanoseconds.
    pub timestamp: i64,
}

impl LogMessage {
    /// Build a record stamped with the current time.
    pub fn now(
        app_id: &str,
        message: &str,
        message_type: MessageType,
        source_type: SourceType,
    ) -> Self {
        Self {
            message: message.to_owned(),
            app_id: app_id.to_owned(),
            message_type,
            source_type,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }

    /// Serialize to the opaque payload handed to sinks.
    pub fn marshal(&self) -> Result<Vec<u8>, EmitterError> {
        Ok(serde_json::to_vec(self)?)
    }
}
