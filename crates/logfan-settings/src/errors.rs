//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a logfan settings file could not be turned into a usable
/// [`LogfanSettings`](crate::LogfanSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was being loaded.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or its shape does not match the settings tree.
    #[error("malformed logfan settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A field parsed but breaks a session or queue constraint.
    #[error("{field}: {reason}")]
    Invalid {
        /// Dotted camelCase path of the offending field.
        field: &'static str,
        /// What the value must satisfy.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
