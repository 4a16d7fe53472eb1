//! Emitter error types.

use thiserror::Error;

/// Errors raised while building, marshalling or queueing log records.
#[derive(Debug, Error)]
pub enum EmitterError {
    /// The configured source type name is not a known [`SourceType`](crate::SourceType).
    #[error("unable to map source type [{0}] to a known source type")]
    UnknownSourceType(String),
    /// Serializing the record failed.
    #[error("failed to marshal log message: {0}")]
    Marshal(#[from] serde_json::Error),
    /// The sink's bounded queue is full; the payload was dropped.
    #[error("sink queue full, payload dropped")]
    QueueFull,
    /// The sink has been shut down.
    #[error("sink closed")]
    QueueClosed,
    /// Socket setup failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_type_names_value() {
        let err = EmitterError::UnknownSourceType("bogus".into());
        assert!(err.to_string().contains("[bogus]"));
    }

    #[test]
    fn io_error_converts() {
        let err: EmitterError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use").into();
        assert!(matches!(err, EmitterError::Io(_)));
    }
}
