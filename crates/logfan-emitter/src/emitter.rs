//! Turning log lines into payloads.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error};

use crate::errors::EmitterError;
use crate::message::{LogMessage, MessageType, SourceType};
use crate::sink::PayloadSink;

/// Something that accepts log lines for an application.
pub trait Emitter: Send + Sync {
    /// Emit a standard-output line.
    fn emit(&self, app_id: &str, message: &str) -> Result<(), EmitterError>;

    /// Emit a standard-error line.
    fn emit_error(&self, app_id: &str, message: &str) -> Result<(), EmitterError>;
}

/// Marshals records and fans each payload out to its sinks.
pub struct LogEmitter {
    source_type: SourceType,
    sinks: Vec<Arc<dyn PayloadSink>>,
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("source_type", &self.source_type)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl LogEmitter {
    /// Create an emitter for `source_type`.
    ///
    /// Fails with [`EmitterError::UnknownSourceType`] when the name does not
    /// map to a known [`SourceType`].
    pub fn new(source_type: &str) -> Result<Self, EmitterError> {
        Ok(Self::with_source_type(source_type.parse()?))
    }

    /// Create an emitter for an already-validated source type.
    pub fn with_source_type(source_type: SourceType) -> Self {
        Self {
            source_type,
            sinks: Vec::new(),
        }
    }

    /// Add a sink that receives every payload.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn PayloadSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The configured source type.
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn send(&self, app_id: &str, message: &str, message_type: MessageType) -> Result<(), EmitterError> {
        let record = LogMessage::now(app_id, message, message_type, self.source_type);
        debug!(
            source_type = %record.source_type,
            message_type = ?record.message_type,
            app_id = %record.app_id,
            len = record.message.len(),
            "emitting log message"
        );

        let payload = match record.marshal() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(error = %e, "error marshalling message");
                return Err(e);
            }
        };

        // Every sink gets a chance even when an earlier one refused the payload.
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.send(payload.clone()) {
                debug!(error = %e, "sink refused payload");
                let _ = first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Emitter for LogEmitter {
    fn emit(&self, app_id: &str, message: &str) -> Result<(), EmitterError> {
        self.send(app_id, message, MessageType::Out)
    }

    fn emit_error(&self, app_id: &str, message: &str) -> Result<(), EmitterError> {
        self.send(app_id, message, MessageType::Err)
    }
}
