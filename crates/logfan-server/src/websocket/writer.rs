//! Serialized access to the write half.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time;
use tracing::debug;

use super::frame::{CloseReason, ConnectionError, Frame, FrameWriter};
use super::termination::TerminationSignal;

struct WriterState<W> {
    writer: W,
    close_sent: bool,
    broken: bool,
    closed: bool,
}

/// Write half shared by the forwarder, the ping scheduler and the
/// coordinator. At most one write is in flight at a time.
///
/// Waiting for the write half, and the write itself, both give way to the
/// termination signal. The close frame and the final shutdown run after the
/// signal has fired and are bounded by the close timeout instead.
pub(crate) struct SharedWriter<W> {
    state: Mutex<WriterState<W>>,
    write_timeout: Option<Duration>,
    close_timeout: Option<Duration>,
}

impl<W: FrameWriter> SharedWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(WriterState {
                writer,
                close_sent: false,
                broken: false,
                closed: false,
            }),
            write_timeout: None,
            close_timeout: None,
        }
    }

    /// Fail any single frame write that takes longer than `limit`.
    #[must_use]
    pub(crate) fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }

    /// Give up on the close frame, and on releasing the transport, after
    /// `limit` each.
    #[must_use]
    pub(crate) fn with_close_timeout(mut self, limit: Duration) -> Self {
        self.close_timeout = Some(limit);
        self
    }

    /// Write a data or ping frame. Refused once the signal has fired,
    /// after a close frame, or after an earlier write failed.
    ///
    /// A write cut short by the signal leaves the transport mid-frame, so
    /// the writer is marked broken and no close frame follows it.
    pub(crate) async fn write(
        &self,
        frame: Frame,
        signal: &TerminationSignal,
    ) -> Result<(), ConnectionError> {
        let mut state = tokio::select! {
            biased;
            () = signal.cancelled() => return Err(ConnectionError::Terminating),
            state = self.state.lock() => state,
        };
        if signal.is_fired() || state.close_sent || state.broken {
            return Err(ConnectionError::Terminating);
        }
        let attempt = tokio::select! {
            biased;
            () = signal.cancelled() => None,
            result = bounded(self.write_timeout, state.writer.write_frame(frame)) => Some(result),
        };
        match attempt {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                state.broken = true;
                Err(e)
            }
            None => {
                debug!("write abandoned on termination");
                state.broken = true;
                Err(ConnectionError::Terminating)
            }
        }
    }

    /// Send a close frame unless one was already sent or the write side
    /// has failed. Returns whether a close frame went out.
    pub(crate) async fn send_close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock().await;
        if state.close_sent || state.broken {
            return false;
        }
        state.close_sent = true;
        let write = state.writer.write_frame(Frame::Close(Some(reason)));
        match bounded(self.close_timeout, write).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "close frame not delivered");
                state.broken = true;
                false
            }
        }
    }

    /// Whether a close frame reached the transport.
    pub(crate) async fn close_delivered(&self) -> bool {
        let state = self.state.lock().await;
        state.close_sent && !state.broken
    }

    /// Release the write half. Only the first call reaches the transport.
    pub(crate) async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        if let Err(e) = bounded(self.close_timeout, state.writer.close()).await {
            debug!(error = %e, "closing write half failed");
        }
    }
}

async fn bounded(
    limit: Option<Duration>,
    write: impl Future<Output = Result<(), ConnectionError>>,
) -> Result<(), ConnectionError> {
    match limit {
        Some(limit) => time::timeout(limit, write)
            .await
            .map_err(|_| ConnectionError::WriteTimeout(limit))?,
        None => write.await,
    }
}
