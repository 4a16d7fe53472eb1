//! In-memory connection halves for driving sessions in tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::frame::{ConnectionError, Frame, FrameReader, FrameWriter};

#[derive(Default)]
struct WriterLog {
    frames: Vec<Frame>,
    shutdowns: usize,
    failed_writes: usize,
    stalled_writes: usize,
}

/// Handle for inspecting what a [`FakeWriter`] received.
#[derive(Clone, Default)]
pub(crate) struct WriterHandle {
    inner: Arc<Mutex<WriterLog>>,
}

impl WriterHandle {
    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.inner.lock().frames.clone()
    }

    pub(crate) fn binary_payloads(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .frames
            .iter()
            .filter_map(|f| match f {
                Frame::Binary(data) => Some(data.to_vec()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pings(&self) -> usize {
        self.count(|f| matches!(f, Frame::Ping(_)))
    }

    pub(crate) fn close_frames(&self) -> usize {
        self.count(|f| matches!(f, Frame::Close(_)))
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.inner.lock().shutdowns
    }

    pub(crate) fn failed_writes(&self) -> usize {
        self.inner.lock().failed_writes
    }

    pub(crate) fn stalled_writes(&self) -> usize {
        self.inner.lock().stalled_writes
    }

    fn count(&self, pred: impl Fn(&Frame) -> bool) -> usize {
        self.inner.lock().frames.iter().filter(|f| pred(f)).count()
    }
}

/// Records every frame; optionally fails once `fail_after` writes succeeded.
///
/// A stalled writer models a subscriber that stopped reading: every write
/// and the final close hang forever.
pub(crate) struct FakeWriter {
    log: WriterHandle,
    fail_after: Option<usize>,
    stalled: bool,
}

impl FakeWriter {
    pub(crate) fn new() -> (Self, WriterHandle) {
        let log = WriterHandle::default();
        (
            Self {
                log: log.clone(),
                fail_after: None,
                stalled: false,
            },
            log,
        )
    }

    pub(crate) fn failing_after(successful: usize) -> (Self, WriterHandle) {
        let (mut writer, log) = Self::new();
        writer.fail_after = Some(successful);
        (writer, log)
    }

    pub(crate) fn stalled() -> (Self, WriterHandle) {
        let (mut writer, log) = Self::new();
        writer.stalled = true;
        (writer, log)
    }
}

#[async_trait]
impl FrameWriter for FakeWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        if self.stalled {
            self.log.inner.lock().stalled_writes += 1;
            std::future::pending::<()>().await;
        }
        let mut log = self.log.inner.lock();
        if self.fail_after.is_some_and(|n| log.frames.len() >= n) {
            log.failed_writes += 1;
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer reset",
            )));
        }
        log.frames.push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.log.inner.lock().shutdowns += 1;
        if self.stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Yields frames pushed through its [`PeerHandle`]; ends when the handle drops.
pub(crate) struct FakeReader {
    rx: mpsc::UnboundedReceiver<Result<Frame, ConnectionError>>,
}

/// Test side of a [`FakeReader`]: what the subscriber sends.
pub(crate) struct PeerHandle {
    tx: mpsc::UnboundedSender<Result<Frame, ConnectionError>>,
}

impl FakeReader {
    pub(crate) fn new() -> (Self, PeerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, PeerHandle { tx })
    }
}

impl PeerHandle {
    pub(crate) fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub(crate) fn fail(&self) {
        let _ = self.tx.send(Err(ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))));
    }
}

#[async_trait]
impl FrameReader for FakeReader {
    async fn read_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        self.rx.recv().await
    }
}
