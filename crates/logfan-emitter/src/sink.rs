//! Bounded payload sinks.
//!
//! Sinks never block the producer: a full queue drops the payload, bumps a
//! counter and reports [`EmitterError::QueueFull`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::EmitterError;

/// Destination for marshalled payloads.
pub trait PayloadSink: Send + Sync {
    /// Hand off one payload without blocking.
    fn send(&self, payload: Bytes) -> Result<(), EmitterError>;
}

/// Sink backed by a bounded in-process queue.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a sink and the receiving end of its queue.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Payloads dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PayloadSink for ChannelSink {
    fn send(&self, payload: Bytes) -> Result<(), EmitterError> {
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EmitterError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EmitterError::QueueClosed)
            }
        }
    }
}

/// Sink that forwards each payload as one UDP datagram.
///
/// Payloads are queued and sent by a worker task, so transmission failures
/// are logged and counted instead of surfacing to the producer.
#[derive(Debug)]
pub struct UdpSink {
    queue: Mutex<Option<ChannelSink>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    send_errors: Arc<AtomicU64>,
    destination: String,
}

impl UdpSink {
    /// Connect a UDP socket to `destination` (`host:port`) and start the worker.
    pub async fn connect(destination: &str, capacity: usize) -> Result<Self, EmitterError> {
        let bind_addr = if destination.starts_with('[') {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(destination).await?;
        info!(destination, "UDP forwarding enabled");

        let (queue, mut rx) = ChannelSink::bounded(capacity);
        let send_errors = Arc::new(AtomicU64::new(0));
        let worker_errors = Arc::clone(&send_errors);
        let worker_dest = destination.to_owned();

        let worker = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if let Err(e) = socket.send(&payload).await {
                    let _ = worker_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(destination = %worker_dest, error = %e, "UDP send failed");
                }
            }
            debug!(destination = %worker_dest, "UDP sink worker stopped");
        });

        Ok(Self {
            queue: Mutex::new(Some(queue)),
            worker: Mutex::new(Some(worker)),
            send_errors,
            destination: destination.to_owned(),
        })
    }

    /// Destination address as configured.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Datagrams that failed to send.
    pub fn send_error_count(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    /// Stop accepting payloads, flush the queue and wait for the worker.
    pub async fn shutdown(&self) {
        drop(self.queue.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl PayloadSink for UdpSink {
    fn send(&self, payload: Bytes) -> Result<(), EmitterError> {
        match self.queue.lock().as_ref() {
            Some(queue) => queue.send(payload),
            None => Err(EmitterError::QueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::bounded(8);
        for i in 0..3 {
            sink.send(Bytes::from(format!("p{i}"))).unwrap();
        }
        for i in 0..3 {
            assert_eq!(rx.recv().await.unwrap(), Bytes::from(format!("p{i}")));
        }
    }

    #[tokio::test]
    async fn channel_sink_full_drops_and_counts() {
        let (sink, _rx) = ChannelSink::bounded(1);
        sink.send(Bytes::from_static(b"a")).unwrap();
        assert_matches!(
            sink.send(Bytes::from_static(b"b")),
            Err(EmitterError::QueueFull)
        );
        assert_eq!(sink.drop_count(), 1);
    }

    #[tokio::test]
    async fn channel_sink_closed_reports_closed() {
        let (sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        assert_matches!(
            sink.send(Bytes::from_static(b"a")),
            Err(EmitterError::QueueClosed)
        );
        assert_eq!(sink.drop_count(), 1);
    }

    #[tokio::test]
    async fn udp_sink_sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let sink = UdpSink::connect(&addr, 16).await.unwrap();
        assert_eq!(sink.destination(), addr);
        sink.send(Bytes::from_static(b"hello")).unwrap();

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"hello");

        sink.shutdown().await;
        assert_eq!(sink.send_error_count(), 0);
    }

    #[tokio::test]
    async fn udp_sink_rejects_after_shutdown() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let sink = UdpSink::connect(&addr, 4).await.unwrap();
        sink.shutdown().await;
        assert_matches!(
            sink.send(Bytes::from_static(b"late")),
            Err(EmitterError::QueueClosed)
        );
    }

    #[tokio::test]
    async fn udp_sink_invalid_destination_fails() {
        let result = UdpSink::connect("not an address", 4).await;
        assert_matches!(result, Err(EmitterError::Io(_)));
    }
}
