//! Outbound forwarder: payload queue to binary frames.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::frame::{CLOSE_NORMAL, CloseReason, ConnectionError, Frame, FrameWriter};
use super::termination::{TerminationReason, TerminationSignal};
use super::writer::SharedWriter;

/// Drain `queue` into binary frames until the session terminates.
///
/// Payloads go out in queue order, one frame each. When the producer
/// closes the queue the forwarder fires `UpstreamExhausted` and, if that
/// firing won, sends the close frame itself. Returns the number of
/// payloads delivered.
pub(crate) async fn run_forwarder<W: FrameWriter>(
    queue: &mut mpsc::Receiver<Bytes>,
    writer: &SharedWriter<W>,
    signal: &TerminationSignal,
) -> u64 {
    let mut delivered = 0;
    loop {
        let next = tokio::select! {
            biased;
            () = signal.cancelled() => return delivered,
            next = queue.recv() => next,
        };

        let Some(payload) = next else {
            if signal.fire(TerminationReason::UpstreamExhausted) {
                debug!(delivered, "payload queue closed");
                let _ = writer
                    .send_close(CloseReason::new(CLOSE_NORMAL, "upstream closed"))
                    .await;
            }
            return delivered;
        };

        let len = payload.len();
        match writer.write(Frame::Binary(payload), signal).await {
            Ok(()) => {
                delivered += 1;
                trace!(len, "payload delivered");
            }
            Err(ConnectionError::Terminating) => return delivered,
            Err(e) => {
                warn!(error = %e, "payload write failed");
                let _ = signal.fire(TerminationReason::WriteFailure);
                return delivered;
            }
        }
    }
}
