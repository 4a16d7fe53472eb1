//! Inbound watcher: classifies subscriber frames.

use tracing::{debug, trace};

use super::frame::{Frame, FrameReader};
use super::liveness::LivenessTracker;
use super::termination::{TerminationReason, TerminationSignal};

/// How the read side looked when the watcher stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadSide {
    /// Still open; a close reply may yet arrive.
    Open,
    /// The subscriber closed, the stream ended, or reading failed.
    Finished,
}

/// Read subscriber frames until the session terminates.
///
/// Pongs, inbound pings and text frames count as evidence of life.
/// Binary frames are ignored. A close frame, end of stream or read error
/// fires `SubscriberGone`.
pub(crate) async fn run_watcher<R: FrameReader>(
    reader: &mut R,
    liveness: &LivenessTracker,
    signal: &TerminationSignal,
) -> ReadSide {
    loop {
        let next = tokio::select! {
            biased;
            () = signal.cancelled() => return ReadSide::Open,
            next = reader.read_frame() => next,
        };

        match next {
            Some(Ok(Frame::Pong(_))) => {
                liveness.touch();
                trace!("pong received");
            }
            Some(Ok(Frame::Ping(_))) => {
                liveness.touch();
                trace!("ping received");
            }
            Some(Ok(Frame::Text(text))) => {
                liveness.touch();
                trace!(len = text.len(), "text keepalive received");
            }
            Some(Ok(Frame::Binary(data))) => {
                trace!(len = data.len(), "ignoring binary frame from subscriber");
            }
            Some(Ok(Frame::Close(reason))) => {
                debug!(code = reason.as_ref().map(|r| r.code), "subscriber sent close");
                let _ = signal.fire(TerminationReason::SubscriberGone);
                return ReadSide::Finished;
            }
            Some(Err(e)) => {
                debug!(error = %e, "subscriber read failed");
                let _ = signal.fire(TerminationReason::SubscriberGone);
                return ReadSide::Finished;
            }
            None => {
                debug!("subscriber stream ended");
                let _ = signal.fire(TerminationReason::SubscriberGone);
                return ReadSide::Finished;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::websocket::frame::{CLOSE_NORMAL, CloseReason};
    use crate::websocket::test_support::FakeReader;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn pong_text_and_ping_touch_liveness() {
        for frame in [
            Frame::Pong(Bytes::new()),
            Frame::Text("I'm alive!".into()),
            Frame::Ping(Bytes::new()),
        ] {
            let (mut reader, peer) = FakeReader::new();
            let liveness = LivenessTracker::new(TIMEOUT);
            let signal = TerminationSignal::new();
            tokio::time::advance(Duration::from_millis(50)).await;
            let before = liveness.last_alive();
            peer.send(frame);
            drop(peer);

            let side = run_watcher(&mut reader, &liveness, &signal).await;

            assert_eq!(side, ReadSide::Finished);
            assert!(liveness.last_alive() > before);
            assert!(!liveness.expired(Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn binary_does_not_touch_liveness() {
        let (mut reader, peer) = FakeReader::new();
        let liveness = LivenessTracker::new(TIMEOUT);
        let signal = TerminationSignal::new();
        tokio::time::advance(Duration::from_millis(50)).await;
        let before = liveness.last_alive();
        peer.send(Frame::Binary(Bytes::from_static(b"noise")));
        drop(peer);

        let _ = run_watcher(&mut reader, &liveness, &signal).await;

        assert_eq!(liveness.last_alive(), before);
    }

    #[tokio::test]
    async fn close_frame_fires_subscriber_gone() {
        let (mut reader, peer) = FakeReader::new();
        let liveness = LivenessTracker::new(TIMEOUT);
        let signal = TerminationSignal::new();
        peer.send(Frame::Close(Some(CloseReason::new(CLOSE_NORMAL, "bye"))));

        let side = run_watcher(&mut reader, &liveness, &signal).await;

        assert_eq!(side, ReadSide::Finished);
        assert_eq!(signal.reason(), Some(TerminationReason::SubscriberGone));
    }

    #[tokio::test]
    async fn read_error_fires_subscriber_gone() {
        let (mut reader, peer) = FakeReader::new();
        let liveness = LivenessTracker::new(TIMEOUT);
        let signal = TerminationSignal::new();
        peer.fail();

        let _ = run_watcher(&mut reader, &liveness, &signal).await;

        assert_eq!(signal.reason(), Some(TerminationReason::SubscriberGone));
    }

    #[tokio::test]
    async fn returns_open_when_signalled_elsewhere() {
        let (mut reader, _peer) = FakeReader::new();
        let liveness = LivenessTracker::new(TIMEOUT);
        let signal = TerminationSignal::new();
        let _ = signal.fire(TerminationReason::UpstreamExhausted);

        let side = run_watcher(&mut reader, &liveness, &signal).await;

        assert_eq!(side, ReadSide::Open);
        assert_eq!(signal.reason(), Some(TerminationReason::UpstreamExhausted));
    }
}
