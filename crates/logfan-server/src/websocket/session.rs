//! Session coordinator: one subscriber from upgrade through teardown.
//!
//! A session runs three activities against the connection until the
//! shared [`TerminationSignal`] fires:
//!
//! 1. the outbound forwarder drains the payload queue into binary frames
//! 2. the inbound watcher classifies subscriber frames and records liveness
//! 3. the ping scheduler probes the subscriber and enforces the deadline
//!
//! Once every activity has returned, the coordinator sends a close frame
//! (unless one already went out or the write side failed), waits briefly
//! for the subscriber's close reply and releases the write half. Each of
//! those steps is bounded by the close grace, so a subscriber that stopped
//! reading cannot keep the session from finishing.

use std::time::Duration;

use bytes::Bytes;
use logfan_core::SubscriberId;
use metrics::{counter, gauge, histogram};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, debug, info, info_span};

use crate::metrics::{
    WS_PAYLOADS_DELIVERED_TOTAL, WS_SESSION_DURATION_SECONDS, WS_SESSION_TERMINATIONS_TOTAL,
    WS_SESSIONS_ACTIVE, WS_SESSIONS_TOTAL,
};

use super::forwarder::run_forwarder;
use super::frame::{CLOSE_GOING_AWAY, CLOSE_NORMAL, CloseReason, Frame, FrameReader, FrameWriter};
use super::liveness::LivenessTracker;
use super::pinger::run_pinger;
use super::termination::{TerminationReason, TerminationSignal};
use super::watcher::{ReadSide, run_watcher};
use super::writer::SharedWriter;

/// Default liveness timeout.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for the subscriber's close reply.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Timing parameters for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum silence tolerated from the subscriber.
    pub liveness_timeout: Duration,
    /// Probe interval; `None` means half the liveness timeout.
    pub ping_interval: Option<Duration>,
    /// How long to wait for the subscriber's close reply. Also bounds the
    /// close frame write and the release of the connection.
    pub close_grace: Duration,
    /// Longest a single payload or ping write may take; `None` means the
    /// liveness timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            ping_interval: None,
            close_grace: DEFAULT_CLOSE_GRACE,
            write_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Defaults with the given liveness timeout.
    pub fn with_timeout(liveness_timeout: Duration) -> Self {
        Self {
            liveness_timeout,
            ..Self::default()
        }
    }

    /// The interval probes are actually sent at.
    pub fn effective_ping_interval(&self) -> Duration {
        self.ping_interval
            .unwrap_or(self.liveness_timeout / 2)
            .max(Duration::from_millis(1))
    }

    /// The bound actually applied to each payload or ping write.
    pub fn effective_write_timeout(&self) -> Duration {
        self.write_timeout
            .unwrap_or(self.liveness_timeout)
            .max(Duration::from_millis(1))
    }
}

/// Lifecycle of a session as seen from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet running.
    Negotiating,
    /// Activities running.
    Active,
    /// Termination signal fired; activities winding down.
    Closing,
    /// Connection released.
    Terminated,
}

/// Summary of a finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    /// The first termination reason recorded.
    pub reason: TerminationReason,
    /// Payloads written to the subscriber.
    pub delivered: u64,
    /// Liveness probes written to the subscriber.
    pub probes: u64,
    /// Time from start until the connection was released.
    pub duration: Duration,
}

/// One subscriber's streaming session.
pub struct Session<W, R> {
    id: SubscriberId,
    writer: W,
    reader: R,
    queue: mpsc::Receiver<Bytes>,
    config: SessionConfig,
    logger: Option<Dispatch>,
    state: watch::Sender<SessionState>,
}

impl<W: FrameWriter, R: FrameReader> Session<W, R> {
    /// Build a session over an upgraded connection and its payload queue.
    pub fn new(
        id: SubscriberId,
        writer: W,
        reader: R,
        queue: mpsc::Receiver<Bytes>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Negotiating);
        Self {
            id,
            writer,
            reader,
            queue,
            config,
            logger: None,
            state,
        }
    }

    /// Route this session's diagnostics to `logger` instead of the
    /// ambient dispatcher.
    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Subscriber this session serves.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Run until termination and release the connection.
    pub async fn run(self) -> SessionOutcome {
        match self.logger.clone() {
            Some(logger) => self.traced().with_subscriber(logger).await,
            None => self.traced().await,
        }
    }

    async fn traced(self) -> SessionOutcome {
        let span = info_span!("ws_session", subscriber_id = %self.id);
        self.coordinate().instrument(span).await
    }

    async fn coordinate(self) -> SessionOutcome {
        let Self {
            writer,
            mut reader,
            mut queue,
            config,
            state,
            ..
        } = self;

        let started = Instant::now();
        let ping_interval = config.effective_ping_interval();
        let liveness = LivenessTracker::new(config.liveness_timeout);
        let signal = TerminationSignal::new();
        let writer = SharedWriter::new(writer)
            .with_write_timeout(config.effective_write_timeout())
            .with_close_timeout(config.close_grace);

        let _ = state.send_replace(SessionState::Active);
        info!(
            timeout_ms = millis(config.liveness_timeout),
            ping_interval_ms = millis(ping_interval),
            "session active"
        );
        counter!(WS_SESSIONS_TOTAL).increment(1);
        gauge!(WS_SESSIONS_ACTIVE).increment(1.0);

        let (delivered, read_side, probes, ()) = tokio::join!(
            run_forwarder(&mut queue, &writer, &signal),
            run_watcher(&mut reader, &liveness, &signal),
            run_pinger(&writer, &liveness, &signal, ping_interval),
            async {
                signal.cancelled().await;
                let _ = state.send_replace(SessionState::Closing);
            },
        );

        // Every activity returns only after the signal has fired.
        let reason = signal.reason().unwrap_or(TerminationReason::SubscriberGone);
        debug!(%reason, "activities stopped");

        if let Some(close) = close_frame_for(reason) {
            let _ = writer.send_close(close).await;
        }
        let awaiting_reply = read_side == ReadSide::Open && writer.close_delivered().await;
        if awaiting_reply
            && time::timeout(config.close_grace, await_close_reply(&mut reader))
                .await
                .is_err()
        {
            debug!("no close reply within grace period");
        }
        writer.shutdown().await;
        drop(queue);

        let duration = started.elapsed();
        let _ = state.send_replace(SessionState::Terminated);
        info!(
            %reason,
            delivered,
            probes,
            duration_ms = millis(duration),
            "session terminated"
        );
        gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
        counter!(WS_SESSION_TERMINATIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        counter!(WS_PAYLOADS_DELIVERED_TOTAL).increment(delivered);
        histogram!(WS_SESSION_DURATION_SECONDS).record(duration.as_secs_f64());

        SessionOutcome {
            reason,
            delivered,
            probes,
            duration,
        }
    }
}

/// Close frame the coordinator sends for `reason`, if any.
fn close_frame_for(reason: TerminationReason) -> Option<CloseReason> {
    match reason {
        TerminationReason::UpstreamExhausted => {
            Some(CloseReason::new(CLOSE_NORMAL, "upstream closed"))
        }
        TerminationReason::LivenessTimeout => {
            Some(CloseReason::new(CLOSE_GOING_AWAY, "liveness timeout"))
        }
        TerminationReason::SubscriberGone => Some(CloseReason::new(CLOSE_NORMAL, "")),
        TerminationReason::WriteFailure => None,
    }
}

async fn await_close_reply<R: FrameReader>(reader: &mut R) {
    while let Some(Ok(frame)) = reader.read_frame().await {
        if matches!(frame, Frame::Close(_)) {
            break;
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
