//! Ping scheduler: periodic probes and the liveness deadline.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{trace, warn};

use super::frame::{ConnectionError, Frame, FrameWriter};
use super::liveness::LivenessTracker;
use super::termination::{TerminationReason, TerminationSignal};
use super::writer::SharedWriter;

/// Probe the subscriber every `interval` and fire `LivenessTimeout` once
/// the tracker's deadline passes without fresh evidence of life.
///
/// The deadline is watched apart from the pings, so a ping stuck behind
/// a stalled write cannot postpone it. The first ping goes out one
/// interval after start. Returns the number of probes written.
pub(crate) async fn run_pinger<W: FrameWriter>(
    writer: &SharedWriter<W>,
    liveness: &LivenessTracker,
    signal: &TerminationSignal,
    interval: Duration,
) -> u64 {
    let ((), probes) = tokio::join!(
        watch_deadline(liveness, signal),
        send_probes(writer, liveness, signal, interval),
    );
    probes
}

async fn watch_deadline(liveness: &LivenessTracker, signal: &TerminationSignal) {
    loop {
        tokio::select! {
            biased;
            () = signal.cancelled() => return,
            () = time::sleep_until(liveness.deadline()) => {
                // The deadline may have moved while we slept.
                if liveness.expired(Instant::now()) {
                    warn!(
                        timeout_ms = u64::try_from(liveness.timeout().as_millis()).unwrap_or(u64::MAX),
                        "subscriber liveness expired"
                    );
                    let _ = signal.fire(TerminationReason::LivenessTimeout);
                    return;
                }
            }
        }
    }
}

async fn send_probes<W: FrameWriter>(
    writer: &SharedWriter<W>,
    liveness: &LivenessTracker,
    signal: &TerminationSignal,
    interval: Duration,
) -> u64 {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut probes = 0;

    loop {
        tokio::select! {
            biased;
            () = signal.cancelled() => return probes,
            _ = ticker.tick() => {}
        }
        if liveness.expired(Instant::now()) {
            // Left to the deadline watch.
            continue;
        }
        match writer.write(Frame::Ping(Bytes::new()), signal).await {
            Ok(()) => {
                probes += 1;
                trace!(probes, "ping sent");
            }
            Err(ConnectionError::Terminating) => return probes,
            Err(e) => {
                warn!(error = %e, "ping write failed");
                let _ = signal.fire(TerminationReason::WriteFailure);
                return probes;
            }
        }
    }
}
