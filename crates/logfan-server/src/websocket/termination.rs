//! The one-shot termination signal shared by a session's activities.

use std::fmt;
use std::sync::OnceLock;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// The payload queue was closed by the producer.
    UpstreamExhausted,
    /// No evidence of life within the liveness timeout.
    LivenessTimeout,
    /// The subscriber closed the connection or the read side failed.
    SubscriberGone,
    /// Writing a frame to the subscriber failed.
    WriteFailure,
}

impl TerminationReason {
    /// Stable label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamExhausted => "upstream_exhausted",
            Self::LivenessTimeout => "liveness_timeout",
            Self::SubscriberGone => "subscriber_gone",
            Self::WriteFailure => "write_failure",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fires at most once; the first reason recorded wins.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    reason: OnceLock<TerminationReason>,
    token: CancellationToken,
}

impl TerminationSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire with `reason`. Returns `true` if this call recorded the reason.
    pub fn fire(&self, reason: TerminationReason) -> bool {
        let won = self.reason.set(reason).is_ok();
        self.token.cancel();
        won
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The recorded reason, once fired.
    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason.get().copied()
    }

    /// Completes once the signal has fired.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
