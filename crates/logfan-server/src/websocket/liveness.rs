//! Last-evidence-of-life tracking for one subscriber.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Records when the subscriber last showed it was alive.
///
/// Touched by the inbound watcher, read by the ping scheduler. The
/// recorded instant never moves backwards.
#[derive(Debug)]
pub struct LivenessTracker {
    last_alive: Mutex<Instant>,
    timeout: Duration,
}

impl LivenessTracker {
    /// Start tracking; the subscriber counts as alive right now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_alive: Mutex::new(Instant::now()),
            timeout,
        }
    }

    /// Record evidence of life at the current instant.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_alive.lock();
        if now > *last {
            *last = now;
        }
    }

    /// Instant of the most recent evidence of life.
    pub fn last_alive(&self) -> Instant {
        *self.last_alive.lock()
    }

    /// Whether a full timeout has passed since the last evidence of life.
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_alive()) >= self.timeout
    }

    /// Instant at which the subscriber expires unless touched again.
    pub fn deadline(&self) -> Instant {
        self.last_alive() + self.timeout
    }

    /// Configured liveness timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
