//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"closing"` once the hub has been closed.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Subscribers with a live session.
    pub subscribers: usize,
    /// Payloads dropped because a subscriber queue was full.
    pub dropped_payloads: u64,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    subscribers: usize,
    dropped_payloads: u64,
    closing: bool,
) -> HealthResponse {
    HealthResponse {
        status: if closing { "closing" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
        dropped_payloads,
    }
}
