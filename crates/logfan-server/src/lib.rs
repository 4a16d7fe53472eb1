//! # logfan-server
//!
//! Axum HTTP + `WebSocket` server that streams log payloads to subscribers.
//!
//! - `WebSocket` sessions: one per subscriber, forwarding payloads, probing
//!   liveness and terminating exactly once ([`websocket::session::Session`])
//! - Fan-out hub handing each session its bounded payload queue
//! - HTTP endpoints: `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::LogfanServer;
pub use websocket::broadcast::SubscriberHub;
pub use websocket::session::{Session, SessionConfig, SessionOutcome, SessionState};
pub use websocket::termination::TerminationReason;
