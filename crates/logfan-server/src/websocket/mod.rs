//! Per-subscriber streaming sessions and the fan-out hub that feeds them.

pub mod broadcast;
pub mod frame;
pub mod liveness;
pub mod session;
pub mod termination;

mod forwarder;
mod pinger;
mod watcher;
mod writer;

#[cfg(test)]
pub(crate) mod test_support;
