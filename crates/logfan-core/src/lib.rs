//! # logfan-core
//!
//! Shared vocabulary for the logfan crates:
//!
//! - **IDs**: [`SubscriberId`], a UUID v7 newtype naming one streaming session
//! - **Logging**: [`logging::init_subscriber`] and capture helpers for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::SubscriberId;
