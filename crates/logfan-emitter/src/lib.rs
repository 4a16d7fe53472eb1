//! # logfan-emitter
//!
//! Producer side of the pipeline: turns `(app_id, message)` pairs into
//! marshalled [`LogMessage`] payloads and hands them to one or more
//! [`PayloadSink`]s without ever blocking the caller.
//!
//! - [`LogEmitter`] stamps source type, message type and timestamp
//! - [`ChannelSink`] feeds a bounded in-process queue
//! - [`UdpSink`] forwards each payload as one datagram from a worker task

#![deny(unsafe_code)]

pub mod emitter;
pub mod errors;
pub mod message;
pub mod sink;

pub use emitter::{Emitter, LogEmitter};
pub use errors::EmitterError;
pub use message::{LogMessage, MessageType, SourceType};
pub use sink::{ChannelSink, PayloadSink, UdpSink};
