//! Frame classification and the connection halves a session drives.
//!
//! The session only sees [`Frame`]s through [`FrameWriter`] and
//! [`FrameReader`]; the axum `WebSocket` halves implement both.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code for an endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// One message unit on the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Payload data.
    Binary(Bytes),
    /// Text; from a subscriber this is a legacy heartbeat.
    Text(String),
    /// Liveness probe.
    Ping(Bytes),
    /// Liveness probe response.
    Pong(Bytes),
    /// Close frame with an optional code and reason.
    Close(Option<CloseReason>),
}

/// Code and reason carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code.
    pub code: u16,
    /// Human readable reason.
    pub reason: String,
}

impl CloseReason {
    /// Build a close reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Transport failures surfaced by a connection half.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The `WebSocket` transport failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    /// Underlying I/O failed.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A write did not complete within the session's write timeout.
    #[error("write stalled for {0:?}")]
    WriteTimeout(std::time::Duration),
    /// The session is terminating; no further writes are accepted.
    #[error("write refused, session is terminating")]
    Terminating,
}

/// Write half of a subscriber connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one frame.
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError>;

    /// Flush and release the write half.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Read half of a subscriber connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame, or `None` once the stream has ended.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn read_frame(&mut self) -> Option<Result<Frame, ConnectionError>>;
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Binary(data) => Self::Binary(data),
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Ping(data) => Self::Ping(data),
            Message::Pong(data) => Self::Pong(data),
            Message::Close(frame) => Self::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Self::Binary(data),
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Ping(data) => Self::Ping(data),
            Frame::Pong(data) => Self::Pong(data),
            Frame::Close(reason) => Self::Close(reason.map(|r| CloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

#[async_trait]
impl FrameWriter for SplitSink<WebSocket, Message> {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        self.send(Message::from(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        SinkExt::close(self).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameReader for SplitStream<WebSocket> {
    async fn read_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        self.next()
            .await
            .map(|result| result.map(Frame::from).map_err(ConnectionError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trips_through_message() {
        let frame = Frame::Binary(Bytes::from_static(b"payload"));
        assert_eq!(Frame::from(Message::from(frame.clone())), frame);
    }

    #[test]
    fn close_reason_survives_conversion() {
        let frame = Frame::Close(Some(CloseReason::new(CLOSE_NORMAL, "upstream closed")));
        let message = Message::from(frame.clone());
        match &message {
            Message::Close(Some(cf)) => {
                assert_eq!(cf.code, CLOSE_NORMAL);
                assert_eq!(cf.reason.as_str(), "upstream closed");
            }
            other => panic!("expected close message, got {other:?}"),
        }
        assert_eq!(Frame::from(message), frame);
    }

    #[test]
    fn text_message_classified_as_text() {
        let frame = Frame::from(Message::Text("I'm alive!".into()));
        assert_eq!(frame, Frame::Text("I'm alive!".into()));
    }

    #[test]
    fn pong_message_classified_as_pong() {
        let frame = Frame::from(Message::Pong(Bytes::new()));
        assert_eq!(frame, Frame::Pong(Bytes::new()));
    }

    #[test]
    fn terminating_error_display() {
        assert!(ConnectionError::Terminating.to_string().contains("terminating"));
    }
}
