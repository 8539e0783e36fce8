//! Connection adapter over an axum WebSocket
//!
//! Splits the socket into the read and write halves the session loops own.

use crate::core::connection::{Frame, FrameReader, FrameWriter};
use crate::core::error::{ProtocolError, RelayError, TransportError};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;

/// Prefix of the error tungstenite raises when a message passes the size limit
const CAPACITY_EXCEEDED: &str = "Space limit exceeded";

/// Split an upgraded socket into session halves
///
/// `limit` is the message size the upgrade was configured with.
pub fn split(socket: WebSocket, limit: usize) -> (WsFrameReader, WsFrameWriter) {
    let (sink, stream) = socket.split();
    (WsFrameReader { stream, limit }, WsFrameWriter { sink })
}

pub struct WsFrameReader {
    stream: SplitStream<WebSocket>,
    limit: usize,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> Result<Frame, RelayError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(from_message(message)),
            Some(Err(e)) => Err(match oversized_message(&e, self.limit) {
                Some(too_large) => too_large.into(),
                None => TransportError::ReadFailed(e.to_string()).into(),
            }),
            None => Err(TransportError::Closed { code: None }.into()),
        }
    }
}

/// Recognize a read that failed because the message was over `limit`
///
/// axum only exposes the transport error as a boxed source, so the size is
/// taken from its message (`... Message too long: 71702 > 65536`).
fn oversized_message(error: &axum::Error, limit: usize) -> Option<ProtocolError> {
    let text = error.to_string();
    if !text.contains(CAPACITY_EXCEEDED) {
        return None;
    }

    let size = text
        .rsplit("too long: ")
        .next()
        .and_then(|rest| rest.split(' ').next())
        .and_then(|size| size.parse().ok())
        .unwrap_or(limit.saturating_add(1));

    Some(ProtocolError::FrameTooLarge { size, limit })
}

pub struct WsFrameWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), RelayError> {
        self.sink
            .send(to_message(frame))
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()).into())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()).into())
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
        Message::Ping(bytes) => Frame::Ping(bytes.to_vec()),
        Message::Pong(bytes) => Frame::Pong(bytes.to_vec()),
        Message::Close(frame) => Frame::Close(frame.map(|f| f.code)),
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
        Frame::Ping(bytes) => Message::Ping(bytes.into()),
        Frame::Pong(bytes) => Message::Pong(bytes.into()),
        Frame::Close(None) => Message::Close(None),
        Frame::Close(Some(code)) => Message::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion() {
        assert_eq!(from_message(Message::Text("hi".into())), Frame::Text("hi".into()));
        assert_eq!(
            from_message(Message::Pong(vec![7u8].into())),
            Frame::Pong(vec![7])
        );
        assert_eq!(
            from_message(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "bye".into(),
            }))),
            Frame::Close(Some(1001))
        );
        assert_eq!(from_message(Message::Close(None)), Frame::Close(None));
    }

    #[test]
    fn test_capacity_error_becomes_frame_too_large() {
        let error = axum::Error::new(std::io::Error::other(
            "Space limit exceeded: Message too long: 71702 > 65536",
        ));

        assert_eq!(
            oversized_message(&error, 65536),
            Some(ProtocolError::FrameTooLarge {
                size: 71702,
                limit: 65536
            })
        );
    }

    #[test]
    fn test_capacity_error_without_size_uses_limit() {
        let error = axum::Error::new(std::io::Error::other("Space limit exceeded"));

        assert_eq!(
            oversized_message(&error, 100),
            Some(ProtocolError::FrameTooLarge {
                size: 101,
                limit: 100
            })
        );
    }

    #[test]
    fn test_other_read_errors_are_not_size_errors() {
        let error = axum::Error::new(std::io::Error::other("Connection reset without closing handshake"));
        assert_eq!(oversized_message(&error, 65536), None);
    }

    #[test]
    fn test_frame_conversion() {
        assert!(matches!(to_message(Frame::Ping(Vec::new())), Message::Ping(_)));
        assert!(matches!(to_message(Frame::Close(None)), Message::Close(None)));
        match to_message(Frame::Text("x".into())) {
            Message::Text(text) => assert_eq!(text.as_str(), "x"),
            other => panic!("Expected text message, got {:?}", other),
        }
    }
}
