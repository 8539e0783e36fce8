//! Connection adapter contract
//!
//! The core never touches a socket. It consumes one bidirectional connection
//! split into a [`FrameReader`] and a [`FrameWriter`], which lets the inbound
//! loop own the read side and the outbound loop own the write side without
//! any locking: at most one reader and one writer exist per connection.
//!
//! The transport boundary provides adapters (see the axum WebSocket adapter in
//! `server::exposure::websocket`). [`memory::pair`] provides an in-process
//! adapter used by the tests and by embedders that want to drive the hub
//! without a network.

use super::error::{RelayError, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One frame on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Liveness probe
    Ping(Vec<u8>),
    /// Liveness answer
    Pong(Vec<u8>),
    /// Closure frame with an optional close code
    Close(Option<u16>),
}

impl Frame {
    /// Payload of a data frame, `None` for control frames
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(text) => Some(text.as_bytes()),
            Frame::Binary(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }
}

/// Read side of a connection
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Wait for the next frame
    ///
    /// The end of the stream is reported as
    /// `TransportError::Closed { code: None }`.
    async fn read_frame(&mut self) -> Result<Frame, RelayError>;
}

/// Write side of a connection
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), RelayError>;

    /// Release the underlying transport
    async fn close(&mut self) -> Result<(), RelayError>;
}

/// Shared "this connection is closed" flag for the two session loops
///
/// Whichever loop exits first closes the signal; the other loop observes it
/// and stops waiting on the transport.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    inner: Arc<CloseInner>,
}

#[derive(Debug, Default)]
struct CloseInner {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection closed; `true` only for the first caller
    pub fn close(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolve once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        loop {
            // Register before checking the flag so a concurrent close is not missed.
            let notified = self.inner.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// In-process connection backed by channels
pub mod memory {
    use super::*;
    use crate::core::envelope::Envelope;
    use tokio::sync::mpsc;

    /// Create a server-side reader/writer and the matching peer
    ///
    /// `capacity` bounds each direction. A peer that stops reading makes the
    /// server's writes block once `capacity` frames are pending, which is how
    /// a slow consumer looks from the relay's side.
    pub fn pair(capacity: usize) -> (MemoryReader, MemoryWriter, MemoryPeer) {
        let (to_server, from_peer) = mpsc::channel(capacity.max(1));
        let (to_peer, from_server) = mpsc::channel(capacity.max(1));

        (
            MemoryReader { rx: from_peer },
            MemoryWriter {
                tx: Some(to_peer),
                closed: false,
            },
            MemoryPeer {
                tx: Some(to_server),
                rx: from_server,
            },
        )
    }

    /// Server-side read half
    #[derive(Debug)]
    pub struct MemoryReader {
        rx: mpsc::Receiver<Frame>,
    }

    #[async_trait]
    impl FrameReader for MemoryReader {
        async fn read_frame(&mut self) -> Result<Frame, RelayError> {
            self.rx
                .recv()
                .await
                .ok_or_else(|| TransportError::Closed { code: None }.into())
        }
    }

    /// Server-side write half
    #[derive(Debug)]
    pub struct MemoryWriter {
        tx: Option<mpsc::Sender<Frame>>,
        closed: bool,
    }

    impl MemoryWriter {
        pub fn is_closed(&self) -> bool {
            self.closed
        }
    }

    #[async_trait]
    impl FrameWriter for MemoryWriter {
        async fn write_frame(&mut self, frame: Frame) -> Result<(), RelayError> {
            let tx = self
                .tx
                .as_ref()
                .ok_or(TransportError::Closed { code: None })?;
            tx.send(frame)
                .await
                .map_err(|_| TransportError::WriteFailed("peer is gone".to_string()).into())
        }

        async fn close(&mut self) -> Result<(), RelayError> {
            self.closed = true;
            self.tx = None;
            Ok(())
        }
    }

    /// The client end of an in-memory connection
    #[derive(Debug)]
    pub struct MemoryPeer {
        tx: Option<mpsc::Sender<Frame>>,
        rx: mpsc::Receiver<Frame>,
    }

    impl MemoryPeer {
        /// Send a raw frame to the server
        pub async fn send(&self, frame: Frame) -> Result<(), RelayError> {
            let tx = self
                .tx
                .as_ref()
                .ok_or(TransportError::Closed { code: None })?;
            tx.send(frame)
                .await
                .map_err(|_| TransportError::WriteFailed("server is gone".to_string()).into())
        }

        /// Send an envelope as a text frame
        pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), RelayError> {
            self.send(Frame::Text(envelope.encode()?)).await
        }

        /// Next raw frame from the server; `None` once the server closed
        pub async fn recv(&mut self) -> Option<Frame> {
            self.rx.recv().await
        }

        pub fn try_recv(&mut self) -> Option<Frame> {
            self.rx.try_recv().ok()
        }

        /// Next envelope from the server
        ///
        /// Pings are answered with pongs along the way, like a browser does.
        /// Returns `None` on a close frame or when the server side is gone.
        pub async fn recv_envelope(&mut self) -> Option<Envelope> {
            loop {
                match self.rx.recv().await? {
                    Frame::Ping(payload) => {
                        let _ = self.send(Frame::Pong(payload)).await;
                    }
                    Frame::Text(text) => return Envelope::decode(text.as_bytes()).ok(),
                    Frame::Binary(bytes) => return Envelope::decode(&bytes).ok(),
                    Frame::Pong(_) => {}
                    Frame::Close(_) => return None,
                }
            }
        }

        /// Stop sending; the server's reader sees the end of the stream
        pub fn hang_up(&mut self) {
            self.tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::pair;
    use super::*;
    use crate::core::envelope::Envelope;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_signal_first_caller_wins() {
        let signal = CloseSignal::new();
        let other = signal.clone();

        assert!(!signal.is_closed());
        assert!(signal.close());
        assert!(!other.close());
        assert!(other.is_closed());
    }

    #[tokio::test]
    async fn test_close_signal_wakes_waiter() {
        let signal = CloseSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move { waiter.closed().await });
        tokio::task::yield_now().await;
        signal.close();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_returns_immediately_when_already_closed() {
        let signal = CloseSignal::new();
        signal.close();
        tokio::time::timeout(Duration::from_millis(100), signal.closed())
            .await
            .expect("already closed");
    }

    #[tokio::test]
    async fn test_memory_pair_roundtrip() {
        let (mut reader, mut writer, mut peer) = pair(4);

        peer.send(Frame::Text("hello".into())).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), Frame::Text("hello".into()));

        writer
            .write_frame(Frame::Text(Envelope::new("hi", "A").encode().unwrap()))
            .await
            .unwrap();
        let env = peer.recv_envelope().await.unwrap();
        assert_eq!(env.data(), "hi");
    }

    #[tokio::test]
    async fn test_memory_peer_answers_pings() {
        let (mut reader, mut writer, mut peer) = pair(4);

        writer.write_frame(Frame::Ping(vec![1])).await.unwrap();
        writer
            .write_frame(Frame::Text(Envelope::new("x", "y").encode().unwrap()))
            .await
            .unwrap();

        assert!(peer.recv_envelope().await.is_some());
        assert_eq!(reader.read_frame().await.unwrap(), Frame::Pong(vec![1]));
    }

    #[tokio::test]
    async fn test_hang_up_ends_reader() {
        let (mut reader, _writer, mut peer) = pair(1);
        peer.hang_up();

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Transport(TransportError::Closed { code: None })
        ));
    }

    #[tokio::test]
    async fn test_writer_close_ends_peer_stream() {
        let (_reader, mut writer, mut peer) = pair(1);

        writer.close().await.unwrap();
        assert!(writer.is_closed());
        assert!(peer.recv().await.is_none());
        assert!(writer.write_frame(Frame::Ping(vec![])).await.is_err());
    }

    #[test]
    fn test_frame_payload() {
        assert_eq!(Frame::Text("ab".into()).payload(), Some(&b"ab"[..]));
        assert_eq!(Frame::Binary(vec![1, 2]).payload(), Some(&[1u8, 2][..]));
        assert!(Frame::Ping(vec![]).payload().is_none());
        assert!(Frame::Close(Some(1000)).payload().is_none());
    }
}
