//! Client session: one connection, one outbound queue, two loops
//!
//! ```text
//!                ┌──────────── inbound loop ─────────────┐
//! FrameReader ──▶│ size check ─▶ decode ─▶ hub.broadcast │
//!                │ pong ─▶ refresh read deadline         │
//!                └──── on exit: hub.leave + close ───────┘
//!
//!                ┌──────────── outbound loop ────────────┐
//! QueueReceiver ▶│ envelope ─▶ text frame                │──▶ FrameWriter
//! ping ticker ──▶│ tick ─▶ ping frame                    │
//!                └──── on exit: close writer ────────────┘
//! ```
//!
//! The session registers with the hub before either loop starts. From then
//! on it only talks to the hub through [`HubHandle`]; it never touches
//! another session's queue. The inbound loop is the one that reports `leave`.
//! The outbound loop only closes the connection, which ends the inbound read
//! through the shared [`CloseSignal`].

use super::connection::{CloseSignal, Frame, FrameReader, FrameWriter};
use super::diagnostics::{Diagnostic, DiagnosticEvent, DiagnosticSink, Severity};
use super::envelope::Envelope;
use super::error::{ProtocolError, RelayError, TransportError};
use super::hub::HubHandle;
use super::queue::{QueueReceiver, outbound_queue};
use crate::config::SessionConfig;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Identity of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// A connection that has not been registered with the hub yet
pub struct ClientSession<R, W> {
    id: SessionId,
    reader: R,
    writer: W,
    config: SessionConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl<R: FrameReader, W: FrameWriter> ClientSession<R, W> {
    pub fn new(reader: R, writer: W, config: SessionConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            id: SessionId::new(),
            reader,
            writer,
            config,
            sink,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Register with the hub, then spawn the inbound and outbound loops
    ///
    /// Fails with [`RelayError::Config`] if the session policy is unusable
    /// and with [`RelayError::HubStopped`] if the hub is gone. The
    /// connection is closed in both cases and no loop is started.
    pub async fn start(self, hub: &HubHandle) -> Result<SessionHandle, RelayError> {
        let ClientSession {
            id,
            reader,
            mut writer,
            config,
            sink,
        } = self;

        if let Err(e) = config.validate() {
            let _ = writer.close().await;
            return Err(e.into());
        }

        let (queue, receiver) = outbound_queue(config.queue_capacity);
        if let Err(e) = hub.join(id, queue).await {
            let _ = writer.close().await;
            return Err(e);
        }

        let signal = CloseSignal::new();

        let outbound = tokio::spawn(run_outbound(
            id,
            writer,
            receiver,
            signal.clone(),
            config.clone(),
            sink.clone(),
        ));
        let inbound = tokio::spawn(run_inbound(id, reader, hub.clone(), signal, config, sink));

        Ok(SessionHandle {
            id,
            inbound,
            outbound,
        })
    }
}

/// Handles to the two running loops of a session
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.inbound.is_finished() && self.outbound.is_finished()
    }

    /// Wait for both loops to exit
    ///
    /// A loop that panicked or was aborted is reported as
    /// [`RelayError::Internal`] once both loops are done.
    pub async fn wait(self) -> Result<(), RelayError> {
        let inbound = self.inbound.await;
        let outbound = self.outbound.await;

        for (name, result) in [("inbound", inbound), ("outbound", outbound)] {
            if let Err(e) = result {
                return Err(RelayError::Internal(format!(
                    "{} loop of {} failed: {}",
                    name, self.id, e
                )));
            }
        }
        Ok(())
    }
}

/// Why the inbound loop stopped
enum InboundExit {
    Failed(RelayError),
    LocalClose,
}

impl From<TransportError> for InboundExit {
    fn from(e: TransportError) -> Self {
        InboundExit::Failed(e.into())
    }
}

impl From<ProtocolError> for InboundExit {
    fn from(e: ProtocolError) -> Self {
        InboundExit::Failed(e.into())
    }
}

/// Read frames until the connection dies, forwarding envelopes to the hub
///
/// The read deadline starts at `pong_wait` and is only pushed back by pongs,
/// so a peer that stops answering pings is dropped even if it keeps sending
/// data.
pub async fn run_inbound<R: FrameReader>(
    id: SessionId,
    mut reader: R,
    hub: HubHandle,
    signal: CloseSignal,
    config: SessionConfig,
    sink: Arc<dyn DiagnosticSink>,
) {
    let pong_wait = config.pong_wait();
    let mut deadline = Instant::now() + pong_wait;

    let exit = loop {
        let read = tokio::select! {
            _ = signal.closed() => break InboundExit::LocalClose,
            read = tokio::time::timeout_at(deadline, reader.read_frame()) => read,
        };

        let frame = match read {
            Err(_elapsed) => break InboundExit::from(TransportError::HeartbeatTimedOut(pong_wait)),
            Ok(Err(e)) if e.is_fatal_to_session() => break InboundExit::Failed(e),
            Ok(Err(e)) => {
                report_dropped_frame(id, &e, sink.as_ref());
                continue;
            }
            Ok(Ok(frame)) => frame,
        };

        let payload = match &frame {
            Frame::Pong(_) => {
                deadline = Instant::now() + pong_wait;
                continue;
            }
            // The transport answers pings itself.
            Frame::Ping(_) => continue,
            Frame::Close(code) => break InboundExit::from(TransportError::Closed { code: *code }),
            Frame::Text(_) | Frame::Binary(_) => frame.payload().unwrap_or_default(),
        };

        if payload.len() > config.max_frame_size {
            break InboundExit::from(ProtocolError::FrameTooLarge {
                size: payload.len(),
                limit: config.max_frame_size,
            });
        }

        let envelope = match Envelope::decode(payload).map_err(RelayError::from) {
            Ok(envelope) => envelope,
            Err(e) if e.is_fatal_to_session() => break InboundExit::Failed(e),
            Err(e) => {
                report_dropped_frame(id, &e, sink.as_ref());
                continue;
            }
        };
        let envelope = if config.stamp_arrival {
            envelope.stamp_if_absent(Utc::now())
        } else {
            envelope
        };

        if let Err(e) = hub.broadcast(envelope).await {
            break InboundExit::Failed(e);
        }
    };

    report_inbound_exit(id, &exit, sink.as_ref());

    let _ = hub.leave(id).await;
    signal.close();
}

fn report_dropped_frame(id: SessionId, error: &RelayError, sink: &dyn DiagnosticSink) {
    sink.emit(
        Diagnostic::new(DiagnosticEvent::MalformedEnvelope, Severity::Warn)
            .session(id)
            .error(error),
    );
}

fn report_inbound_exit(id: SessionId, exit: &InboundExit, sink: &dyn DiagnosticSink) {
    let error = match exit {
        InboundExit::LocalClose => {
            sink.emit(
                Diagnostic::new(DiagnosticEvent::ConnectionClosed, Severity::Debug)
                    .session(id)
                    .detail("closed by outbound loop"),
            );
            return;
        }
        InboundExit::Failed(e) => e,
    };

    let (event, severity) = match error {
        RelayError::Transport(TransportError::HeartbeatTimedOut(_)) => {
            (DiagnosticEvent::HeartbeatTimeout, Severity::Warn)
        }
        RelayError::Transport(e) if e.is_expected_closure() => {
            (DiagnosticEvent::ConnectionClosed, Severity::Debug)
        }
        RelayError::Protocol(ProtocolError::FrameTooLarge { .. }) => {
            (DiagnosticEvent::FrameTooLarge, Severity::Warn)
        }
        RelayError::HubStopped => (DiagnosticEvent::ConnectionClosed, Severity::Debug),
        _ => (DiagnosticEvent::UnexpectedClose, Severity::Warn),
    };
    sink.emit(Diagnostic::new(event, severity).session(id).error(error));
}

/// Drain the outbound queue to the writer, interleaved with pings
///
/// A closed queue means the hub removed this session: a close frame is
/// written on a best-effort basis before exiting. Any write failure ends the
/// loop without retry.
pub async fn run_outbound<W: FrameWriter>(
    id: SessionId,
    mut writer: W,
    mut queue: QueueReceiver,
    signal: CloseSignal,
    config: SessionConfig,
    sink: Arc<dyn DiagnosticSink>,
) {
    let ping_period = config.ping_period();
    let write_timeout = config.write_timeout();
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = signal.closed() => break,
            next = queue.recv() => {
                let Some(envelope) = next else {
                    let _ = write_with_deadline(&mut writer, Frame::Close(None), write_timeout).await;
                    break;
                };
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        sink.emit(
                            Diagnostic::new(DiagnosticEvent::WriteFailed, Severity::Error)
                                .session(id)
                                .error(&RelayError::from(e)),
                        );
                        continue;
                    }
                };
                if let Err(e) = write_with_deadline(&mut writer, Frame::Text(text), write_timeout).await {
                    sink.emit(
                        Diagnostic::new(DiagnosticEvent::WriteFailed, Severity::Debug)
                            .session(id)
                            .error(&e),
                    );
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write_with_deadline(&mut writer, Frame::Ping(Vec::new()), write_timeout).await {
                    sink.emit(
                        Diagnostic::new(DiagnosticEvent::PingFailed, Severity::Debug)
                            .session(id)
                            .error(&e),
                    );
                    break;
                }
            }
        }
    }

    signal.close();
    if let Err(e) = writer.close().await {
        sink.emit(
            Diagnostic::new(DiagnosticEvent::ConnectionClosed, Severity::Debug)
                .session(id)
                .error(&e),
        );
    }
}

async fn write_with_deadline<W: FrameWriter>(
    writer: &mut W,
    frame: Frame,
    timeout: Option<Duration>,
) -> Result<(), RelayError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, writer.write_frame(frame))
            .await
            .map_err(|_| TransportError::WriteTimedOut(limit))?,
        None => writer.write_frame(frame).await,
    }
}
