//! Connection Handles
//!
//! Every socket gets a bounded outbox drained by its own writer task. The
//! scheduler only ever calls [`ConnectionHandle::try_deliver`], which never
//! waits: a full outbox closes the connection instead of stalling the turn.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::network::protocol::ServerMessage;

/// Server-assigned connection identifier, unique for the process lifetime.
pub type ConnectionId = u64;

/// Reason sent when a slow reader is cut off.
pub const OVERFLOW_REASON: &str = "outbox overflow";

/// Item queued for the writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Pre-encoded JSON text frame
    Message(Arc<str>),
    /// Close the socket with this reason
    Close { reason: String },
}

/// Delivery failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbox full; the connection has been closed.
    #[error("outbox full")]
    Full,
    /// Writer task is gone.
    #[error("connection closed")]
    Closed,
    /// Message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Scheduler-side view of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    outbox: mpsc::Sender<Outbound>,
    kill: Arc<Notify>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end for its writer task.
    pub fn new(id: ConnectionId, addr: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Outbound>, Arc<Notify>) {
        let (outbox, rx) = mpsc::channel(capacity.max(1));
        let kill = Arc::new(Notify::new());
        let handle = Self { id, addr, outbox, kill: kill.clone() };
        (handle, rx, kill)
    }

    /// Queue a pre-encoded frame without waiting.
    pub fn try_deliver(&self, text: Arc<str>) -> Result<(), DeliveryError> {
        match self.outbox.try_send(Outbound::Message(text)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = self.id, addr = %self.addr, "Outbox full, closing connection");
                self.kill.notify_one();
                Err(DeliveryError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Encode and queue a message.
    pub fn send(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
        let text = message.to_json().map_err(|e| DeliveryError::Encode(e.to_string()))?;
        self.try_deliver(text.into())
    }

    /// Ask the writer to close the socket after flushing what is queued.
    pub fn close(&self, reason: impl Into<String>) {
        if self.outbox.try_send(Outbound::Close { reason: reason.into() }).is_err() {
            self.kill.notify_one();
        }
    }

    /// Resolves once the writer task has stopped.
    pub async fn closed(&self) {
        self.outbox.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

/// Close reasons must fit a control frame.
const MAX_CLOSE_REASON: usize = 123;

/// How long an overflowing peer gets to take its close frame.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

fn close_frame(code: CloseCode, mut reason: String) -> Message {
    if reason.len() > MAX_CLOSE_REASON {
        let mut cut = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }
    Message::Close(Some(CloseFrame { code, reason: Cow::Owned(reason) }))
}

/// Drain an outbox into a WebSocket sink until closed, killed, or the
/// socket fails. A kill also cuts short a send stuck on a stalled peer.
pub async fn run_writer<S>(mut sink: S, mut rx: mpsc::Receiver<Outbound>, kill: Arc<Notify>, id: ConnectionId)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let item = tokio::select! {
            biased;
            _ = kill.notified() => {
                let frame = close_frame(CloseCode::Policy, OVERFLOW_REASON.to_string());
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(frame)).await;
                break;
            }
            item = rx.recv() => item,
        };

        let (frame, last) = match item {
            Some(Outbound::Message(text)) => (Message::Text(text.to_string()), false),
            Some(Outbound::Close { reason }) => {
                let code = if reason.is_empty() { CloseCode::Normal } else { CloseCode::Policy };
                (close_frame(code, reason), true)
            }
            None => (close_frame(CloseCode::Away, String::new()), true),
        };

        tokio::select! {
            biased;
            _ = kill.notified() => {
                debug!(conn = id, "Writer killed mid-send");
                break;
            }
            result = sink.send(frame) => {
                if let Err(e) = result {
                    debug!(conn = id, "Write failed: {}", e);
                    break;
                }
            }
        }
        if last {
            break;
        }
    }
    rx.close();
    debug!(conn = id, "Writer stopped");
}
