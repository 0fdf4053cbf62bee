//! Error types for the connection core.

use tether_core::ConnectionId;
use tokio_tungstenite::tungstenite;

/// A failure observed on the socket by one of the pumps.
///
/// Everything except [`TransportError::Payload`] is fatal to the pump that
/// sees it and cascades into connection teardown.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer or the local side closed the socket.
    #[error("connection closed")]
    Closed,
    /// No heartbeat reply arrived before the read deadline.
    #[error("read deadline elapsed")]
    ReadTimeout,
    /// A frame could not be written before the write deadline.
    #[error("write deadline elapsed")]
    WriteTimeout,
    /// An inbound message exceeded the configured size cap.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Observed size.
        size: usize,
        /// Configured cap.
        limit: usize,
    },
    /// The WebSocket layer rejected the stream.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// One message could not be read; the stream itself is still usable.
    #[error("unreadable message: {0}")]
    Payload(String),
}

impl TransportError {
    /// Whether this error must terminate the pump that observed it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Payload(_))
    }
}

/// axum wraps the tungstenite error it got from the socket; unwrap it so the
/// fatal/per-message split is the same on both socket flavors.
impl From<axum::Error> for TransportError {
    fn from(e: axum::Error) -> Self {
        match e.into_inner().downcast::<tungstenite::Error>() {
            Ok(ws) => Self::from(*ws),
            Err(other) => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        match &e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
            tungstenite::Error::Io(io) => Self::Io(io.to_string()),
            tungstenite::Error::Utf8 { .. } => Self::Payload(e.to_string()),
            _ => Self::Protocol(e.to_string()),
        }
    }
}

/// Misuse of the connection lifecycle API.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// `run` was called on a connection whose pumps already started.
    #[error("connection {0} is already running")]
    AlreadyRunning(ConnectionId),
}

/// A router could not turn an event into a wire payload.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// JSON serialization failed.
    #[error("failed to serialize event data: {0}")]
    Json(#[from] serde_json::Error),
    /// The router refused the event.
    #[error("event {event:?} rejected: {reason}")]
    Rejected {
        /// Event name.
        event: String,
        /// Why it was refused.
        reason: String,
    },
}
