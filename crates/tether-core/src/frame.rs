//! Logical frame kinds exchanged over a connection.
//!
//! The binary framing is owned by the WebSocket library; a connection only
//! needs to tell application data apart from liveness probes and the close
//! handshake.

use bytes::Bytes;

/// One message on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Application payload.
    Data(Bytes),
    /// Heartbeat request.
    Ping(Bytes),
    /// Heartbeat reply.
    Pong(Bytes),
    /// Close handshake.
    Close,
}

/// Discriminant of a [`Frame`], used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// See [`Frame::Data`].
    Data,
    /// See [`Frame::Ping`].
    Ping,
    /// See [`Frame::Pong`].
    Pong,
    /// See [`Frame::Close`].
    Close,
}

impl Frame {
    /// Build a data frame from anything convertible into [`Bytes`].
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self::Data(payload.into())
    }

    /// Empty heartbeat request.
    pub fn ping() -> Self {
        Self::Ping(Bytes::new())
    }

    /// Empty heartbeat reply.
    pub fn pong() -> Self {
        Self::Pong(Bytes::new())
    }

    /// Kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Data(_) => FrameKind::Data,
            Self::Ping(_) => FrameKind::Ping,
            Self::Pong(_) => FrameKind::Pong,
            Self::Close => FrameKind::Close,
        }
    }

    /// Payload length in bytes (zero for close frames).
    pub fn len(&self) -> usize {
        match self {
            Self::Data(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close => 0,
        }
    }

    /// Whether the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameKind {
    /// Lowercase label, stable for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Frame::data("x").kind(), FrameKind::Data);
        assert_eq!(Frame::ping().kind(), FrameKind::Ping);
        assert_eq!(Frame::pong().kind(), FrameKind::Pong);
        assert_eq!(Frame::Close.kind(), FrameKind::Close);
    }

    #[test]
    fn len_reports_payload_size() {
        assert_eq!(Frame::data("hello").len(), 5);
        assert!(Frame::ping().is_empty());
        assert!(Frame::Close.is_empty());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(FrameKind::Data.to_string(), "data");
        assert_eq!(FrameKind::Close.as_str(), "close");
    }
}
