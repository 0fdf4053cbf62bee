//! Socket → router.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tether_core::Frame;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, trace};

use super::Connection;
use crate::error::TransportError;
use crate::socket::FrameStream;

/// Why the read pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadExit {
    /// The stream ended without a close frame.
    PeerGone,
    /// The peer sent a close frame.
    CloseFrame,
    /// The socket was closed locally (usually by the write pump).
    SocketClosed,
    /// A fatal transport error, including an expired read deadline.
    Failed(TransportError),
}

impl fmt::Display for ReadExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerGone => f.write_str("peer gone"),
            Self::CloseFrame => f.write_str("close frame received"),
            Self::SocketClosed => f.write_str("socket closed"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Read frames until the socket fails or closes.
///
/// Only heartbeat replies move the read deadline. Data frames go straight to
/// [`crate::Router::parse`]; a panic inside the router is logged and the loop
/// continues.
pub(super) async fn run(conn: &Arc<Connection>, mut stream: FrameStream) -> ReadExit {
    let read_timeout = conn.limits.read_timeout;
    let max_message_size = conn.limits.max_message_size;
    let mut deadline = Instant::now() + read_timeout;

    loop {
        let next = tokio::select! {
            biased;
            () = conn.closer.closed() => return ReadExit::SocketClosed,
            next = timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_elapsed) => return ReadExit::Failed(TransportError::ReadTimeout),
            Ok(None) => return ReadExit::PeerGone,
            Ok(Some(Err(e))) if e.is_fatal() => return ReadExit::Failed(e),
            Ok(Some(Err(e))) => {
                // TODO: a payload error may mean the stream is desynchronized; decide whether to escalate it.
                debug!(conn_id = %conn.id, error = %e, "skipping unreadable message");
                continue;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Pong(_) => {
                deadline = Instant::now() + read_timeout;
                trace!(conn_id = %conn.id, "heartbeat reply, read deadline extended");
            }
            Frame::Ping(_) => trace!(conn_id = %conn.id, "ping received"),
            Frame::Close => return ReadExit::CloseFrame,
            Frame::Data(payload) => {
                if payload.len() > max_message_size {
                    return ReadExit::Failed(TransportError::MessageTooLarge {
                        size: payload.len(),
                        limit: max_message_size,
                    });
                }
                dispatch(conn, payload);
            }
        }
    }
}

fn dispatch(conn: &Arc<Connection>, payload: Bytes) {
    let router = Arc::clone(&conn.router);
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| router.parse(conn, payload))) {
        error!(
            conn_id = %conn.id,
            panic = panic_message(panic.as_ref()),
            "router panicked while parsing a message"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
