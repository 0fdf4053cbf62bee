//! Outbound queue → socket, plus heartbeat requests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use metrics::counter;
use tether_core::Frame;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::Connection;
use crate::error::TransportError;
use crate::socket::FrameSink;

/// Why the write pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteExit {
    /// The outbound queue was closed and drained; a close frame was attempted.
    QueueClosed,
    /// The socket was closed by the other pump or by teardown.
    SocketClosed,
    /// A write failed or missed its deadline.
    Failed(TransportError),
}

impl fmt::Display for WriteExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueClosed => f.write_str("outbound queue closed"),
            Self::SocketClosed => f.write_str("socket closed"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Closes the socket and the queue when dropped, so a pump that panics or is
/// aborted mid-write still stops the read pump.
struct CloseOnExit<'a>(&'a Connection);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        let _ = self.0.closer.close();
        let _ = self.0.close();
    }
}

/// Drain the outbound queue into the socket until either side closes.
///
/// Whatever the exit reason, the socket is closed and the queue stops
/// accepting payloads before this returns or unwinds.
pub(super) async fn run(
    conn: Arc<Connection>,
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<Bytes>,
) -> WriteExit {
    let _guard = CloseOnExit(&conn);
    let period = conn.limits.heartbeat_period;
    let write_timeout = conn.limits.write_timeout;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        // Unbiased: queue and heartbeat are served in arrival order.
        tokio::select! {
            () = conn.closer.closed() => break WriteExit::SocketClosed,
            _ = heartbeat.tick() => {
                if let Err(e) = write(&mut sink, Frame::ping(), write_timeout).await {
                    break WriteExit::Failed(e);
                }
                counter!("ws_heartbeats_sent_total").increment(1);
                trace!(conn_id = %conn.id, "heartbeat sent");
            }
            next = outbound.recv() => match next {
                Some(payload) => {
                    if let Err(e) = write(&mut sink, Frame::Data(payload), write_timeout).await {
                        break WriteExit::Failed(e);
                    }
                }
                None => {
                    if let Err(e) = write(&mut sink, Frame::Close, write_timeout).await {
                        debug!(conn_id = %conn.id, error = %e, "close frame not delivered");
                    }
                    break WriteExit::QueueClosed;
                }
            },
        }
    };

    match &exit {
        WriteExit::Failed(e) => warn!(conn_id = %conn.id, error = %e, "write pump failed"),
        other => debug!(conn_id = %conn.id, reason = %other, "write pump finishing"),
    }

    if conn.closer.close() {
        debug!(conn_id = %conn.id, "socket closed by write pump");
    }
    let _ = conn.close();
    outbound.close();
    let _ = timeout(write_timeout, sink.close()).await;
    exit
}

async fn write(sink: &mut FrameSink, frame: Frame, deadline: Duration) -> Result<(), TransportError> {
    let kind = frame.kind();
    match timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => {
            counter!("ws_frames_sent_total", "kind" => kind.as_str()).increment(1);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Err(TransportError::WriteTimeout),
    }
}
