//! Per-connection lifecycle: one socket, one bounded outbound queue, two pumps.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `closer` | Single-close guard shared by both pumps |
//! | `read_pump` | Socket → router, heartbeat replies, read deadline |
//! | `write_pump` | Outbound queue → socket, heartbeat requests, write deadline |
//! | `teardown` | Exactly-once unregister / close / `on_closed` sequence |
//!
//! ## Lifecycle
//!
//! [`Connection::create`] allocates the queue and stores the socket halves.
//! [`Connection::run`] registers the connection, spawns the write pump and
//! drives the read pump on the caller's task. Whichever pump fails first
//! closes the socket through [`SocketCloser`], which stops the other.

mod closer;
mod read_pump;
mod teardown;
mod write_pump;

pub use closer::SocketCloser;
pub use read_pump::ReadExit;
pub use write_pump::WriteExit;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tether_core::ConnectionId;
use tether_settings::ConnectionSettings;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, EncodeError};
use crate::registry::Registry;
use crate::router::Router;
use crate::socket::{FrameSink, FrameStream, Socket};

use teardown::Teardown;

/// Timing and sizing constants for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Deadline for the next heartbeat reply.
    pub read_timeout: Duration,
    /// Deadline for each frame write.
    pub write_timeout: Duration,
    /// Interval between heartbeat requests; must be non-zero and shorter
    /// than `read_timeout`.
    pub heartbeat_period: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity, in messages.
    pub send_queue_capacity: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

impl From<&ConnectionSettings> for ConnectionLimits {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            read_timeout: settings.read_timeout(),
            write_timeout: settings.write_timeout(),
            heartbeat_period: settings.heartbeat_period(),
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity,
        }
        .normalized()
    }
}

/// Shortest timeout a connection runs with.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

impl ConnectionLimits {
    /// Repair values the pumps cannot run with.
    ///
    /// A heartbeat period that is zero or not shorter than the read timeout
    /// becomes nine tenths of the read timeout, timeouts are at least one
    /// millisecond, and the queue holds at least one message.
    pub fn normalized(mut self) -> Self {
        self.read_timeout = self.read_timeout.max(MIN_TIMEOUT);
        self.write_timeout = self.write_timeout.max(MIN_TIMEOUT);
        if self.heartbeat_period.is_zero() || self.heartbeat_period >= self.read_timeout {
            let fallback = self.read_timeout / 10 * 9;
            warn!(
                configured = ?self.heartbeat_period,
                read_timeout = ?self.read_timeout,
                heartbeat_period = ?fallback,
                "heartbeat period must be non-zero and below the read timeout"
            );
            self.heartbeat_period = fallback;
        }
        self.send_queue_capacity = self.send_queue_capacity.max(1);
        self
    }

    /// tungstenite settings that cap message and frame size at
    /// `max_message_size`, for streams passed to [`Socket::from_tungstenite`].
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.max_message_size))
            .max_frame_size(Some(self.max_message_size))
    }
}

/// Result of [`Connection::emit`].
///
/// Serialization failures follow the discard-on-serialize-error policy: the
/// event is dropped and reported here, never as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The payload was enqueued.
    Queued,
    /// Serialization failed; nothing was enqueued.
    DiscardedOnSerializeError,
    /// The queue was full and the payload was dropped (non-blocking emits
    /// only). The connection is still live.
    Full,
    /// The connection no longer accepts sends.
    Closed,
}

/// Socket halves and queue receiver, moved into the pumps by `run`.
struct PumpParts {
    sink: FrameSink,
    stream: FrameStream,
    outbound_rx: mpsc::Receiver<Bytes>,
}

/// One persistent duplex connection.
pub struct Connection {
    id: ConnectionId,
    limits: ConnectionLimits,
    router: Arc<dyn Router>,
    registry: Arc<dyn Registry>,
    /// `None` once the outbound queue is closed.
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    /// `None` once `run` has started.
    pumps: Mutex<Option<PumpParts>>,
    closer: SocketCloser,
    dropped: AtomicU64,
}

impl Connection {
    /// Wrap an upgraded socket. No I/O is performed until [`Connection::run`].
    ///
    /// `limits` pass through [`ConnectionLimits::normalized`] first.
    pub fn create(
        socket: Socket,
        router: Arc<dyn Router>,
        registry: Arc<dyn Registry>,
        limits: ConnectionLimits,
    ) -> Arc<Self> {
        let limits = limits.normalized();
        let (tx, outbound_rx) = mpsc::channel(limits.send_queue_capacity);
        let (sink, stream) = socket.into_parts();
        Arc::new(Self {
            id: ConnectionId::new(),
            limits,
            router,
            registry,
            outbound: Mutex::new(Some(tx)),
            pumps: Mutex::new(Some(PumpParts {
                sink,
                stream,
                outbound_rx,
            })),
            closer: SocketCloser::new(),
            dropped: AtomicU64::new(0),
        })
    }

    /// Register, start both pumps, and wait until the connection terminates.
    ///
    /// The write pump runs as a spawned task; the read pump runs on the
    /// caller's task. When the read pump exits the connection is unregistered,
    /// its queue and socket are closed, and the router's `on_closed` hook runs.
    /// Dropping the returned future early performs the same teardown.
    pub async fn run(self: Arc<Self>) -> Result<(), ConnectionError> {
        let Some(parts) = self.pumps.lock().take() else {
            return Err(ConnectionError::AlreadyRunning(self.id.clone()));
        };
        let PumpParts {
            sink,
            stream,
            outbound_rx,
        } = parts;

        self.registry.register(Arc::clone(&self));
        info!(conn_id = %self.id, "connection registered");

        let writer = tokio::spawn(write_pump::run(Arc::clone(&self), sink, outbound_rx));
        let teardown = Teardown::new(Arc::clone(&self), writer);
        self.router.on_connected(&self);

        let exit = read_pump::run(&self, stream).await;
        teardown.finish(exit).await;
        Ok(())
    }

    /// Enqueue a raw payload, waiting while the queue is full.
    ///
    /// Returns `false` without blocking once the connection has terminated.
    pub async fn send(&self, payload: impl Into<Bytes>) -> bool {
        let Some(tx) = self.outbound.lock().clone() else {
            return false;
        };
        tx.send(payload.into()).await.is_ok()
    }

    /// Enqueue a raw payload without waiting. A full queue counts as a drop.
    pub fn try_send(&self, payload: impl Into<Bytes>) -> bool {
        self.try_enqueue(payload.into()) == EmitOutcome::Queued
    }

    /// [`Connection::try_send`] that tells a full queue apart from a closed one.
    ///
    /// Returns `Queued`, `Full` or `Closed`.
    pub(crate) fn try_enqueue(&self, payload: Bytes) -> EmitOutcome {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return EmitOutcome::Closed;
        };
        match tx.try_send(payload) {
            Ok(()) => EmitOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("ws_send_drops_total").increment(1);
                EmitOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => EmitOutcome::Closed,
        }
    }

    /// Serialize an event through the router and enqueue it like [`Connection::send`].
    pub async fn emit<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> EmitOutcome {
        match self.prepare(event, data) {
            Ok(payload) => {
                if self.send(payload).await {
                    EmitOutcome::Queued
                } else {
                    EmitOutcome::Closed
                }
            }
            Err(e) => self.discard(event, &e),
        }
    }

    /// Non-blocking [`Connection::emit`]; a full queue reports `Full` and counts a drop.
    pub fn try_emit<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> EmitOutcome {
        match self.prepare(event, data) {
            Ok(payload) => self.try_enqueue(payload),
            Err(e) => self.discard(event, &e),
        }
    }

    /// Close the outbound queue. Pending payloads are still written, then a
    /// close frame is sent and the connection tears down.
    ///
    /// Returns `true` for the call that closed the queue.
    pub fn close(&self) -> bool {
        let closed = self.outbound.lock().take().is_some();
        if closed {
            debug!(conn_id = %self.id, "outbound queue closed");
        }
        closed
    }

    /// Connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Configured limits.
    pub fn limits(&self) -> &ConnectionLimits {
        &self.limits
    }

    /// Whether the socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Payloads refused by [`Connection::try_send`] because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn prepare<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<Bytes, EncodeError> {
        let value = serde_json::to_value(data)?;
        self.router.prepare_for_emit(event, &value)
    }

    fn discard(&self, event: &str, error: &EncodeError) -> EmitOutcome {
        debug!(conn_id = %self.id, event, error = %error, "discarding emit");
        EmitOutcome::DiscardedOnSerializeError
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.closer.is_closed())
            .finish_non_exhaustive()
    }
}
