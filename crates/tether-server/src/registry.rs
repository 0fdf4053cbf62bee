//! Connection registry.
//!
//! [`Registry`] is the handshake seam a connection reports to when it starts
//! and terminates. [`Hub`] is the stock implementation: a concurrent map used
//! for lookups, fan-out and shutdown.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use tether_core::ConnectionId;
use tracing::{debug, info, warn};

use crate::connection::{Connection, EmitOutcome};

/// Lifetime drop count after which a slow connection is closed by fan-out.
const MAX_TOTAL_DROPS: u64 = 100;

/// Receives register / unregister notifications from connections.
///
/// Each is called exactly once per connection run, register before any
/// traffic and unregister during teardown.
pub trait Registry: Send + Sync + 'static {
    /// A connection started.
    fn register(&self, connection: Arc<Connection>);

    /// A connection terminated.
    fn unregister(&self, connection: &Arc<Connection>);
}

/// Live connections indexed by id.
#[derive(Default)]
pub struct Hub {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl Hub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Queue a raw payload on every connection without waiting.
    ///
    /// Returns how many connections accepted it. Connections whose lifetime
    /// drop count reaches the limit are closed. Connections that are already
    /// shutting down are skipped without counting a drop.
    pub fn broadcast(&self, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let mut delivered = 0;
        for conn in self.snapshot() {
            match conn.try_enqueue(payload.clone()) {
                EmitOutcome::Queued => delivered += 1,
                EmitOutcome::Full => self.note_drop(&conn),
                EmitOutcome::Closed | EmitOutcome::DiscardedOnSerializeError => {}
            }
        }
        debug!(delivered, "broadcast payload");
        delivered
    }

    /// Emit an event on every connection without waiting.
    pub fn emit_all<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> usize {
        let mut delivered = 0;
        for conn in self.snapshot() {
            match conn.try_emit(event, data) {
                EmitOutcome::Queued => delivered += 1,
                EmitOutcome::Full => self.note_drop(&conn),
                EmitOutcome::DiscardedOnSerializeError | EmitOutcome::Closed => {}
            }
        }
        debug!(event, delivered, "broadcast event");
        delivered
    }

    /// Close every connection's outbound queue. Each drains and tears down.
    pub fn close_all(&self) {
        let conns = self.snapshot();
        info!(count = conns.len(), "closing all connections");
        for conn in conns {
            let _ = conn.close();
        }
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    fn note_drop(&self, conn: &Arc<Connection>) {
        counter!("ws_broadcast_drops_total").increment(1);
        let drops = conn.drop_count();
        if drops >= MAX_TOTAL_DROPS {
            if conn.close() {
                warn!(conn_id = %conn.id(), drops, "disconnecting slow client");
            }
        } else {
            debug!(conn_id = %conn.id(), total_drops = drops, "send queue full, payload dropped");
        }
    }
}

impl Registry for Hub {
    fn register(&self, connection: Arc<Connection>) {
        let id = connection.id().clone();
        if self.connections.insert(id.clone(), connection).is_some() {
            warn!(conn_id = %id, "connection registered twice");
        }
        gauge!("ws_connections_active").set(self.connections.len() as f64);
    }

    fn unregister(&self, connection: &Arc<Connection>) {
        if self.connections.remove(connection.id()).is_some() {
            gauge!("ws_connections_active").set(self.connections.len() as f64);
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("connections", &self.connections.len()).finish()
    }
}
