//! Message routing seam between connections and application code.
//!
//! A [`Router`] decodes inbound payloads, encodes outbound events, and
//! observes connection lifecycle. [`EventRouter`] is the stock implementation:
//! a JSON `{"event": ..., "data": ...}` envelope dispatched to named handlers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::EncodeError;

/// Decodes inbound payloads and encodes outbound events for a connection.
///
/// `parse` runs on the connection's read task. Long work should be spawned;
/// while `parse` runs, no further frames are read from that socket.
pub trait Router: Send + Sync + 'static {
    /// Handle one inbound payload.
    fn parse(&self, connection: &Arc<Connection>, payload: Bytes);

    /// Encode an event for the wire.
    fn prepare_for_emit(&self, event: &str, data: &Value) -> Result<Bytes, EncodeError>;

    /// Called after the connection is registered and its write pump started.
    fn on_connected(&self, _connection: &Arc<Connection>) {}

    /// Called exactly once when the connection terminates.
    fn on_closed(&self, connection: &Arc<Connection>);
}

/// Handler for one named event.
pub type EventHandler = Arc<dyn Fn(&Arc<Connection>, Value) + Send + Sync>;

/// Lifecycle hook.
pub type LifecycleHook = Arc<dyn Fn(&Arc<Connection>) + Send + Sync>;

#[derive(Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    event: &'a str,
    data: &'a Value,
}

/// JSON envelope router with per-event handlers.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, EventHandler>,
    on_connect: Option<LifecycleHook>,
    on_close: Option<LifecycleHook>,
}

impl EventRouter {
    /// Empty router: every inbound event is logged and dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `event`.
    #[must_use]
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Connection>, Value) + Send + Sync + 'static,
    {
        let _ = self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    /// Hook run when a connection starts.
    #[must_use]
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Hook run once when a connection terminates.
    #[must_use]
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }

    /// Whether a handler is registered for `event`.
    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }
}

impl Router for EventRouter {
    fn parse(&self, connection: &Arc<Connection>, payload: Bytes) {
        let envelope: InboundEnvelope = match serde_json::from_slice(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = %connection.id(), error = %e, "malformed inbound envelope");
                return;
            }
        };
        match self.handlers.get(&envelope.event) {
            Some(handler) => {
                trace!(conn_id = %connection.id(), event = %envelope.event, "dispatching event");
                handler(connection, envelope.data);
            }
            None => debug!(conn_id = %connection.id(), event = %envelope.event, "no handler for event"),
        }
    }

    fn prepare_for_emit(&self, event: &str, data: &Value) -> Result<Bytes, EncodeError> {
        let json = serde_json::to_vec(&OutboundEnvelope { event, data })?;
        Ok(Bytes::from(json))
    }

    fn on_connected(&self, connection: &Arc<Connection>) {
        if let Some(hook) = &self.on_connect {
            hook(connection);
        }
    }

    fn on_closed(&self, connection: &Arc<Connection>) {
        if let Some(hook) = &self.on_close {
            hook(connection);
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        events.sort_unstable();
        f.debug_struct("EventRouter").field("events", &events).finish_non_exhaustive()
    }
}
