//! # tether-server
//!
//! Persistent duplex WebSocket connections. Each [`Connection`] owns one
//! socket and one bounded outbound queue and runs two pumps: a read pump that
//! hands inbound payloads to a [`Router`] and enforces the read deadline, and
//! a write pump that drains the queue and sends heartbeat requests.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`connection`] | Connection lifecycle, pumps, teardown |
//! | [`socket`] | Frame sink/stream halves and transport adapters |
//! | [`router`] | Inbound parse / outbound encode seam, JSON event router |
//! | [`registry`] | Register/unregister seam, connection hub |
//! | [`server`] | Axum acceptor and health endpoint |
//! | [`error`] | Transport, lifecycle and encode errors |

#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod registry;
pub mod router;
pub mod server;
pub mod socket;

#[cfg(test)]
mod testutil;

pub use connection::{Connection, ConnectionLimits, EmitOutcome, ReadExit, SocketCloser, WriteExit};
pub use error::{ConnectionError, EncodeError, TransportError};
pub use registry::{Hub, Registry};
pub use router::{EventHandler, EventRouter, LifecycleHook, Router};
pub use server::{build_router, start, AppState, ServerHandle};
pub use socket::{FrameSink, FrameStream, Socket};
pub use tether_core::{ConnectionId, Frame, FrameKind};
