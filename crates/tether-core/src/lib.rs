//! # tether-core
//!
//! Foundation types shared by the tether crates.
//!
//! - **Branded IDs**: [`ids::ConnectionId`] newtype with a `conn_` prefix
//! - **Frames**: [`frame::Frame`], the four logical frame kinds a connection
//!   exchanges with its peer (data, ping, pong, close)
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `tether-server` and the binary.

#![deny(unsafe_code)]

pub mod frame;
pub mod ids;

pub use frame::{Frame, FrameKind};
pub use ids::ConnectionId;
