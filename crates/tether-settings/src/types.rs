//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields get their default value.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Per-connection timing and sizing.
    pub connection: ConnectionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TetherSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            connection: ConnectionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TetherSettings {
    /// Bring values into the ranges a connection can run with.
    ///
    /// Numeric values outside their range are clamped with a warning. Values
    /// that cannot be corrected (an empty bind host, a WebSocket route that
    /// shadows `/health`) are rejected.
    pub fn validate(&mut self) -> Result<()> {
        let conn = &mut self.connection;
        conn.read_timeout_ms = clamp("readTimeoutMs", conn.read_timeout_ms, MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS);
        conn.write_timeout_ms = clamp("writeTimeoutMs", conn.write_timeout_ms, 1, MAX_WRITE_TIMEOUT_MS);
        conn.max_message_size = clamp("maxMessageSize", conn.max_message_size, 1, MAX_MESSAGE_SIZE);
        conn.send_queue_capacity = clamp("sendQueueCapacity", conn.send_queue_capacity, 1, MAX_SEND_QUEUE_CAPACITY);

        let server = &mut self.server;
        if server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                key: "server.host",
                reason: "bind host must not be empty".into(),
            });
        }
        if !server.ws_path.starts_with('/') {
            server.ws_path.insert(0, '/');
        }
        if server.ws_path == HEALTH_PATH {
            return Err(SettingsError::InvalidValue {
                key: "server.wsPath",
                reason: format!("{HEALTH_PATH} is reserved for the health check"),
            });
        }
        Ok(())
    }
}

fn clamp<T: Copy + PartialOrd + std::fmt::Display>(key: &str, value: T, min: T, max: T) -> T {
    if value < min {
        tracing::warn!(key, %value, %min, "setting below minimum, clamped");
        min
    } else if value > max {
        tracing::warn!(key, %value, %max, "setting above maximum, clamped");
        max
    } else {
        value
    }
}

/// Smallest read timeout that still leaves room for a heartbeat period.
pub const MIN_READ_TIMEOUT_MS: u64 = 1_000;
/// Largest read timeout (one hour).
pub const MAX_READ_TIMEOUT_MS: u64 = 3_600_000;
/// Largest write timeout (ten minutes).
pub const MAX_WRITE_TIMEOUT_MS: u64 = 600_000;
/// Largest inbound message cap (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
/// Largest outbound queue capacity.
pub const MAX_SEND_QUEUE_CAPACITY: usize = 1_000_000;
/// Route served by the health check.
pub const HEALTH_PATH: &str = "/health";

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` binds an ephemeral port.
    pub port: u16,
    /// Route that accepts WebSocket upgrades.
    pub ws_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9091,
            ws_path: "/ws".to_string(),
        }
    }
}

/// Per-connection timing and sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Time allowed between heartbeat replies before the peer is considered dead.
    pub read_timeout_ms: u64,
    /// Time allowed for a single frame write.
    pub write_timeout_ms: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity, in messages.
    pub send_queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            max_message_size: 512,
            send_queue_capacity: 512,
        }
    }
}

impl ConnectionSettings {
    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write timeout as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Heartbeat period: nine tenths of the read timeout.
    pub fn heartbeat_period(&self) -> Duration {
        self.read_timeout() / 10 * 9
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"tether_server": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}
