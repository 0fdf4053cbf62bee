//! Connection identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one live connection for registry membership and log correlation.
///
/// Generated ids are `conn_` followed by a UUIDv7, so they sort by creation
/// time. Ids received from elsewhere are wrapped as-is.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

const PREFIX: &str = "conn_";

impl ConnectionId {
    /// Fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("{PREFIX}{}", Uuid::now_v7()))
    }

    /// Wrap an existing id without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was minted by [`ConnectionId::new`] (carries the prefix).
    pub fn is_generated(&self) -> bool {
        self.0.starts_with(PREFIX)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s))
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
