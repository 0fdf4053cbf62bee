//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The merged layers do not fit the settings schema (wrong value types).
    #[error("settings do not match the schema: {0}")]
    Schema(#[from] serde_json::Error),
    /// A value is present but unusable and cannot be clamped.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Dotted settings key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/tether.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/tether.json"), "got: {msg}");
        assert!(msg.contains("denied"), "got: {msg}");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue {
            key: "server.host",
            reason: "bind host must not be empty".into(),
        };
        assert_eq!(err.to_string(), "invalid value for server.host: bind host must not be empty");
    }
}
