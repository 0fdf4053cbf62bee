//! Settings loading: defaults, then the user file, then `TETHER_*` variables.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If the settings file exists, merge it over the defaults key by key
//! 3. Apply `TETHER_*` environment variable overrides (highest priority)
//! 4. [`TetherSettings::validate`]

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{
    TetherSettings, MAX_MESSAGE_SIZE, MAX_READ_TIMEOUT_MS, MAX_SEND_QUEUE_CAPACITY, MAX_WRITE_TIMEOUT_MS,
    MIN_READ_TIMEOUT_MS,
};

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; an unreadable or malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<TetherSettings> {
    let mut merged = serde_json::to_value(TetherSettings::default())?;

    if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layer: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        merge_layer(&mut merged, layer);
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    Ok(serde_json::from_value(merged)?)
}

/// Merge `layer` into `base` in place.
///
/// Objects merge per key, anything else in `layer` replaces the value in
/// `base`. A `null` in `layer` leaves the base value alone.
pub fn merge_layer(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(slot) => merge_layer(slot, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `TETHER_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Unparseable or out-of-range values are ignored with a warning and leave the
/// file/default value in place.
pub fn apply_overrides(settings: &mut TetherSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

    let server = &mut settings.server;
    if let Some(host) = var("TETHER_HOST") {
        server.host = host;
    }
    if let Some(port) = var("TETHER_PORT").and_then(|raw| checked("TETHER_PORT", &raw, parse_in_range(&raw, 0..=u16::MAX))) {
        server.port = port;
    }
    if let Some(path) = var("TETHER_WS_PATH") {
        server.ws_path = path;
    }

    let conn = &mut settings.connection;
    if let Some(ms) = var("TETHER_READ_TIMEOUT_MS").and_then(|raw| {
        checked("TETHER_READ_TIMEOUT_MS", &raw, parse_in_range(&raw, MIN_READ_TIMEOUT_MS..=MAX_READ_TIMEOUT_MS))
    }) {
        conn.read_timeout_ms = ms;
    }
    if let Some(ms) = var("TETHER_WRITE_TIMEOUT_MS")
        .and_then(|raw| checked("TETHER_WRITE_TIMEOUT_MS", &raw, parse_in_range(&raw, 1..=MAX_WRITE_TIMEOUT_MS)))
    {
        conn.write_timeout_ms = ms;
    }
    if let Some(size) = var("TETHER_MAX_MESSAGE_SIZE")
        .and_then(|raw| checked("TETHER_MAX_MESSAGE_SIZE", &raw, parse_in_range(&raw, 1..=MAX_MESSAGE_SIZE)))
    {
        conn.max_message_size = size;
    }
    if let Some(capacity) = var("TETHER_SEND_QUEUE_CAPACITY").and_then(|raw| {
        checked("TETHER_SEND_QUEUE_CAPACITY", &raw, parse_in_range(&raw, 1..=MAX_SEND_QUEUE_CAPACITY))
    }) {
        conn.send_queue_capacity = capacity;
    }

    let logging = &mut settings.logging;
    if let Some(level) = var("TETHER_LOG_LEVEL") {
        logging.level = level;
    }
    if let Some(json) = var("TETHER_LOG_JSON").and_then(|raw| checked("TETHER_LOG_JSON", &raw, parse_bool(&raw))) {
        logging.json = json;
    }
}

fn checked<T>(key: &str, raw: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        tracing::warn!(key, value = %raw, "invalid env var, ignoring");
    }
    value
}

/// Parse a boolean flag.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and accept it only inside `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    range.contains(&n).then_some(n)
}
