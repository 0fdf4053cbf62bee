//! # tether-settings
//!
//! Configuration management with layered sources for tether.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **User file**: `~/.tether/settings.json` (merged over defaults key by key)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! After loading, [`TetherSettings::validate`] clamps numeric values into the
//! ranges a connection can run with and rejects values it cannot correct
//! with [`SettingsError::InvalidValue`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, load_settings, load_settings_from_path, merge_layer, parse_bool, parse_in_range,
    settings_path,
};
pub use types::*;
