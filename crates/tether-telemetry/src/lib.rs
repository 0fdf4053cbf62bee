//! # tether-telemetry
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] built from the
//! configured levels (overridden by `RUST_LOG`) feeding either a JSON or a
//! human-readable fmt layer.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `"tether_server"` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of pretty text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from level names, skipping names that do not parse.
    pub fn from_names<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a str, &'a str)>,
        json: bool,
    ) -> Self {
        let log_level = Level::from_str(level).unwrap_or_else(|_| {
            eprintln!("tether-telemetry: unknown log level {level:?}, using info");
            Level::INFO
        });
        let module_levels = modules
            .into_iter()
            .filter_map(|(module, lvl)| Level::from_str(lvl).ok().map(|l| (module.to_string(), l)))
            .collect();
        Self {
            log_level,
            module_levels,
            json,
        }
    }

    /// Directive string handed to [`EnvFilter`] when `RUST_LOG` is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}
