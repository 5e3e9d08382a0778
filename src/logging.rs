//! Logging initialization for simwatch.
//!
//! Configures the `tracing` subscriber with level filtering via the
//! `SIMWATCH_LOG` environment variable. Falls back to the configured
//! `[logging] log_level` when the variable is unset or invalid.
//!
//! # Usage
//!
//! ```bash
//! # Configured level (info unless changed)
//! simwatch run
//!
//! # Debug level
//! SIMWATCH_LOG=debug simwatch run
//!
//! # Module-specific filtering
//! SIMWATCH_LOG=simwatch::session=trace,warn simwatch run
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::schema::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV_VAR: &str = "SIMWATCH_LOG";

/// Builds the filter from `SIMWATCH_LOG`, or from `fallback` when unset.
pub fn env_filter(fallback: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(fallback.as_directive()))
}

/// Initialize the tracing subscriber.
///
/// Output goes to stderr; stdout carries rendered telemetry and may be
/// piped as JSON. Calling this twice is harmless: the second call leaves
/// the first subscriber in place.
pub fn init(fallback: LogLevel) {
    let _ = fmt()
        .with_env_filter(env_filter(fallback))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
