//! TOML configuration schema types for simwatch.
//!
//! All structs derive `Deserialize` and `Serialize` with defaults via
//! `#[serde(default)]`, so a partial file (or none at all) is valid.
//!
//! Duration fields use human-readable strings (e.g. `"10s"`, `"500ms"`)
//! parsed by the `humantime` crate at the call site.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sim_api::RunConfig;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration encompassing all sections.
///
/// ```toml
/// [server]
/// [logging]
/// [run]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where the simulation backend lives.
    pub server: ServerConfig,
    /// Log verbosity.
    pub logging: LoggingConfig,
    /// Run configuration submitted by `simwatch run`.
    pub run: RunConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Backend address and HTTP behavior from the `[server]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base address of the backend. The telemetry stream address is derived
    /// from it by switching the scheme to `ws`/`wss`.
    pub base_url: String,
    /// Timeout for each HTTP command, as a human-readable duration.
    pub request_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: "10s".to_string(),
        }
    }
}

/// Environment variable that overrides `[server] base_url`.
pub const URL_ENV_VAR: &str = "SIMWATCH_URL";

impl ServerConfig {
    /// The backend address to use: `flag` if given, else `SIMWATCH_URL`,
    /// else the configured `base_url`.
    pub fn effective_base_url(&self, flag: Option<&str>) -> String {
        if let Some(url) = flag {
            return url.to_string();
        }
        match std::env::var(URL_ENV_VAR) {
            Ok(url) if !url.trim().is_empty() => url,
            _ => self.base_url.clone(),
        }
    }

    /// Parses `request_timeout`.
    pub fn request_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.request_timeout)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when `SIMWATCH_LOG` is unset.
    pub log_level: LogLevel,
}

/// Log verbosity levels (kebab-case in TOML).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug-level detail.
    Debug,
    /// Full trace output.
    Trace,
}

impl LogLevel {
    /// The filter directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
