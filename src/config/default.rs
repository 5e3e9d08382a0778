//! Default configuration template and file creation utilities.
//!
//! Provides a commented TOML template that matches `Config::default()` and
//! functions to write it to the XDG config path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::xdg;

// ---------------------------------------------------------------------------
// Default TOML template
// ---------------------------------------------------------------------------

/// A commented TOML template with all default values.
///
/// Every value here must match `Config::default()` from `schema.rs`.
/// Sections: `[server]`, `[logging]`, `[run]`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# simwatch configuration
#
# This file was auto-generated with default values.
# All values shown below are the built-in defaults.
#
# Location: $XDG_CONFIG_HOME/simwatch/config.toml

# ==============================================================================
# Backend
# ==============================================================================

[server]

# Base address of the simulation backend.
# Commands are sent over HTTP; the telemetry stream uses the same host with
# the scheme switched to ws:// (or wss:// for https://).
# Overridden by the SIMWATCH_URL environment variable and the --url flag.
base_url = "http://localhost:8000"

# Timeout for each HTTP command, as a human-readable duration.
# Examples: "5s", "30s", "1m"
request_timeout = "10s"

# ==============================================================================
# Logging
# ==============================================================================

[logging]

# Logging verbosity, written to stderr.
# Options: "error", "warn", "info", "debug", "trace"
# The SIMWATCH_LOG environment variable takes precedence when set.
log_level = "info"

# ==============================================================================
# Run
# ==============================================================================

# Run configuration submitted by `simwatch run`.
[run]

# Wall-clock bound on the run, in seconds. Must be positive.
runtime_seconds = 300

# Number of tenants submitting jobs. At least 1.
num_tenants = 2

# Simulated cluster: node count (at least 1) and per-node capacity.
cluster_nodes = 1
per_node_cpu = 2
per_node_ram = 2048
per_node_gpus = 0

# Job arrival process: "poisson" or "fixed".
arrival_model = "poisson"

# Average arrivals per time unit. Must be positive.
arrival_rate = 8.0

# Per-job request ranges as [min, max], min <= max.
duration_range = [3, 6]
cpu_request_range = [1, 2]
ram_request_range = [1024, 2048]
gpu_request_range = [0, 0]

# Relative priority weights; not required to sum to 1.
priority_distribution = { low = 0.3, med = 0.5, high = 0.2 }

# Scheduling policy: "fifo", "stf", or "rl".
# Note: the backend currently refuses "rl".
scheduler_choice = "fifo"

preemption_enabled = false
"#;

// ---------------------------------------------------------------------------
// File creation
// ---------------------------------------------------------------------------

/// Creates (or force-overwrites) the default config file.
///
/// - If the file exists and `force` is `false`, returns `ConfigError::AlreadyExists`.
/// - If the file exists and `force` is `true`, backs it up to `.toml.backup` first.
/// - Returns the path where the config was written.
pub fn create_default_config(force: bool) -> Result<PathBuf, ConfigError> {
    let path = xdg::config_path();

    if path.exists() {
        if !force {
            return Err(ConfigError::AlreadyExists { path });
        }
        let backup_path = path.with_extension("toml.backup");
        fs::rename(&path, &backup_path).map_err(|e| ConfigError::WriteError {
            path: backup_path.clone(),
            source: e,
        })?;
        tracing::info!("Backed up existing config to {}", backup_path.display());
    }

    write_default_config(&path)?;
    Ok(path)
}

/// Writes the default template to `path`, creating parent dirs and setting 0600 permissions.
fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    xdg::ensure_config_dir().map_err(write_error)?;
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_error)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
