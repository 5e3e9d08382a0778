//! Configuration error types for loading and parsing TOML config files.

use std::path::PathBuf;

use sim_api::ValidationError;
use thiserror::Error;

/// Errors that can occur when loading, validating, or writing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("Invalid configuration at {path}:{line}:{column}: {message}")]
    ParseError {
        /// Path to the file containing the error.
        path: PathBuf,
        /// One-based line index of the error (0 if unknown).
        line: usize,
        /// One-based column index of the error (0 if unknown).
        column: usize,
        /// Human-readable description of the parse failure.
        message: String,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {path}")]
    NotFound {
        /// Path that was requested but does not exist.
        path: PathBuf,
    },

    /// A value parsed but is not usable.
    #[error("Invalid value for {field} in {path}: {message}")]
    InvalidValue {
        /// File the value came from.
        path: PathBuf,
        /// Dotted key of the offending value, e.g. `server.request_timeout`.
        field: String,
        /// Why the value was refused.
        message: String,
    },

    /// The run configuration violates a field constraint.
    #[error("Invalid run configuration in {path}: {source}")]
    InvalidRun {
        /// File the run configuration came from.
        path: PathBuf,
        /// The violated constraint.
        #[source]
        source: ValidationError,
    },

    /// A configuration file already exists at the target path.
    #[error("Configuration file already exists: {path}")]
    AlreadyExists {
        /// Path where the file already exists.
        path: PathBuf,
    },

    /// Failed to write a configuration file to disk.
    #[error("Failed to write configuration file: {path}")]
    WriteError {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_read_error() {
        let err = ConfigError::ReadError {
            path: PathBuf::from("/etc/simwatch/config.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("/etc/simwatch/config.toml"),
            "ReadError display should include the path"
        );
        assert!(
            msg.contains("Failed to read"),
            "ReadError display should describe the failure"
        );
    }

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError {
            path: PathBuf::from("config.toml"),
            line: 5,
            column: 12,
            message: "expected `=`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("5:12"), "ParseError should include line:column");
        assert!(
            msg.contains("expected `=`"),
            "ParseError should include the message"
        );
    }

    #[test]
    fn display_invalid_value_names_field() {
        let err = ConfigError::InvalidValue {
            path: PathBuf::from("config.toml"),
            field: "server.request_timeout".to_string(),
            message: "expected number".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("server.request_timeout"));
        assert!(msg.contains("expected number"));
    }

    #[test]
    fn invalid_run_chains_validation_source() {
        let err = ConfigError::InvalidRun {
            path: PathBuf::from("run.toml"),
            source: ValidationError::NotPositive {
                field: "cluster_nodes",
            },
        };
        assert!(err.to_string().contains("cluster_nodes"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn display_already_exists_error() {
        let err = ConfigError::AlreadyExists {
            path: PathBuf::from("/home/user/.config/simwatch/config.toml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("already exists"));
        assert!(msg.contains("config.toml"));
    }

    #[test]
    fn write_error_source_chain() {
        let err = ConfigError::WriteError {
            path: PathBuf::from("/tmp/config.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/config.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
