//! Configuration file loader with position-aware error reporting.
//!
//! Loads TOML configuration from a specific path or the default XDG location.
//! When the default location has no file, returns `Config::default()`.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use sim_api::{RunConfig, Url};

use crate::config::error::ConfigError;
use crate::config::schema::Config;
use crate::config::xdg;

/// Stateless configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a specific path.
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist, or
    /// `ConfigError::ReadError` for other I/O failures.
    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let content = Self::read(path)?;
        Self::parse_toml(&content, path)
    }

    /// Load configuration from the default XDG location.
    ///
    /// If no file exists at the default path, returns `Config::default()`
    /// instead of an error.
    pub fn load_default() -> Result<Config, ConfigError> {
        let path = xdg::config_path();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Load a standalone run configuration (the body of a `[run]` section)
    /// and check its constraints.
    pub fn load_run_file(path: &Path) -> Result<RunConfig, ConfigError> {
        let content = Self::read(path)?;
        let run: RunConfig = Self::parse_toml(&content, path)?;
        run.validate().map_err(|source| ConfigError::InvalidRun {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(run)
    }

    /// Check values that parse as TOML but are still unusable.
    ///
    /// `path` is only used in error messages.
    pub fn validate(config: &Config, path: &Path) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: String| ConfigError::InvalidValue {
            path: path.to_path_buf(),
            field: field.to_string(),
            message,
        };

        let url = Url::parse(&config.server.base_url)
            .map_err(|e| invalid("server.base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                "server.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        config
            .server
            .request_timeout()
            .map_err(|e| invalid("server.request_timeout", e.to_string()))?;
        config
            .run
            .validate()
            .map_err(|source| ConfigError::InvalidRun {
                path: path.to_path_buf(),
                source,
            })
    }

    fn read(path: &Path) -> Result<String, ConfigError> {
        fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    /// Parse a TOML string with position-aware error reporting.
    fn parse_toml<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T, ConfigError> {
        toml::from_str(content).map_err(|e| {
            let (line, column) = e
                .span()
                .map(|span| {
                    let line = content[..span.start].matches('\n').count() + 1;
                    let last_newline = content[..span.start]
                        .rfind('\n')
                        .map(|p| p + 1)
                        .unwrap_or(0);
                    let column = span.start - last_newline + 1;
                    (line, column)
                })
                .unwrap_or((0, 0));
            ConfigError::ParseError {
                path: path.to_path_buf(),
                line,
                column,
                message: e.message().to_string(),
            }
        })
    }
}
