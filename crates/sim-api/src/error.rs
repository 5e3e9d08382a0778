//! Error types for the sim-api crate.

use thiserror::Error;

/// Errors that can occur when talking to the simulation backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend could not be reached or the transfer failed midway.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered 2xx but the body carried an `error` field.
    ///
    /// The backend reports an unsupported scheduler this way.
    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    /// Backend returned a 5xx status.
    #[error("Backend error (HTTP {0})")]
    Server(u16),

    /// Backend returned a status this client does not handle.
    #[error("Unexpected HTTP status: {0}")]
    Unexpected(u16),

    /// Response body was not the expected JSON shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The configured base address is not a usable URL.
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidUrl {
        /// The address as configured.
        url: String,
        /// Why it was refused.
        reason: String,
    },
}

/// A [`RunConfig`](crate::RunConfig) field that violates its declared range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Field must be strictly positive.
    #[error("{field} must be greater than zero")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Field must be a finite number.
    #[error("{field} must be a finite number, got {value}")]
    NotFinite {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Field must not be negative.
    #[error("{field} must not be negative, got {value}")]
    Negative {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Range pair has `min > max`.
    #[error("{field} has min {min} greater than max {max}")]
    InvertedRange {
        /// Name of the offending range.
        field: &'static str,
        /// Lower bound as given.
        min: u32,
        /// Upper bound as given.
        max: u32,
    },
}
