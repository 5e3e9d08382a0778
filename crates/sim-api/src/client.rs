//! Async HTTP client for the simulation backend's control endpoints.
//!
//! Every call is a single request with no retries. Status codes are mapped
//! to [`ApiError`] variants in one place ([`check_status`]) so callers can
//! match on the failure kind.

use std::time::Duration;

use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::types::{ResultsResponse, RunConfig, TelemetrySample};

/// Path of the start command, relative to the base address.
pub const START_PATH: &str = "start-simulation";
/// Path of the halt command.
pub const STOP_PATH: &str = "stop-simulation";
/// Path of the purge command.
pub const CLEAR_PATH: &str = "clear-results";
/// Path of the final results record.
pub const RESULTS_PATH: &str = "results";
/// Path of the persisted telemetry history.
pub const HISTORY_PATH: &str = "history";
/// Path of the live telemetry WebSocket.
pub const TELEMETRY_PATH: &str = "ws/simulation";

/// Client bound to one backend base address.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct SimClient {
    http: reqwest::Client,
    base: Url,
}

impl SimClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] unless `base_url` is an absolute
    /// `http` or `https` URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = parse_base(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self { http, base })
    }

    /// The normalized base address (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Address of the telemetry WebSocket, with the scheme mapped
    /// `http → ws` and `https → wss`.
    pub fn telemetry_url(&self) -> Result<Url, ApiError> {
        let mut url = self.endpoint(TELEMETRY_PATH)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| ApiError::InvalidUrl {
            url: url.to_string(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
        Ok(url)
    }

    /// Submits a run configuration.
    ///
    /// The backend signals some rejections with a 2xx status and an
    /// `error` field in the body; those map to [`ApiError::Rejected`].
    pub async fn submit(&self, config: &RunConfig) -> Result<(), ApiError> {
        let url = self.endpoint(START_PATH)?;
        tracing::debug!(%url, scheduler = %config.scheduler_choice, "submitting run config");
        let response = self
            .http
            .post(url)
            .json(config)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        command_outcome(response).await
    }

    /// Asks the backend to halt the active run.
    pub async fn halt(&self) -> Result<(), ApiError> {
        self.post_command(STOP_PATH).await
    }

    /// Purges persisted history and results.
    pub async fn purge(&self) -> Result<(), ApiError> {
        self.post_command(CLEAR_PATH).await
    }

    /// Fetches the latest results record, complete or not.
    pub async fn fetch_results(&self) -> Result<ResultsResponse, ApiError> {
        self.get_json(RESULTS_PATH).await
    }

    /// Fetches the persisted telemetry of the latest run, oldest first.
    pub async fn fetch_history(&self) -> Result<Vec<TelemetrySample>, ApiError> {
        self.get_json(HISTORY_PATH).await
    }

    async fn post_command(&self, path: &str) -> Result<(), ApiError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "posting command");
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        command_outcome(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let body = check_status(response)?
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base.join(path).map_err(|e| ApiError::InvalidUrl {
            url: format!("{}{}", self.base, path),
            reason: e.to_string(),
        })
    }
}

fn parse_base(base_url: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };
    let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
    }
    // Url::join replaces the last segment unless the path ends in '/'.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Map the HTTP status to an error, passing 2xx responses through.
fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        500..=599 => Err(ApiError::Server(status)),
        _ => Err(ApiError::Unexpected(status)),
    }
}

/// Outcome of a command endpoint: a 2xx status whose body does not carry an
/// `error` field.
async fn command_outcome(response: Response) -> Result<(), ApiError> {
    let body = check_status(response)?
        .text()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;
    match rejection_message(&body) {
        Some(message) => Err(ApiError::Rejected(message)),
        None => Ok(()),
    }
}

fn rejection_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(String::from)
}
