//! Remote backend boundary used by the session controller.
//!
//! The controller never talks to the network directly. Everything it needs
//! from the simulation backend goes through [`SimulationBackend`], which
//! keeps the state machine testable against an in-memory fake.

use futures::future::{BoxFuture, FutureExt};
use sim_api::{ApiError, ResultsResponse, RunConfig, SimClient, TelemetrySample};

use crate::stream::{ws, StreamError, Subscription};

/// Operations the controller issues against the backend.
///
/// Methods return boxed futures so the trait stays object-safe; the
/// controller holds an `Arc<dyn SimulationBackend>`.
pub trait SimulationBackend: Send + Sync + 'static {
    /// Submit a run configuration (start command).
    fn submit<'a>(&'a self, config: &'a RunConfig) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Halt the active run.
    fn halt(&self) -> BoxFuture<'_, Result<(), ApiError>>;

    /// Purge persisted history and results.
    fn purge(&self) -> BoxFuture<'_, Result<(), ApiError>>;

    /// Fetch the latest results record.
    fn fetch_results(&self) -> BoxFuture<'_, Result<ResultsResponse, ApiError>>;

    /// Fetch persisted telemetry history.
    fn fetch_history(&self) -> BoxFuture<'_, Result<Vec<TelemetrySample>, ApiError>>;

    /// Open the live telemetry subscription for the current run.
    fn subscribe(&self) -> BoxFuture<'_, Result<Subscription, StreamError>>;
}

/// Production backend: HTTP commands plus the WebSocket telemetry stream.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: SimClient,
}

impl HttpBackend {
    /// Wraps an HTTP client; the telemetry address is derived from its base.
    pub fn new(client: SimClient) -> Self {
        Self { client }
    }
}

impl SimulationBackend for HttpBackend {
    fn submit<'a>(&'a self, config: &'a RunConfig) -> BoxFuture<'a, Result<(), ApiError>> {
        self.client.submit(config).boxed()
    }

    fn halt(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        self.client.halt().boxed()
    }

    fn purge(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        self.client.purge().boxed()
    }

    fn fetch_results(&self) -> BoxFuture<'_, Result<ResultsResponse, ApiError>> {
        self.client.fetch_results().boxed()
    }

    fn fetch_history(&self) -> BoxFuture<'_, Result<Vec<TelemetrySample>, ApiError>> {
        self.client.fetch_history().boxed()
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<Subscription, StreamError>> {
        async move {
            let url = self
                .client
                .telemetry_url()
                .map_err(|e| StreamError::Connect {
                    url: self.client.base_url().to_string(),
                    reason: e.to_string(),
                })?;
            ws::connect(&url).await
        }
        .boxed()
    }
}
