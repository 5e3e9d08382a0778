//! simwatch library
//!
//! Client-side session control for remote cluster scheduler simulations:
//! submit a run, follow its live telemetry, recover persisted state on
//! load, and reconcile the stream with the final results once the run ends.
//!
//! The entry point is [`session::SessionController`]. It talks to the
//! backend through the [`backend::SimulationBackend`] trait, implemented for
//! real deployments by [`backend::HttpBackend`] (HTTP commands from the
//! `sim-api` crate plus a WebSocket telemetry stream).

use std::fmt;

/// Seam between the controller and the remote backend.
pub mod backend;

/// Configuration file schema, loading, and default template.
pub mod config;

/// Tracing subscriber setup.
pub mod logging;

/// Plain-text rendering of session events for the CLI.
pub mod render;

/// Session controller, the owner of run state and the telemetry buffer.
pub mod session;

/// Telemetry stream adapter: subscription objects and the WebSocket transport.
pub mod stream;

pub use sim_api::{ResultsSnapshot, RunConfig, TelemetrySample};

/// Lifecycle state of the session controller.
///
/// Local only; the backend has no notion of these states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No run in flight. Initial state, and the state after a clear.
    #[default]
    Idle,
    /// Start command issued, subscription not yet open.
    Starting,
    /// Telemetry is streaming into the buffer.
    Running,
    /// Halt requested; waiting for the stream to close.
    Stopping,
    /// Stream closed; final results fetched or being fetched.
    Completed,
}

impl SessionState {
    /// Returns `true` while a telemetry stream belongs to the session.
    pub fn is_streaming(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Stopping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}
