//! # sim-api
//!
//! Typed bindings for the cluster scheduler simulation backend.
//!
//! This crate covers the request/response side of the backend boundary:
//!
//! - [`RunConfig`] and its validation rules
//! - wire types for live telemetry ([`TelemetrySample`]) and final results
//!   ([`ResultsSnapshot`])
//! - [`SimClient`], an async HTTP client for the control and persistence
//!   endpoints (start, stop, clear, results, history)
//!
//! The live telemetry subscription is transport-specific and lives in the
//! `simwatch` crate; [`SimClient::telemetry_url`] resolves its address.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sim_api::{RunConfig, SimClient};
//!
//! let client = SimClient::new("http://localhost:8000", std::time::Duration::from_secs(10))?;
//! client.submit(&RunConfig::default()).await?;
//! let history = client.fetch_history().await?;
//! println!("{} samples persisted", history.len());
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::SimClient;
pub use reqwest::Url;
pub use error::{ApiError, ValidationError};
pub use types::{
    ArrivalModel, PriorityDistribution, ResultsResponse, ResultsSnapshot, RunConfig, RunningJob,
    SampleError, SchedulerChoice, TelemetrySample,
};
