//! Wire types shared by the control endpoints and the telemetry stream.
//!
//! Field names follow the backend's JSON exactly; nothing here is renamed
//! on the way in or out.

mod results;
mod run_config;
mod telemetry;

pub use results::{ResultsResponse, ResultsSnapshot};
pub use run_config::{ArrivalModel, PriorityDistribution, RunConfig, SchedulerChoice};
pub use telemetry::{RunningJob, SampleError, TelemetrySample};
