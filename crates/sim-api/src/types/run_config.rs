//! Run configuration submitted with the start command.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Job arrival process used by the simulated workload generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalModel {
    /// Exponential inter-arrival times around `arrival_rate`.
    Poisson,
    /// Constant inter-arrival time.
    Fixed,
}

impl fmt::Display for ArrivalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrivalModel::Poisson => write!(f, "poisson"),
            ArrivalModel::Fixed => write!(f, "fixed"),
        }
    }
}

/// Scheduling policy the backend should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerChoice {
    /// First in, first out.
    Fifo,
    /// Shortest time first.
    Stf,
    /// Reinforcement-learning placeholder. Accepted here, refused by the
    /// backend with an `error` body.
    Rl,
}

impl fmt::Display for SchedulerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerChoice::Fifo => write!(f, "fifo"),
            SchedulerChoice::Stf => write!(f, "stf"),
            SchedulerChoice::Rl => write!(f, "rl"),
        }
    }
}

/// Relative weights for job priorities. Not normalized client-side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityDistribution {
    pub low: f64,
    pub med: f64,
    pub high: f64,
}

impl Default for PriorityDistribution {
    fn default() -> Self {
        Self {
            low: 0.3,
            med: 0.5,
            high: 0.2,
        }
    }
}

/// Parameters for one simulated run.
///
/// Ranges are `(min, max)` pairs and travel as two-element JSON arrays.
/// Call [`RunConfig::validate`] before submitting; the backend performs its
/// own checks but answers them with less useful messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock bound on the run, in seconds.
    pub runtime_seconds: u32,
    /// Number of tenants submitting jobs.
    pub num_tenants: u32,

    /// Number of nodes in the simulated cluster.
    pub cluster_nodes: u32,
    /// CPU cores per node.
    pub per_node_cpu: u32,
    /// RAM per node, in MB.
    pub per_node_ram: u32,
    /// GPUs per node.
    pub per_node_gpus: u32,

    pub arrival_model: ArrivalModel,
    /// Average job arrivals per time unit.
    pub arrival_rate: f64,
    pub duration_range: (u32, u32),
    pub cpu_request_range: (u32, u32),
    pub ram_request_range: (u32, u32),
    pub gpu_request_range: (u32, u32),

    pub priority_distribution: PriorityDistribution,

    pub scheduler_choice: SchedulerChoice,
    pub preemption_enabled: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runtime_seconds: 300,
            num_tenants: 2,
            cluster_nodes: 1,
            per_node_cpu: 2,
            per_node_ram: 2048,
            per_node_gpus: 0,
            arrival_model: ArrivalModel::Poisson,
            arrival_rate: 8.0,
            duration_range: (3, 6),
            cpu_request_range: (1, 2),
            ram_request_range: (1024, 2048),
            gpu_request_range: (0, 0),
            priority_distribution: PriorityDistribution::default(),
            scheduler_choice: SchedulerChoice::Fifo,
            preemption_enabled: false,
        }
    }
}

impl RunConfig {
    /// Checks every declared range constraint.
    ///
    /// Returns the first violation found, in field declaration order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        positive("runtime_seconds", self.runtime_seconds)?;
        positive("num_tenants", self.num_tenants)?;
        positive("cluster_nodes", self.cluster_nodes)?;

        finite_non_negative("arrival_rate", self.arrival_rate)?;
        if self.arrival_rate == 0.0 {
            return Err(ValidationError::NotPositive {
                field: "arrival_rate",
            });
        }

        ordered("duration_range", self.duration_range)?;
        ordered("cpu_request_range", self.cpu_request_range)?;
        ordered("ram_request_range", self.ram_request_range)?;
        ordered("gpu_request_range", self.gpu_request_range)?;

        let weights = &self.priority_distribution;
        finite_non_negative("priority_distribution.low", weights.low)?;
        finite_non_negative("priority_distribution.med", weights.med)?;
        finite_non_negative("priority_distribution.high", weights.high)?;

        Ok(())
    }
}

fn positive(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

fn finite_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

fn ordered(field: &'static str, (min, max): (u32, u32)) -> Result<(), ValidationError> {
    if min > max {
        return Err(ValidationError::InvertedRange { field, min, max });
    }
    Ok(())
}
