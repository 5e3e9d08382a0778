//! Final results computed by the backend once a run ends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw body of the results endpoint.
///
/// The endpoint returns either a full results record or a placeholder such
/// as `{"status": "no results yet"}`. Presence of `throughput` is what makes
/// a record complete.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultsResponse {
    #[serde(default)]
    pub throughput: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub avg_wait: BTreeMap<String, f64>,
    #[serde(default)]
    pub fairness: Option<f64>,
    /// Placeholder text sent when no results exist.
    #[serde(default)]
    pub status: Option<String>,
}

impl ResultsResponse {
    /// Returns `true` if the record carries a throughput field.
    pub fn is_complete(&self) -> bool {
        self.throughput.is_some()
    }

    /// Converts into a snapshot if the record is complete.
    pub fn into_snapshot(self) -> Option<ResultsSnapshot> {
        let throughput = self.throughput?;
        Some(ResultsSnapshot {
            throughput,
            avg_wait: self.avg_wait,
            fairness: self.fairness,
        })
    }
}

/// Per-tenant aggregates for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    /// Completed jobs per tenant.
    pub throughput: BTreeMap<String, u64>,
    /// Average wait time per tenant, in seconds.
    #[serde(default)]
    pub avg_wait: BTreeMap<String, f64>,
    /// Jain's fairness index over inverted wait times, when the backend
    /// computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fairness: Option<f64>,
}

impl ResultsSnapshot {
    /// Tenant ids present in either map, sorted.
    pub fn tenants(&self) -> Vec<&str> {
        let mut tenants: Vec<&str> = self
            .throughput
            .keys()
            .chain(self.avg_wait.keys())
            .map(String::as_str)
            .collect();
        tenants.sort_unstable();
        tenants.dedup();
        tenants
    }
}
