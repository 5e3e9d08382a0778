//! Live telemetry samples pushed by the backend while a run executes.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reasons a telemetry message could not be turned into a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// Not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Json(String),
    /// Valid JSON, but not an object.
    #[error("expected a JSON object")]
    NotAnObject,
    /// The required numeric `time` field is absent or not a number.
    #[error("missing numeric `time` field")]
    MissingTime,
    /// `running_jobs` is present but has the wrong shape.
    #[error("malformed `running_jobs`: {0}")]
    RunningJobs(String),
}

/// A job occupying cluster resources at the moment a sample was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningJob {
    pub id: String,
    pub tenant: String,
    pub cpu: u32,
    /// Start offset from run start, in seconds. Absent for jobs that have
    /// not been dispatched yet.
    #[serde(default)]
    pub start: Option<f64>,
}

/// One point of live metrics.
///
/// Every numeric top-level field other than `time` is a metric; which
/// metrics appear varies between samples. Non-numeric fields other than
/// `running_jobs` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Seconds since the run started.
    pub time: f64,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub running_jobs: Vec<RunningJob>,
}

impl TelemetrySample {
    /// Creates a sample with no metrics.
    pub fn new(time: f64) -> Self {
        Self {
            time,
            metrics: BTreeMap::new(),
            running_jobs: Vec::new(),
        }
    }

    /// Builder-style metric insertion.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Returns the value of a metric if this sample carries it.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Parses a single stream message.
    pub fn parse(text: &str) -> Result<Self, SampleError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SampleError::Json(e.to_string()))?;
        Self::try_from(value)
    }
}

impl TryFrom<Value> for TelemetrySample {
    type Error = SampleError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(SampleError::NotAnObject);
        };

        let time = fields
            .get("time")
            .and_then(Value::as_f64)
            .ok_or(SampleError::MissingTime)?;

        let mut sample = TelemetrySample::new(time);
        for (name, field) in fields {
            match name.as_str() {
                "time" => {}
                "running_jobs" => {
                    sample.running_jobs = serde_json::from_value(field)
                        .map_err(|e| SampleError::RunningJobs(e.to_string()))?;
                }
                _ => {
                    if let Some(number) = field.as_f64() {
                        sample.metrics.insert(name, number);
                    }
                }
            }
        }
        Ok(sample)
    }
}

impl<'de> Deserialize<'de> for TelemetrySample {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        TelemetrySample::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_message() {
        let text = r#"{
            "time": 1.25,
            "queue_len": 3,
            "completed_jobs": 7,
            "cpu_util": 50,
            "running_jobs": [
                {"id": "a1b2", "tenant": "tenant-0", "cpu": 1, "start": 0.4},
                {"id": "c3d4", "tenant": "tenant-1", "cpu": 2, "start": null}
            ]
        }"#;
        let sample = TelemetrySample::parse(text).expect("should parse");
        assert!((sample.time - 1.25).abs() < f64::EPSILON);
        assert_eq!(sample.metric("queue_len"), Some(3.0));
        assert_eq!(sample.metric("completed_jobs"), Some(7.0));
        assert_eq!(sample.metric("cpu_util"), Some(50.0));
        assert_eq!(sample.running_jobs.len(), 2);
        assert_eq!(sample.running_jobs[0].tenant, "tenant-0");
        assert_eq!(sample.running_jobs[1].start, None);
    }

    #[test]
    fn parse_sparse_sample() {
        let sample = TelemetrySample::parse(r#"{"time": 2, "queue_len": 1}"#).expect("parse");
        assert_eq!(sample.metrics.len(), 1);
        assert_eq!(sample.metric("cpu_util"), None);
        assert!(sample.running_jobs.is_empty());
    }

    #[test]
    fn non_numeric_fields_are_ignored() {
        let sample =
            TelemetrySample::parse(r#"{"time": 2, "note": "hi", "flag": true, "queue_len": 0}"#)
                .expect("parse");
        assert_eq!(sample.metrics.keys().collect::<Vec<_>>(), vec!["queue_len"]);
    }

    #[test]
    fn missing_time_is_rejected() {
        assert_eq!(
            TelemetrySample::parse(r#"{"queue_len": 1}"#),
            Err(SampleError::MissingTime)
        );
        assert_eq!(
            TelemetrySample::parse(r#"{"time": "soon"}"#),
            Err(SampleError::MissingTime)
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(
            TelemetrySample::parse("[1, 2]"),
            Err(SampleError::NotAnObject)
        );
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            TelemetrySample::parse("{time: 1"),
            Err(SampleError::Json(_))
        ));
    }

    #[test]
    fn malformed_running_jobs_is_rejected() {
        let result = TelemetrySample::parse(r#"{"time": 1, "running_jobs": [{"id": 5}]}"#);
        assert!(matches!(result, Err(SampleError::RunningJobs(_))));
    }

    #[test]
    fn history_array_deserializes_in_order() {
        let text = r#"[{"time": 1, "queue_len": 2}, {"time": 2, "queue_len": 1}]"#;
        let history: Vec<TelemetrySample> = serde_json::from_str(text).expect("parse history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].metric("queue_len"), Some(2.0));
        assert_eq!(history[1].metric("queue_len"), Some(1.0));
    }

    #[test]
    fn history_with_one_bad_entry_fails_whole() {
        let text = r#"[{"time": 1}, {"queue_len": 1}]"#;
        let result: Result<Vec<TelemetrySample>, _> = serde_json::from_str(text);
        assert!(result.is_err());
    }

    #[test]
    fn serialize_flattens_metrics() {
        let sample = TelemetrySample::new(3.0).with_metric("queue_len", 0.0);
        let json = serde_json::to_value(&sample).expect("serialize");
        assert_eq!(json, serde_json::json!({"time": 3.0, "queue_len": 0.0}));
    }
}
