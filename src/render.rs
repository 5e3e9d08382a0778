//! Line-oriented output for the CLI.
//!
//! Every session event becomes one line (results may take several in text
//! mode). JSON mode writes one object per line with an `event` tag so the
//! output can be piped into other tools.

use std::io::{self, Write};

use serde_json::{json, Value};
use sim_api::{ResultsSnapshot, TelemetrySample};

use crate::session::{Results, SessionEvent, SessionSnapshot};

/// Output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Writes session events to `out`.
pub struct Renderer<W> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Renders one broadcast event.
    pub fn event(&mut self, event: &SessionEvent) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.json_line(event_json(event)),
            OutputFormat::Text => match event {
                SessionEvent::StateChanged { from, to } => {
                    writeln!(self.out, "state: {from} -> {to}")
                }
                SessionEvent::SampleAppended(sample) => {
                    writeln!(self.out, "{}", format_sample(sample))
                }
                SessionEvent::ResultsUpdated(results) => self.text_results(results),
                SessionEvent::Recovered { samples, results } => {
                    let suffix = if *results { " and final results" } else { "" };
                    writeln!(self.out, "recovered {samples} samples{suffix}")
                }
                SessionEvent::Cleared => writeln!(self.out, "cleared"),
                SessionEvent::Warning(message) => writeln!(self.out, "warning: {message}"),
            },
        }
    }

    /// Renders the buffer and results of a snapshot, e.g. after recovery.
    pub fn snapshot(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                for sample in &snapshot.buffer {
                    self.json_line(sample_json(sample))?;
                }
                self.json_line(results_json(&snapshot.results))
            }
            OutputFormat::Text => {
                if snapshot.buffer.is_empty() {
                    writeln!(self.out, "no persisted telemetry")?;
                }
                for sample in &snapshot.buffer {
                    writeln!(self.out, "{}", format_sample(sample))?;
                }
                self.text_results(&snapshot.results)
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn text_results(&mut self, results: &Results) -> io::Result<()> {
        for line in format_results(results) {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    fn json_line(&mut self, value: Value) -> io::Result<()> {
        writeln!(self.out, "{value}")?;
        self.out.flush()
    }
}

/// One text line for a sample: time first, then metrics by name.
pub fn format_sample(sample: &TelemetrySample) -> String {
    let mut line = format!("t={:.2}s", sample.time);
    for (name, value) in &sample.metrics {
        line.push_str(&format!(" {name}={}", format_number(*value)));
    }
    if !sample.running_jobs.is_empty() {
        line.push_str(&format!(" running={}", sample.running_jobs.len()));
    }
    line
}

/// Text lines for a results slot.
pub fn format_results(results: &Results) -> Vec<String> {
    match results {
        Results::Empty => vec!["no results".to_string()],
        Results::Missing { reason } => vec![format!("results unavailable: {reason}")],
        Results::Ready(snapshot) => format_snapshot(snapshot),
    }
}

fn format_snapshot(snapshot: &ResultsSnapshot) -> Vec<String> {
    let mut lines = vec!["results:".to_string()];
    for tenant in snapshot.tenants() {
        let throughput = snapshot
            .throughput
            .get(tenant)
            .map(u64::to_string)
            .unwrap_or_else(|| "-".to_string());
        let wait = snapshot
            .avg_wait
            .get(tenant)
            .map(|w| format!("{w:.2}s"))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!("  {tenant}  throughput={throughput}  avg_wait={wait}"));
    }
    if let Some(fairness) = snapshot.fairness {
        lines.push(format!("  fairness={fairness:.3}"));
    }
    lines
}

/// Whole numbers print without a fraction.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

fn event_json(event: &SessionEvent) -> Value {
    match event {
        SessionEvent::StateChanged { from, to } => {
            json!({ "event": "state", "from": from, "to": to })
        }
        SessionEvent::SampleAppended(sample) => sample_json(sample),
        SessionEvent::ResultsUpdated(results) => results_json(results),
        SessionEvent::Recovered { samples, results } => {
            json!({ "event": "recovered", "samples": samples, "results": results })
        }
        SessionEvent::Cleared => json!({ "event": "cleared" }),
        SessionEvent::Warning(message) => json!({ "event": "warning", "message": message }),
    }
}

fn sample_json(sample: &TelemetrySample) -> Value {
    json!({ "event": "sample", "sample": sample })
}

fn results_json(results: &Results) -> Value {
    match results {
        Results::Empty => json!({ "event": "results", "status": "empty" }),
        Results::Missing { reason } => {
            json!({ "event": "results", "status": "missing", "reason": reason })
        }
        Results::Ready(snapshot) => {
            json!({ "event": "results", "status": "ready", "results": snapshot })
        }
    }
}
