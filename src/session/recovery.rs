//! Warm start: load persisted history and results into a fresh controller.

use std::sync::atomic::Ordering;

use sim_api::{ApiError, ResultsResponse, TelemetrySample};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Results, SessionController, SessionEvent};
use crate::SessionState;

/// Why one recovery slot could not be loaded.
#[derive(Debug, Error)]
enum RecoveryError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ApiError),

    #[error("persisted results are incomplete: {0}")]
    Incomplete(String),
}

/// What happened to one recovery slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    /// Loaded into the controller; the count is samples or tenants.
    Loaded(usize),
    /// The backend had nothing persisted for this slot.
    Nothing,
    /// The fetch failed or returned unusable data.
    Failed(String),
    /// A start or clear happened first; the fetched data was discarded.
    Superseded,
    /// Recovery had already run on this controller.
    Skipped,
}

impl SlotOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, SlotOutcome::Loaded(_))
    }
}

/// Outcome of a warm start, one entry per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub history: SlotOutcome,
    pub results: SlotOutcome,
}

impl SessionController {
    /// Loads persisted history and results, once per controller.
    ///
    /// Safe to race with [`start`](Self::start) and [`clear`](Self::clear):
    /// nothing is written unless the controller is still `Idle` with an
    /// empty buffer and no start or clear happened since recovery began.
    /// Failures degrade to an empty slot and are only logged.
    pub async fn recover(&self) -> RecoveryReport {
        if self.recovery_started.swap(true, Ordering::SeqCst) {
            debug!("recovery already ran, skipping");
            return RecoveryReport {
                history: SlotOutcome::Skipped,
                results: SlotOutcome::Skipped,
            };
        }

        let generation = self.inner.read().await.generation;
        debug!(generation, "recovering persisted state");

        let (results, history) =
            tokio::join!(self.backend.fetch_results(), self.backend.fetch_history());
        let results = usable_results(results);
        let history = history.map_err(RecoveryError::from);

        let mut inner = self.inner.write().await;
        let fresh = inner.generation == generation
            && inner.state == SessionState::Idle
            && inner.buffer.is_empty();
        let results_slot_free = inner.results.is_empty();

        let history = match history {
            Err(e) => {
                warn!(error = %e, "history recovery abandoned");
                SlotOutcome::Failed(e.to_string())
            }
            Ok(samples) if samples.is_empty() => SlotOutcome::Nothing,
            Ok(_) if !fresh => SlotOutcome::Superseded,
            Ok(samples) => {
                let count = samples.len();
                let regressions = time_regressions(&samples);
                if regressions > 0 {
                    warn!(
                        regressions,
                        "recovered telemetry time went backwards, keeping persisted order"
                    );
                }
                inner.buffer = samples;
                SlotOutcome::Loaded(count)
            }
        };

        let results = match results {
            Err(e) => {
                warn!(error = %e, "results recovery abandoned");
                SlotOutcome::Failed(e.to_string())
            }
            Ok(None) => SlotOutcome::Nothing,
            Ok(Some(_)) if !fresh || !results_slot_free => SlotOutcome::Superseded,
            Ok(Some(snapshot)) => {
                let count = snapshot.throughput.len();
                inner.results = Results::Ready(snapshot);
                SlotOutcome::Loaded(count)
            }
        };

        if history == SlotOutcome::Superseded || results == SlotOutcome::Superseded {
            info!(
                generation,
                current = inner.generation,
                state = %inner.state,
                "discarding recovered state, session moved on"
            );
        }

        if history.is_loaded() || results.is_loaded() {
            let samples = inner.buffer.len();
            info!(samples, results = results.is_loaded(), "recovered persisted state");
            self.emit(SessionEvent::Recovered {
                samples,
                results: results.is_loaded(),
            });
        }

        RecoveryReport { history, results }
    }

    /// Runs [`recover`](Self::recover) in the background.
    pub fn spawn_recovery(&self) -> JoinHandle<RecoveryReport> {
        let controller = self.clone();
        tokio::spawn(async move { controller.recover().await })
    }
}

/// Number of adjacent samples whose time is earlier than the one before.
fn time_regressions(samples: &[TelemetrySample]) -> usize {
    samples.windows(2).filter(|w| w[1].time < w[0].time).count()
}

/// Keeps a results record only if it has a non-empty throughput map.
fn usable_results(
    response: Result<ResultsResponse, ApiError>,
) -> Result<Option<sim_api::ResultsSnapshot>, RecoveryError> {
    let response = response?;
    if !response.is_complete() {
        return Ok(None);
    }
    match response.into_snapshot() {
        Some(snapshot) if !snapshot.throughput.is_empty() => Ok(Some(snapshot)),
        _ => Err(RecoveryError::Incomplete("empty throughput".to_string())),
    }
}
