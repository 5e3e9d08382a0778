//! Session controller for one simulated run at a time.
//!
//! The controller owns the canonical telemetry buffer and the results slot,
//! and mediates between the command endpoints, the live telemetry stream,
//! and snapshot recovery. State transitions:
//!
//! ```text
//! Idle --start--> Starting --submitted + subscribed--> Running
//!                  |  (failure)                         |  stop
//!                  v                                    v
//!                 Idle                               Stopping
//!                                                       |
//!          Running / Stopping --stream closed--> Completed --clear--> Idle
//! ```
//!
//! `clear()` is accepted from any state. It closes an open stream before
//! purging; from then on that stream's samples and its termination are
//! ignored. If the purge fails, state, buffer and results stay exactly as
//! they were before the call, but the stream stays closed: a later
//! successful `clear()` is what returns the session to `Idle`.
//!
//! # Concurrency
//!
//! State lives behind a `tokio::sync::RwLock` that is never held across a
//! network call. Commands (`start`/`stop`/`clear`) additionally hold a
//! command mutex for their whole duration, so a `stop()` issued while a
//! `start()` is pending waits for it instead of interleaving. Each start and
//! each successful clear bumps a generation counter; stream events and
//! recovery writes tagged with an older generation are discarded.

mod error;
mod recovery;

#[cfg(test)]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sim_api::{ResultsSnapshot, RunConfig, TelemetrySample};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::backend::SimulationBackend;
use crate::stream::{CloseHandle, StreamEvent, Termination};
use crate::SessionState;

pub use error::{Operation, SessionError};
pub use recovery::{RecoveryReport, SlotOutcome};

/// Capacity of the session event broadcast channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Contents of the final-results slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Results {
    /// No run has completed since the last start or clear.
    #[default]
    Empty,
    /// A complete snapshot is available.
    Ready(ResultsSnapshot),
    /// A run completed but no complete snapshot could be obtained.
    Missing {
        /// Backend placeholder text or the fetch error.
        reason: String,
    },
}

impl Results {
    /// The snapshot, if one is ready.
    pub fn snapshot(&self) -> Option<&ResultsSnapshot> {
        match self {
            Results::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Results::Empty)
    }
}

/// Notifications broadcast to observers such as the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The controller moved between states. Entering `Starting` implies the
    /// buffer and results were reset.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A live sample was appended to the buffer.
    SampleAppended(TelemetrySample),
    /// The results slot was filled after a run completed.
    ResultsUpdated(Results),
    /// Warm start loaded persisted state.
    Recovered {
        /// Number of samples loaded into the buffer.
        samples: usize,
        /// Whether a results snapshot was loaded.
        results: bool,
    },
    /// A clear removed local state.
    Cleared,
    /// Something the operator should know about that did not change state.
    Warning(String),
}

/// Point-in-time copy of the controller's state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub generation: u64,
    pub buffer: Vec<TelemetrySample>,
    pub results: Results,
    /// How the last run's stream ended, once it has.
    pub termination: Option<Termination>,
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    generation: u64,
    buffer: Vec<TelemetrySample>,
    results: Results,
    termination: Option<Termination>,
    /// Close handle of the open subscription, if any.
    stream: Option<CloseHandle>,
    /// The current run's stream was closed by `clear()`; its remaining
    /// events must not touch the buffer or the state.
    closed_by_clear: bool,
}

/// Drives one session at a time against a [`SimulationBackend`].
///
/// Cheap to clone; clones share state. Constructed in `Idle`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use simwatch::backend::HttpBackend;
/// use simwatch::session::SessionController;
/// use simwatch::RunConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = sim_api::SimClient::new("http://localhost:8000", Duration::from_secs(10))?;
///     let controller = SessionController::new(Arc::new(HttpBackend::new(client)));
///     let mut events = controller.subscribe();
///     controller.start(RunConfig::default()).await?;
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SessionController {
    backend: Arc<dyn SimulationBackend>,
    inner: Arc<RwLock<Inner>>,
    /// Serializes start/stop/clear.
    commands: Arc<Mutex<()>>,
    recovery_started: Arc<AtomicBool>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("inner", &self.inner)
            .field("subscriber_count", &self.events_tx.receiver_count())
            .finish()
    }
}

impl SessionController {
    /// Creates an `Idle` controller with an empty buffer.
    pub fn new(backend: Arc<dyn SimulationBackend>) -> Self {
        let (events_tx, _rx) = broadcast::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            inner: Arc::new(RwLock::new(Inner::default())),
            commands: Arc::new(Mutex::new(())),
            recovery_started: Arc::new(AtomicBool::new(false)),
            events_tx,
        }
    }

    /// Subscribes to session events.
    ///
    /// Slow subscribers may lag and miss events; controller state is
    /// unaffected. Use [`snapshot`](Self::snapshot) to resynchronize.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Current state.
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// Copies the full controller state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        SessionSnapshot {
            state: inner.state,
            generation: inner.generation,
            buffer: inner.buffer.clone(),
            results: inner.results.clone(),
            termination: inner.termination.clone(),
        }
    }

    /// Starts a run with `config`.
    ///
    /// Requires `Idle`. Resets the buffer and results, submits the config,
    /// opens the telemetry subscription, and enters `Running`. On any
    /// failure after the reset the session returns to `Idle` with no
    /// subscription open.
    pub async fn start(&self, config: RunConfig) -> Result<(), SessionError> {
        let _command = self.commands.lock().await;

        let generation = {
            let mut inner = self.inner.write().await;
            if inner.state != SessionState::Idle {
                return Err(SessionError::InvalidState {
                    operation: Operation::Start,
                    state: inner.state,
                });
            }
            config.validate()?;

            inner.generation += 1;
            inner.buffer.clear();
            inner.results = Results::Empty;
            inner.termination = None;
            inner.closed_by_clear = false;
            self.transition(&mut inner, SessionState::Starting);
            inner.generation
        };

        info!(
            generation,
            scheduler = %config.scheduler_choice,
            runtime_seconds = config.runtime_seconds,
            "starting run"
        );

        if let Err(e) = self.backend.submit(&config).await {
            warn!(generation, error = %e, "start command failed");
            self.abandon_start(generation).await;
            return Err(SessionError::Submission(e));
        }

        let subscription = match self.backend.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(generation, error = %e, "telemetry subscription failed");
                self.abandon_start(generation).await;
                return Err(SessionError::Subscribe(e));
            }
        };

        let (events, close) = subscription.into_parts();
        let mut inner = self.inner.write().await;
        inner.stream = Some(close);
        self.transition(&mut inner, SessionState::Running);
        // The pump needs the write lock for its first event, so it cannot
        // observe anything before `Running` is set.
        tokio::spawn(self.clone().pump(generation, events));
        Ok(())
    }

    /// Requests the backend to halt the run.
    ///
    /// Requires `Running`; a repeated call while `Stopping` or `Completed`
    /// is a no-op. The stream is not closed here: the session completes
    /// when the stream reports its own termination.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let _command = self.commands.lock().await;

        let generation = {
            let mut inner = self.inner.write().await;
            match inner.state {
                SessionState::Running => {}
                SessionState::Stopping | SessionState::Completed => {
                    debug!(state = %inner.state, "stop ignored, run already ending");
                    return Ok(());
                }
                state => {
                    return Err(SessionError::InvalidState {
                        operation: Operation::Stop,
                        state,
                    })
                }
            }
            self.transition(&mut inner, SessionState::Stopping);
            inner.generation
        };

        info!(generation, "stopping run");
        if let Err(e) = self.backend.halt().await {
            warn!(generation, error = %e, "stop command failed");
            let mut inner = self.inner.write().await;
            if inner.generation == generation && inner.state == SessionState::Stopping {
                self.transition(&mut inner, SessionState::Running);
            }
            return Err(SessionError::Halt(e));
        }
        Ok(())
    }

    /// Purges remote history and results, then resets local state.
    ///
    /// Accepted from any state. An open stream is asked to close first.
    /// Local buffer and results are only wiped after the purge succeeds; a
    /// failed purge leaves them and the state untouched (see the module
    /// docs for what happens to a stream closed along the way).
    pub async fn clear(&self) -> Result<(), SessionError> {
        let _command = self.commands.lock().await;

        {
            let mut inner = self.inner.write().await;
            if let Some(requested) = inner.stream.as_mut().map(CloseHandle::close) {
                if requested {
                    info!(generation = inner.generation, "closing telemetry stream before clear");
                }
                inner.closed_by_clear = true;
            }
        }

        if let Err(e) = self.backend.purge().await {
            let inner = self.inner.read().await;
            warn!(
                generation = inner.generation,
                state = %inner.state,
                error = %e,
                "clear command failed, keeping local state"
            );
            if inner.closed_by_clear && inner.state.is_streaming() {
                self.emit(SessionEvent::Warning(
                    "clear failed after the telemetry stream was closed; retry clear to reset"
                        .to_string(),
                ));
            }
            return Err(SessionError::Clear(e));
        }

        let mut inner = self.inner.write().await;
        let had_state = inner.state != SessionState::Idle
            || !inner.buffer.is_empty()
            || !inner.results.is_empty();
        inner.generation += 1;
        inner.stream = None;
        inner.closed_by_clear = false;
        inner.buffer.clear();
        inner.results = Results::Empty;
        inner.termination = None;
        self.transition(&mut inner, SessionState::Idle);
        if had_state {
            self.emit(SessionEvent::Cleared);
        }
        info!(generation = inner.generation, "session cleared");
        Ok(())
    }

    /// Applies stream events for one run, in order, until the stream is done.
    async fn pump(self, generation: u64, mut events: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                StreamEvent::Sample(sample) => self.append(generation, sample).await,
                StreamEvent::ServerError(message) => {
                    warn!(generation, %message, "backend reported a stream error");
                    self.emit(SessionEvent::Warning(format!("backend: {message}")));
                }
                StreamEvent::Closed(termination) => self.complete(generation, termination).await,
            }
        }
        debug!(generation, "telemetry pump finished");
    }

    async fn append(&self, generation: u64, sample: TelemetrySample) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation || !inner.state.is_streaming() {
            debug!(generation, state = %inner.state, "dropping sample for inactive run");
            return;
        }
        if inner.closed_by_clear {
            debug!(generation, "dropping sample from a stream closed by clear");
            return;
        }
        if let Some(last) = inner.buffer.last() {
            if sample.time < last.time {
                warn!(
                    previous = last.time,
                    time = sample.time,
                    "telemetry time went backwards, keeping stream order"
                );
            }
        }
        inner.buffer.push(sample.clone());
        trace!(len = inner.buffer.len(), "sample appended");
        self.emit(SessionEvent::SampleAppended(sample));
    }

    /// Moves the run to `Completed` and fetches its results, once.
    async fn complete(&self, generation: u64, termination: Termination) {
        {
            let mut inner = self.inner.write().await;
            if inner.generation != generation || !inner.state.is_streaming() {
                debug!(generation, state = %inner.state, "ignoring repeated stream close");
                return;
            }
            if inner.closed_by_clear {
                debug!(generation, %termination, "stream closed by clear, run state kept");
                inner.stream = None;
                return;
            }
            if let Termination::Abnormal(reason) = &termination {
                warn!(generation, %reason, "telemetry stream dropped, results may be incomplete");
                self.emit(SessionEvent::Warning(format!(
                    "telemetry stream dropped ({reason}); results may be incomplete"
                )));
            }
            info!(generation, samples = inner.buffer.len(), %termination, "run completed");
            inner.termination = Some(termination);
            inner.stream = None;
            self.transition(&mut inner, SessionState::Completed);
        }

        let results = match self.backend.fetch_results().await {
            Ok(response) => {
                let placeholder = response.status.clone();
                match response.into_snapshot() {
                    Some(snapshot) => Results::Ready(snapshot),
                    None => Results::Missing {
                        reason: placeholder
                            .unwrap_or_else(|| "results record has no throughput".to_string()),
                    },
                }
            }
            Err(e) => {
                warn!(generation, error = %e, "final results fetch failed");
                Results::Missing {
                    reason: e.to_string(),
                }
            }
        };

        let mut inner = self.inner.write().await;
        if inner.generation != generation || inner.state != SessionState::Completed {
            debug!(generation, "discarding results for a cleared run");
            return;
        }
        inner.results = results.clone();
        self.emit(SessionEvent::ResultsUpdated(results));
    }

    /// Returns a failed start to `Idle` unless something else moved on.
    async fn abandon_start(&self, generation: u64) {
        let mut inner = self.inner.write().await;
        if inner.generation == generation && inner.state == SessionState::Starting {
            self.transition(&mut inner, SessionState::Idle);
        }
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        info!(%from, %to, generation = inner.generation, "session state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        match self.events_tx.send(event) {
            Ok(count) => trace!("session event sent to {} subscribers", count),
            Err(_) => trace!("no subscribers for session event"),
        }
    }
}
