//! Tests for the SessionController module.
//!
//! Tests are organized into categories:
//! - `start`: start/stop preconditions and failure reverts
//! - `ingest`: sample ordering and stale-run filtering
//! - `completion`: stream termination and the final results fetch
//! - `clear`: purge semantics
//! - `recovery`: warm start and its races with live runs

mod recovery;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use sim_api::{ApiError, ResultsResponse, RunConfig, TelemetrySample};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};

use super::{SessionController, SessionEvent};
use crate::backend::SimulationBackend;
use crate::stream::{CloseHandle, StreamError, StreamEvent, Subscription, Termination};

/// Test side of one subscription handed out by [`MockBackend`].
///
/// Events sent here reach the controller through a relay task that behaves
/// like the real adapter on a local close: it delivers one
/// `Closed(Graceful)`. Events the test keeps sending afterwards are still
/// relayed, to model frames already in flight.
pub(super) struct Feed {
    pub tx: mpsc::Sender<StreamEvent>,
    /// Resolves once the controller closes or drops its handle; `true` for
    /// an explicit close request.
    pub local_close: oneshot::Receiver<bool>,
}

impl Feed {
    pub async fn send(&self, event: StreamEvent) {
        self.tx.send(event).await.expect("pump should be listening");
    }

    pub async fn sample(&self, time: f64) {
        self.send(StreamEvent::Sample(sample(time))).await;
    }
}

/// In-memory backend that records every call.
#[derive(Default)]
pub(super) struct MockBackend {
    pub submits: AtomicUsize,
    pub halts: AtomicUsize,
    pub purges: AtomicUsize,
    pub results_fetches: AtomicUsize,
    pub history_fetches: AtomicUsize,
    pub subscribes: AtomicUsize,
    submitted: Mutex<Vec<RunConfig>>,
    fail_submit: Mutex<Option<ApiError>>,
    fail_halt: Mutex<Option<ApiError>>,
    fail_purge: Mutex<Option<ApiError>>,
    fail_subscribe: AtomicBool,
    results: Mutex<Option<Result<ResultsResponse, u16>>>,
    history: Mutex<Option<Result<Vec<TelemetrySample>, String>>>,
    submit_gate: Option<Arc<Notify>>,
    history_gate: Option<Arc<Notify>>,
    feeds: Mutex<VecDeque<Feed>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_submit(self, error: ApiError) -> Self {
        *self.fail_submit.lock().unwrap() = Some(error);
        self
    }

    pub fn failing_halt(self, error: ApiError) -> Self {
        *self.fail_halt.lock().unwrap() = Some(error);
        self
    }

    pub fn failing_purge(self, error: ApiError) -> Self {
        *self.fail_purge.lock().unwrap() = Some(error);
        self
    }

    pub fn failing_subscribe(self) -> Self {
        self.fail_subscribe.store(true, Ordering::SeqCst);
        self
    }

    /// Results endpoint reply; `Err(status)` fails with that HTTP status.
    pub fn with_results(self, reply: Result<ResultsResponse, u16>) -> Self {
        *self.results.lock().unwrap() = Some(reply);
        self
    }

    /// History endpoint reply; `Err(msg)` is a decode failure.
    pub fn with_history(self, reply: Result<Vec<TelemetrySample>, String>) -> Self {
        *self.history.lock().unwrap() = Some(reply);
        self
    }

    /// Holds every submit until the returned gate is notified.
    pub fn gated_submit(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    /// Holds every history fetch until the returned gate is notified.
    pub fn gated_history(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.history_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<RunConfig> {
        self.submitted.lock().unwrap().clone()
    }

    /// Takes the oldest subscription not yet claimed by the test.
    pub fn take_feed(&self) -> Feed {
        self.feeds
            .lock()
            .unwrap()
            .pop_front()
            .expect("a subscription should have been opened")
    }
}

impl SimulationBackend for MockBackend {
    fn submit<'a>(&'a self, config: &'a RunConfig) -> BoxFuture<'a, Result<(), ApiError>> {
        async move {
            self.submits.fetch_add(1, Ordering::SeqCst);
            self.submitted.lock().unwrap().push(config.clone());
            if let Some(gate) = &self.submit_gate {
                gate.notified().await;
            }
            match self.fail_submit.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn halt(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        async move {
            self.halts.fetch_add(1, Ordering::SeqCst);
            match self.fail_halt.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn purge(&self) -> BoxFuture<'_, Result<(), ApiError>> {
        async move {
            self.purges.fetch_add(1, Ordering::SeqCst);
            match self.fail_purge.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn fetch_results(&self) -> BoxFuture<'_, Result<ResultsResponse, ApiError>> {
        async move {
            self.results_fetches.fetch_add(1, Ordering::SeqCst);
            match self.results.lock().unwrap().clone() {
                Some(Ok(response)) => Ok(response),
                Some(Err(status)) => Err(ApiError::Server(status)),
                None => Ok(ResultsResponse {
                    status: Some("no results yet".to_string()),
                    ..Default::default()
                }),
            }
        }
        .boxed()
    }

    fn fetch_history(&self) -> BoxFuture<'_, Result<Vec<TelemetrySample>, ApiError>> {
        async move {
            self.history_fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.history_gate {
                gate.notified().await;
            }
            match self.history.lock().unwrap().clone() {
                Some(Ok(samples)) => Ok(samples),
                Some(Err(message)) => Err(ApiError::Decode(message)),
                None => Ok(Vec::new()),
            }
        }
        .boxed()
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<Subscription, StreamError>> {
        async move {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(StreamError::Connect {
                    url: "ws://mock/ws/simulation".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            let (tx, from_test) = mpsc::channel(64);
            let (to_pump, rx) = mpsc::channel(64);
            let (close, shutdown) = CloseHandle::new();
            let (local_close_tx, local_close) = oneshot::channel();
            tokio::spawn(relay(from_test, to_pump, shutdown, local_close_tx));
            self.feeds
                .lock()
                .unwrap()
                .push_back(Feed { tx, local_close });
            Ok(Subscription::new(rx, close))
        }
        .boxed()
    }
}

/// Forwards test events to the pump and answers a close request with a
/// single graceful termination.
async fn relay(
    mut from_test: mpsc::Receiver<StreamEvent>,
    to_pump: mpsc::Sender<StreamEvent>,
    mut shutdown: oneshot::Receiver<()>,
    local_close_tx: oneshot::Sender<bool>,
) {
    let mut local_close_tx = Some(local_close_tx);
    let mut test_open = true;
    loop {
        tokio::select! {
            requested = &mut shutdown, if local_close_tx.is_some() => {
                if let Some(tx) = local_close_tx.take() {
                    let _ = tx.send(requested.is_ok());
                }
                let _ = to_pump.send(StreamEvent::Closed(Termination::Graceful)).await;
            }
            event = from_test.recv(), if test_open => match event {
                Some(event) => {
                    let _ = to_pump.send(event).await;
                }
                None => test_open = false,
            },
            else => return,
        }
    }
}

/// Builds a controller over `backend`.
pub(super) fn controller(backend: &Arc<MockBackend>) -> SessionController {
    SessionController::new(backend.clone())
}

/// Starts a default run and claims its feed.
pub(super) async fn running(backend: &Arc<MockBackend>) -> (SessionController, Feed) {
    let controller = controller(backend);
    controller
        .start(RunConfig::default())
        .await
        .expect("start should succeed");
    (controller, backend.take_feed())
}

pub(super) fn sample(time: f64) -> TelemetrySample {
    TelemetrySample::new(time)
        .with_metric("queue_len", time * 2.0)
        .with_metric("completed_jobs", time)
}

/// A complete results record for a single tenant.
pub(super) fn tenant_zero_results() -> ResultsResponse {
    ResultsResponse {
        throughput: Some(BTreeMap::from([("tenant-0".to_string(), 3)])),
        avg_wait: BTreeMap::from([("tenant-0".to_string(), 1.5)]),
        fairness: Some(1.0),
        status: None,
    }
}

/// Receives events until one matches `pred`, failing after two seconds.
pub(super) async fn next_matching<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut pred: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event was not broadcast in time")
}

/// Waits until the results slot has been filled after completion.
pub(super) async fn results_updated(rx: &mut broadcast::Receiver<SessionEvent>) -> super::Results {
    match next_matching(rx, |e| matches!(e, SessionEvent::ResultsUpdated(_))).await {
        SessionEvent::ResultsUpdated(results) => results,
        other => panic!("unexpected event {other:?}"),
    }
}

/// Waits until the sample stamped `time` has been appended.
pub(super) async fn appended(rx: &mut broadcast::Receiver<SessionEvent>, time: f64) {
    next_matching(rx, |e| matches!(e, SessionEvent::SampleAppended(s) if s.time == time)).await;
}

/// Lets spawned tasks run; used where the expected outcome is that
/// nothing happens.
pub(super) async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
