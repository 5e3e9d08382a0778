//! Warm start tests.

use std::sync::Arc;

use sim_api::{ResultsResponse, RunConfig};

use super::{appended, controller, next_matching, sample, tenant_zero_results, MockBackend};
use crate::session::{RecoveryReport, Results, SessionEvent, SlotOutcome};
use crate::SessionState;

#[tokio::test]
async fn test_recovery_loads_history_and_results() {
    let history = vec![sample(1.0), sample(2.0)];
    let backend = Arc::new(
        MockBackend::new()
            .with_history(Ok(history.clone()))
            .with_results(Ok(tenant_zero_results())),
    );
    let controller = controller(&backend);
    let mut events = controller.subscribe();

    let report = controller.recover().await;

    assert_eq!(
        report,
        RecoveryReport {
            history: SlotOutcome::Loaded(2),
            results: SlotOutcome::Loaded(1),
        }
    );
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.buffer, history);
    assert!(matches!(snapshot.results, Results::Ready(_)));
    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::Recovered {
            samples: 2,
            results: true,
        }
    );
}

#[tokio::test]
async fn test_recovered_history_keeps_persisted_order() {
    let history = vec![sample(2.0), sample(1.0), sample(3.0)];
    let backend = Arc::new(MockBackend::new().with_history(Ok(history.clone())));
    let controller = controller(&backend);

    let report = controller.recover().await;

    assert_eq!(report.history, SlotOutcome::Loaded(3));
    assert_eq!(controller.snapshot().await.buffer, history);
}

#[tokio::test]
async fn test_recovery_ignores_placeholder_results() {
    let backend = Arc::new(MockBackend::new().with_history(Ok(vec![sample(1.0)])));
    let controller = controller(&backend);

    let report = controller.recover().await;

    assert_eq!(report.history, SlotOutcome::Loaded(1));
    assert_eq!(report.results, SlotOutcome::Nothing);
    assert_eq!(controller.snapshot().await.results, Results::Empty);
}

#[tokio::test]
async fn test_recovery_rejects_empty_throughput() {
    let backend = Arc::new(MockBackend::new().with_results(Ok(ResultsResponse {
        throughput: Some(Default::default()),
        ..Default::default()
    })));
    let controller = controller(&backend);

    let report = controller.recover().await;

    assert!(matches!(report.results, SlotOutcome::Failed(_)));
    assert_eq!(controller.snapshot().await.results, Results::Empty);
}

#[tokio::test]
async fn test_recovery_failures_degrade_to_empty() {
    let backend = Arc::new(
        MockBackend::new()
            .with_history(Err("expected a sequence".into()))
            .with_results(Err(500)),
    );
    let controller = controller(&backend);
    let mut events = controller.subscribe();

    let report = controller.recover().await;

    assert!(matches!(report.history, SlotOutcome::Failed(_)));
    assert!(matches!(report.results, SlotOutcome::Failed(_)));
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.buffer.is_empty());
    assert_eq!(snapshot.results, Results::Empty);
    assert!(events.try_recv().is_err(), "nothing was recovered");
}

#[tokio::test]
async fn test_recovery_runs_once() {
    let backend = Arc::new(MockBackend::new().with_history(Ok(vec![sample(1.0)])));
    let controller = controller(&backend);

    controller.recover().await;
    let second = controller.recover().await;

    assert_eq!(second.history, SlotOutcome::Skipped);
    assert_eq!(second.results, SlotOutcome::Skipped);
    assert_eq!(MockBackend::count(&backend.history_fetches), 1);
}

#[tokio::test]
async fn test_late_recovery_does_not_overwrite_live_run() {
    let (mock, gate) = MockBackend::new()
        .with_history(Ok(vec![sample(100.0), sample(101.0)]))
        .with_results(Ok(tenant_zero_results()))
        .gated_history();
    let backend = Arc::new(mock);
    let controller = controller(&backend);
    let mut events = controller.subscribe();

    let recovery = controller.spawn_recovery();
    controller.start(RunConfig::default()).await.expect("start");
    let feed = backend.take_feed();
    feed.sample(1.0).await;
    appended(&mut events, 1.0).await;

    gate.notify_one();
    let report = recovery.await.expect("recovery task");

    assert_eq!(report.history, SlotOutcome::Superseded);
    assert_eq!(report.results, SlotOutcome::Superseded);
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Running);
    assert_eq!(snapshot.buffer, vec![sample(1.0)]);
    assert_eq!(snapshot.results, Results::Empty);
}

#[tokio::test]
async fn test_recovery_racing_clear_is_discarded() {
    let (mock, gate) = MockBackend::new()
        .with_history(Ok(vec![sample(1.0)]))
        .gated_history();
    let backend = Arc::new(mock);
    let controller = controller(&backend);

    let recovery = controller.spawn_recovery();
    // Make sure recovery has captured its generation before clearing.
    while MockBackend::count(&backend.history_fetches) == 0 {
        tokio::task::yield_now().await;
    }
    controller.clear().await.expect("clear");

    gate.notify_one();
    let report = recovery.await.expect("recovery task");

    assert_eq!(report.history, SlotOutcome::Superseded);
    assert!(controller.snapshot().await.buffer.is_empty());
}

#[tokio::test]
async fn test_start_discards_recovered_state() {
    let backend = Arc::new(
        MockBackend::new()
            .with_history(Ok(vec![sample(1.0), sample(2.0)]))
            .with_results(Ok(tenant_zero_results())),
    );
    let controller = controller(&backend);
    controller.recover().await;
    let mut events = controller.subscribe();

    controller.start(RunConfig::default()).await.expect("start");

    let snapshot = controller.snapshot().await;
    assert!(snapshot.buffer.is_empty());
    assert_eq!(snapshot.results, Results::Empty);
    next_matching(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StateChanged {
                to: SessionState::Running,
                ..
            }
        )
    })
    .await;
}
