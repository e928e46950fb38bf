use super::common::*;
use std::sync::Arc;
use std::time::Duration;

use crate::workflows::sourcing::domain::{JobId, JobStatus};
use crate::workflows::sourcing::gateway::{GatewayError, JobResults};
use crate::workflows::sourcing::poller::{JobPoller, PollOutcome, PollerError};
use crate::workflows::sourcing::store::{JobStore, SnapshotKind};

fn poller(gateway: &Arc<FakeGateway>) -> (JobPoller<FakeGateway>, Arc<JobStore>) {
    let store = Arc::new(JobStore::new());
    let poller = JobPoller::new(Arc::clone(gateway), Arc::clone(&store), POLL_INTERVAL);
    (poller, store)
}

#[tokio::test(start_paused = true)]
async fn publishes_partial_results_then_stops_once_on_completion() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results(
        "job-1",
        vec![
            Ok(running(vec![candidate("a", 80), candidate("b", 70)])),
            Ok(completed(vec![
                candidate("a", 80),
                candidate("b", 70),
                candidate("c", 60),
            ])),
        ],
    );
    let (poller, store) = poller(&gateway);
    let mut events = store.subscribe();

    let completion = poller.start(JobId::from("job-1")).expect("poll started");
    let outcome = completion.wait().await;

    let first = events.recv().await.expect("intermediate snapshot");
    assert_eq!(first.kind, SnapshotKind::Intermediate);
    assert_eq!(first.candidates.len(), 2);
    let last = events.recv().await.expect("final snapshot");
    assert_eq!(last.kind, SnapshotKind::Final);
    assert_eq!(last.candidate_count, 3);

    match outcome {
        PollOutcome::Completed(snapshot) => assert_eq!(snapshot.candidate_count, 3),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!poller.is_polling(&JobId::from("job-1")));
    assert_eq!(store.status(&JobId::from("job-1")), Some(JobStatus::Completed));
    assert_eq!(gateway.count_calls("job_results"), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_absorbed_until_the_next_tick() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results(
        "job-1",
        vec![
            Err(GatewayError::Transient("connection reset".to_string())),
            Err(GatewayError::Service {
                status: 502,
                detail: "bad gateway".to_string(),
            }),
            Ok(completed(vec![candidate("a", 80)])),
        ],
    );
    let (poller, _store) = poller(&gateway);

    let outcome = poller
        .start(JobId::from("job-1"))
        .expect("poll started")
        .wait()
        .await;

    assert!(matches!(outcome, PollOutcome::Completed(_)));
    assert_eq!(gateway.count_calls("job_results"), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_job_publishes_error_snapshot_with_detail() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results(
        "job-1",
        vec![Ok(JobResults::failed("Job failed: search quota exhausted"))],
    );
    let (poller, store) = poller(&gateway);

    let outcome = poller
        .start(JobId::from("job-1"))
        .expect("poll started")
        .wait()
        .await;

    assert_eq!(
        outcome,
        PollOutcome::Failed {
            job_id: JobId::from("job-1"),
            detail: Some("Job failed: search quota exhausted".to_string()),
        }
    );
    let snapshot = store.snapshot(&JobId::from("job-1")).expect("snapshot stored");
    assert_eq!(snapshot.kind, SnapshotKind::Error);
    assert_eq!(store.status(&JobId::from("job-1")), Some(JobStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn unknown_job_stops_without_snapshot() {
    let gateway = Arc::new(FakeGateway::default());
    let (poller, store) = poller(&gateway);

    let outcome = poller
        .start(JobId::from("job-404"))
        .expect("poll started")
        .wait()
        .await;

    assert_eq!(
        outcome,
        PollOutcome::JobNotFound {
            job_id: JobId::from("job-404"),
        }
    );
    assert!(store.snapshot(&JobId::from("job-404")).is_none());
    assert!(!poller.is_polling(&JobId::from("job-404")));
}

#[tokio::test(start_paused = true)]
async fn second_start_for_same_job_is_rejected() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results("job-1", vec![Ok(running(Vec::new()))]);
    let (poller, _store) = poller(&gateway);

    let _first = poller.start(JobId::from("job-1")).expect("poll started");
    let second = poller.start(JobId::from("job-1"));

    assert_eq!(
        second.err(),
        Some(PollerError::AlreadyPolling {
            job_id: JobId::from("job-1"),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn requests_never_overlap_and_cancel_discards_in_flight_response() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results(
        "job-1",
        vec![Ok(running(vec![candidate("a", 80)]))],
    );
    let gate = gateway.gate_results();
    let (poller, store) = poller(&gateway);

    let completion = poller.start(JobId::from("job-1")).expect("poll started");
    gate.entered.notified().await;

    // Several periods pass while the first request is still outstanding.
    tokio::time::sleep(POLL_INTERVAL * 4).await;
    assert_eq!(gateway.count_calls("job_results"), 1);

    poller.cancel(&JobId::from("job-1"));
    gate.release.notify_one();
    tokio::time::sleep(POLL_INTERVAL * 2).await;

    assert_eq!(completion.wait().await, PollOutcome::Cancelled);
    assert!(store.snapshot(&JobId::from("job-1")).is_none());
    assert_eq!(store.status(&JobId::from("job-1")), None);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent_and_stops_further_ticks() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.script_results("job-1", vec![Ok(running(vec![candidate("a", 80)]))]);
    let (poller, store) = poller(&gateway);
    let mut events = store.subscribe();

    let completion = poller.start(JobId::from("job-1")).expect("poll started");
    events.recv().await.expect("first tick published");

    poller.cancel(&JobId::from("job-1"));
    poller.cancel(&JobId::from("job-1"));
    let calls = gateway.count_calls("job_results");
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(completion.wait().await, PollOutcome::Cancelled);
    assert_eq!(gateway.count_calls("job_results"), calls);
    assert!(events.try_recv().is_err());
}
