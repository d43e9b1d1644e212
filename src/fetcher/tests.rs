//! Tests for the concurrent fetcher.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ConcurrentFetcher;
use crate::config::RetryConfig;
use crate::test_helpers::{Failure, MockTransport, RecordingObserver, Severity};
use crate::types::{Event, FailureKind};

const REMOTE_DIR: &str = "/pub/data/nccf/com/gfs/prod/gfs.2024010100";

fn names(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("gfs.t00z.pgrb2b.0p25.f{i:03}"))
        .collect()
}

fn transport_with(files: &[String]) -> Arc<MockTransport> {
    let transport = Arc::new(MockTransport::new());
    for name in files {
        transport.add_file(name, name.as_bytes());
    }
    transport
}

// -----------------------------------------------------------------------
// Outcome accounting
// -----------------------------------------------------------------------

#[tokio::test]
async fn three_files_two_workers_one_failure() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(3);
    let transport = transport_with(&files);
    transport.fail_file(&files[1], Failure::Transfer);
    let observer = Arc::new(RecordingObserver::default());

    let fetcher = ConcurrentFetcher::new(transport, 2, observer.clone());
    let report = fetcher.fetch(REMOTE_DIR, files.clone(), dir.path()).await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.succeeded().count(), 2);
    assert_eq!(report.failed().count(), 1);

    let failed = report.get(&files[1]).unwrap();
    assert!(!failed.success);
    assert!(failed.local_path.is_none());
    let failure = failed.error.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Transfer);
    assert!(failure.message.contains("426"));

    for name in [&files[0], &files[2]] {
        let outcome = report.get(name).unwrap();
        assert!(outcome.success);
        let path = outcome.local_path.as_ref().unwrap();
        assert_eq!(path, &dir.path().join(name));
        assert_eq!(std::fs::read(path).unwrap(), name.as_bytes());
    }
}

#[tokio::test]
async fn one_outcome_per_name_for_every_worker_count() {
    let files = names(6);
    for workers in 1..=files.len() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport_with(&files);
        let fetcher =
            ConcurrentFetcher::new(transport, workers, Arc::new(RecordingObserver::default()));

        let report = fetcher.fetch(REMOTE_DIR, files.clone(), dir.path()).await;

        assert_eq!(report.len(), files.len(), "workers = {workers}");
        let mut got: Vec<_> = report.outcomes.iter().map(|o| o.file_name.clone()).collect();
        got.sort();
        assert_eq!(got, files, "workers = {workers}");
        assert!(report.is_complete_success());
    }
}

#[tokio::test]
async fn single_failure_does_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(8);
    let transport = transport_with(&files);
    transport.fail_file(&files[3], Failure::Connection);

    let fetcher = ConcurrentFetcher::new(transport, 3, Arc::new(RecordingObserver::default()));
    let report = fetcher.fetch(REMOTE_DIR, files.clone(), dir.path()).await;

    assert_eq!(report.succeeded().count(), 7);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(
        report.get(&files[3]).unwrap().error.as_ref().unwrap().kind,
        FailureKind::Connection
    );
}

#[tokio::test]
async fn missing_remote_file_is_transfer_failure() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MockTransport::new());
    let fetcher = ConcurrentFetcher::new(transport, 2, Arc::new(RecordingObserver::default()));

    let report = fetcher
        .fetch(REMOTE_DIR, ["gfs.t00z.pgrb2b.0p25.f000"], dir.path())
        .await;

    assert_eq!(report.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.error.as_ref().unwrap().kind, FailureKind::Transfer);
}

#[tokio::test]
async fn duplicate_names_are_fetched_once() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(2);
    let transport = transport_with(&files);
    let fetcher =
        ConcurrentFetcher::new(transport.clone(), 2, Arc::new(RecordingObserver::default()));

    let requested = vec![files[0].clone(), files[1].clone(), files[0].clone()];
    let report = fetcher.fetch(REMOTE_DIR, requested, dir.path()).await;

    assert_eq!(report.len(), 2);
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_request_returns_empty_report_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(MockTransport::new());
    let observer = Arc::new(RecordingObserver::default());
    let fetcher = ConcurrentFetcher::new(transport, 4, observer.clone());

    let report = fetcher
        .fetch(REMOTE_DIR, Vec::<String>::new(), dir.path())
        .await;

    assert!(report.is_empty());
    assert_eq!(
        observer.events(),
        vec![(
            Severity::Info,
            Event::BatchComplete {
                succeeded: 0,
                failed: 0
            }
        )]
    );
}

// -----------------------------------------------------------------------
// Worker pool
// -----------------------------------------------------------------------

#[tokio::test]
async fn in_flight_transfers_never_exceed_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(10);
    let transport = Arc::new(MockTransport::with_transfer_delay(Duration::from_millis(20)));
    for name in &files {
        transport.add_file(name, b"x");
    }

    let fetcher =
        ConcurrentFetcher::new(transport.clone(), 3, Arc::new(RecordingObserver::default()));
    let report = fetcher.fetch(REMOTE_DIR, files, dir.path()).await;

    assert_eq!(report.len(), 10);
    let max = transport.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "max in flight was {max}");
    assert!(max >= 2, "transfers should overlap, max in flight was {max}");
}

#[test]
fn zero_workers_is_clamped_to_one() {
    let fetcher = ConcurrentFetcher::new(
        Arc::new(MockTransport::new()),
        0,
        Arc::new(RecordingObserver::default()),
    );
    assert_eq!(fetcher.workers(), 1);
}

#[tokio::test]
async fn panicking_worker_becomes_join_failure() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(3);
    let transport = transport_with(&files);
    transport.panic_on(&files[0]);

    let fetcher = ConcurrentFetcher::new(transport, 2, Arc::new(RecordingObserver::default()));
    let report = fetcher.fetch(REMOTE_DIR, files.clone(), dir.path()).await;

    assert_eq!(report.len(), 3);
    assert_eq!(
        report.get(&files[0]).unwrap().error.as_ref().unwrap().kind,
        FailureKind::Join
    );
    assert_eq!(report.succeeded().count(), 2);
}

#[tokio::test]
async fn creates_missing_local_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("gfs").join("2024010100");
    let files = names(1);
    let fetcher = ConcurrentFetcher::new(
        transport_with(&files),
        1,
        Arc::new(RecordingObserver::default()),
    );

    let report = fetcher.fetch(REMOTE_DIR, files.clone(), &nested).await;

    assert!(report.is_complete_success());
    assert!(nested.join(&files[0]).exists());
}

#[tokio::test]
async fn unusable_local_directory_fails_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let files = names(2);
    let transport = transport_with(&files);

    let fetcher =
        ConcurrentFetcher::new(transport.clone(), 2, Arc::new(RecordingObserver::default()));
    let report = fetcher
        .fetch(REMOTE_DIR, files, &blocker.join("sub"))
        .await;

    assert_eq!(report.len(), 2);
    assert!(
        report
            .failed()
            .all(|o| o.error.as_ref().unwrap().kind == FailureKind::Io)
    );
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 0);
}

// -----------------------------------------------------------------------
// Cancellation and retry
// -----------------------------------------------------------------------

#[tokio::test]
async fn cancelled_batch_still_accounts_for_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(4);
    let transport = transport_with(&files);
    let token = CancellationToken::new();
    token.cancel();

    let fetcher = ConcurrentFetcher::new(transport.clone(), 2, Arc::new(RecordingObserver::default()))
        .with_cancellation(token);
    let report = fetcher.fetch(REMOTE_DIR, files, dir.path()).await;

    assert_eq!(report.len(), 4);
    assert_eq!(report.failed().count(), 4);
    assert!(
        report
            .failed()
            .all(|o| o.error.as_ref().unwrap().message.contains("cancelled"))
    );
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retry_policy_retries_connection_failures() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(1);
    let transport = transport_with(&files);
    transport.fail_file(&files[0], Failure::Connection);

    let retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let fetcher = ConcurrentFetcher::new(transport.clone(), 1, Arc::new(RecordingObserver::default()))
        .with_retry(retry);
    let report = fetcher.fetch(REMOTE_DIR, files, dir.path()).await;

    let outcome = &report.outcomes[0];
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_policy_skips_permanent_replies() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(2);
    let transport = transport_with(&files);
    transport.fail_file(&files[0], Failure::MissingDirectory);
    transport.fail_file(&files[1], Failure::Transfer);

    let retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    let fetcher = ConcurrentFetcher::new(transport.clone(), 1, Arc::new(RecordingObserver::default()))
        .with_retry(retry);
    let report = fetcher.fetch(REMOTE_DIR, files.clone(), dir.path()).await;

    let attempts = |name: &str| {
        report
            .outcomes
            .iter()
            .find(|o| o.file_name == name)
            .unwrap()
            .attempts
    };
    // 550 on CWD fails once; the 426 abort is retried to exhaustion
    assert_eq!(attempts(&files[0]), 1);
    assert_eq!(attempts(&files[1]), 3);
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn no_retry_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(1);
    let transport = transport_with(&files);
    transport.fail_file(&files[0], Failure::Connection);

    let fetcher =
        ConcurrentFetcher::new(transport.clone(), 1, Arc::new(RecordingObserver::default()));
    let report = fetcher.fetch(REMOTE_DIR, files, dir.path()).await;

    assert_eq!(report.outcomes[0].attempts, 1);
    assert_eq!(transport.retrieve_calls.load(Ordering::SeqCst), 1);
}

// -----------------------------------------------------------------------
// Observability
// -----------------------------------------------------------------------

#[tokio::test]
async fn reports_start_success_failure_and_batch() {
    let dir = tempfile::tempdir().unwrap();
    let files = names(3);
    let transport = transport_with(&files);
    transport.fail_file(&files[2], Failure::Transfer);
    let observer = Arc::new(RecordingObserver::default());

    let fetcher = ConcurrentFetcher::new(transport, 2, observer.clone());
    fetcher.fetch(REMOTE_DIR, files, dir.path()).await;

    assert_eq!(
        observer.count(|e| matches!(e, Event::FetchStarted { .. })),
        3
    );
    assert_eq!(
        observer.count(|e| matches!(e, Event::FetchSucceeded { .. })),
        2
    );
    assert_eq!(observer.count(|e| matches!(e, Event::FetchFailed { .. })), 1);

    let events = observer.events();
    let failed_severity = events
        .iter()
        .find(|(_, e)| matches!(e, Event::FetchFailed { .. }))
        .map(|(s, _)| *s);
    assert_eq!(failed_severity, Some(Severity::Error));

    let last = events.last().unwrap();
    assert_eq!(
        last.1,
        Event::BatchComplete {
            succeeded: 2,
            failed: 1
        }
    );
}
