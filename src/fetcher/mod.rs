//! Concurrent file fetching with best-effort partial-failure semantics.
//!
//! Every requested file becomes one [`FetchTask`] running on its own tokio
//! task with its own protocol session. At most `workers` tasks are in flight.
//! Whatever happens inside a task (connection refused, transfer aborted,
//! local write error, even a panic) ends up as a failure [`FetchOutcome`];
//! nothing escapes to sibling tasks or to the caller.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, io_context};
use crate::observer::SharedObserver;
use crate::retry::with_retry;
use crate::transport::ArchiveTransport;
use crate::types::{Event, FailureKind, FetchFailure, FetchOutcome, FetchReport, FetchTask};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Default number of concurrent transfers
pub const DEFAULT_WORKERS: usize = 4;

/// Downloads sets of remote files with a bounded worker pool.
#[derive(Clone)]
pub struct ConcurrentFetcher {
    transport: Arc<dyn ArchiveTransport>,
    workers: usize,
    retry: RetryConfig,
    observer: SharedObserver,
    cancel_token: CancellationToken,
}

impl ConcurrentFetcher {
    /// Create a fetcher running at most `workers` transfers at once (clamped to at least 1)
    pub fn new(transport: Arc<dyn ArchiveTransport>, workers: usize, observer: SharedObserver) -> Self {
        Self {
            transport,
            workers: workers.max(1),
            retry: RetryConfig::disabled(),
            observer,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Retry transient per-file failures with the given policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Stop starting new transfers once `token` is cancelled
    ///
    /// Transfers already running finish; files not yet started get a
    /// "cancelled" failure outcome so every requested file is still accounted for.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Configured worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Download `file_names` from `remote_dir` into `local_dir`
    ///
    /// Returns once every file has an outcome. Duplicate names are fetched once.
    /// Outcomes are in completion order.
    pub async fn fetch<I, S>(&self, remote_dir: &str, file_names: I, local_dir: &Path) -> FetchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = file_names.into_iter().map(Into::into).collect();
        let tasks: Vec<FetchTask> = names
            .into_iter()
            .map(|file_name| FetchTask {
                remote_dir: remote_dir.to_string(),
                file_name,
                local_dir: local_dir.to_path_buf(),
            })
            .collect();

        if tasks.is_empty() {
            return self.finish(FetchReport::default());
        }

        if let Err(e) = tokio::fs::create_dir_all(local_dir).await {
            let err = io_context(local_dir, e);
            let outcomes = tasks
                .into_iter()
                .map(|task| self.fail(&task.file_name, FetchFailure::from(&err)))
                .collect();
            return self.finish(FetchReport { outcomes });
        }

        let outcomes: Vec<FetchOutcome> = stream::iter(tasks)
            .map(|task| self.start(task))
            .map(|(file_name, handle)| join_task(file_name, handle, Arc::clone(&self.observer)))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        self.finish(FetchReport { outcomes })
    }

    /// Spawn one task unless the batch has been cancelled.
    fn start(&self, task: FetchTask) -> (String, Option<JoinHandle<FetchOutcome>>) {
        let file_name = task.file_name.clone();
        if self.cancel_token.is_cancelled() {
            return (file_name, None);
        }
        let handle = tokio::spawn(run_fetch_task(
            task,
            Arc::clone(&self.transport),
            self.retry.clone(),
            Arc::clone(&self.observer),
        ));
        (file_name, Some(handle))
    }

    fn fail(&self, file_name: &str, failure: FetchFailure) -> FetchOutcome {
        self.observer.error(Event::FetchFailed {
            file_name: file_name.to_string(),
            failure: failure.clone(),
        });
        FetchOutcome::failed(file_name, failure)
    }

    fn finish(&self, report: FetchReport) -> FetchReport {
        let succeeded = report.succeeded().count();
        let failed = report.len() - succeeded;
        let event = Event::BatchComplete { succeeded, failed };
        if failed > 0 {
            self.observer.error(event);
        } else {
            self.observer.info(event);
        }
        report
    }
}

/// Wait for a spawned task; a task that never ran or panicked still yields an outcome.
async fn join_task(
    file_name: String,
    handle: Option<JoinHandle<FetchOutcome>>,
    observer: SharedObserver,
) -> FetchOutcome {
    let failure = match handle {
        None => FetchFailure::from(&Error::Cancelled),
        Some(handle) => match handle.await {
            Ok(outcome) => return outcome,
            Err(e) => FetchFailure {
                kind: FailureKind::Join,
                message: format!("fetch task for {file_name} did not complete: {e}"),
            },
        },
    };
    observer.error(Event::FetchFailed {
        file_name: file_name.clone(),
        failure: failure.clone(),
    });
    FetchOutcome::failed(file_name, failure)
}

/// Run a single transfer, converting every error into a failure outcome.
async fn run_fetch_task(
    task: FetchTask,
    transport: Arc<dyn ArchiveTransport>,
    retry: RetryConfig,
    observer: SharedObserver,
) -> FetchOutcome {
    observer.info(Event::FetchStarted {
        file_name: task.file_name.clone(),
        remote_dir: task.remote_dir.clone(),
        local_dir: task.local_dir.clone(),
    });

    let target = task.target_path();
    let transport: &dyn ArchiveTransport = transport.as_ref();
    let remote_dir = task.remote_dir.as_str();
    let file_name = task.file_name.as_str();
    let target_ref = target.as_path();

    let (result, attempts) = with_retry(&retry, move || {
        transport.retrieve(remote_dir, file_name, target_ref)
    })
    .await;

    match result {
        Ok(bytes) => {
            observer.info(Event::FetchSucceeded {
                file_name: task.file_name.clone(),
                path: target.clone(),
                bytes,
            });
            FetchOutcome::succeeded(task.file_name, target, bytes).with_attempts(attempts)
        }
        Err(e) => {
            let failure = FetchFailure::from(&e);
            observer.error(Event::FetchFailed {
                file_name: task.file_name.clone(),
                failure: failure.clone(),
            });
            FetchOutcome::failed(task.file_name, failure).with_attempts(attempts)
        }
    }
}
