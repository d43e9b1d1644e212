//! Observability collaborators
//!
//! Every component receives an [`Observer`] explicitly instead of logging
//! through process-wide state. Readiness checks and fetch starts/successes are
//! reported at info severity; fetch failures at error severity.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::Event;

/// Sink for [`Event`]s, split by severity
pub trait Observer: Send + Sync {
    /// Report an informational event
    fn info(&self, event: Event);

    /// Report an error event
    fn error(&self, event: Event);
}

/// Shared observer handle passed to every component
pub type SharedObserver = Arc<dyn Observer>;

/// Observer that writes structured `tracing` records
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn info(&self, event: Event) {
        log_event(&event);
    }

    fn error(&self, event: Event) {
        log_event(&event);
    }
}

/// Observer that logs through `tracing` and forwards events to broadcast subscribers
///
/// Sending never blocks; events are dropped when nobody is subscribed.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    event_tx: broadcast::Sender<Event>,
}

impl ChannelObserver {
    /// Create an observer with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Observer for ChannelObserver {
    fn info(&self, event: Event) {
        log_event(&event);
        self.event_tx.send(event).ok();
    }

    fn error(&self, event: Event) {
        log_event(&event);
        self.event_tx.send(event).ok();
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ReadinessChecked {
            dataset,
            size,
            threshold,
            ready,
        } => {
            tracing::info!(%dataset, size = ?size, threshold, ready, "Readiness checked");
        }
        Event::DatasetNotReady {
            dataset,
            attempt,
            retry_in_secs,
        } => {
            tracing::info!(%dataset, attempt, retry_in_secs, "Dataset not ready, sleeping");
        }
        Event::DatasetReady { dataset, attempts } => {
            tracing::info!(%dataset, attempts, "Dataset ready");
        }
        Event::FilesMatched {
            dataset,
            prefix,
            count,
        } => {
            tracing::info!(%dataset, prefix = %prefix, count, "Matched dataset files");
        }
        Event::FetchStarted {
            file_name,
            remote_dir,
            local_dir,
        } => {
            tracing::info!(
                file = %file_name,
                remote_dir = %remote_dir,
                local_dir = %local_dir.display(),
                "Fetching file"
            );
        }
        Event::FetchSucceeded {
            file_name,
            path,
            bytes,
        } => {
            tracing::info!(file = %file_name, path = %path.display(), bytes, "File saved");
        }
        Event::FetchFailed { file_name, failure } => {
            tracing::error!(
                file = %file_name,
                kind = ?failure.kind,
                error = %failure.message,
                "File fetch failed"
            );
        }
        Event::BatchComplete { succeeded, failed } if *failed > 0 => {
            tracing::warn!(succeeded, failed, "Fetch batch finished with failures");
        }
        Event::BatchComplete { succeeded, failed } => {
            tracing::info!(succeeded, failed, "Fetch batch finished");
        }
    }
}
