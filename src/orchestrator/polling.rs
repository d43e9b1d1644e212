//! Readiness polling: check, sleep, check again.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::monitor::ReadinessMonitor;
use crate::observer::SharedObserver;
use crate::types::{DatasetId, Event};

/// Source of time for the polling loop, replaceable in tests.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounds on how long to wait for a dataset
#[derive(Clone, Copy, Debug)]
pub(crate) struct PollBounds {
    pub(crate) interval: Duration,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) deadline: Option<Duration>,
}

/// Poll `monitor` until `dataset` is ready, returning the number of checks made.
///
/// Without `max_attempts` or `deadline` this waits indefinitely. A deadline is
/// enforced before sleeping: if the next check would start past it, polling
/// stops right away instead of sleeping first.
pub(crate) async fn wait_until_ready(
    monitor: &ReadinessMonitor,
    dataset: &DatasetId,
    bounds: PollBounds,
    clock: &dyn Clock,
    cancel_token: &CancellationToken,
    observer: &SharedObserver,
) -> Result<u32> {
    let started = clock.now();
    let mut attempts = 0u32;

    loop {
        if cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempts += 1;
        if monitor.is_ready(dataset).await? {
            observer.info(Event::DatasetReady {
                dataset: dataset.clone(),
                attempts,
            });
            return Ok(attempts);
        }

        let out_of_attempts = bounds.max_attempts.is_some_and(|max| attempts >= max);
        let past_deadline = bounds.deadline.is_some_and(|deadline| {
            clock.now().saturating_duration_since(started) + bounds.interval > deadline
        });
        if out_of_attempts || past_deadline {
            return Err(Error::NotReady {
                dataset: dataset.to_string(),
                attempts,
            });
        }

        observer.info(Event::DatasetNotReady {
            dataset: dataset.clone(),
            attempt: attempts,
            retry_in_secs: bounds.interval.as_secs(),
        });

        tokio::select! {
            _ = clock.sleep(bounds.interval) => {}
            _ = cancel_token.cancelled() => return Err(Error::Cancelled),
        }
    }
}
