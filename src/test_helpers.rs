//! Shared test doubles: an in-memory archive, a recording observer and a fake clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::orchestrator::Clock;
use crate::transport::ArchiveTransport;
use crate::types::Event;

/// Format one `ls -l` style listing line
pub(crate) fn listing_line(name: &str, size: u64) -> String {
    format!("drwxr-xr-x    2 ftp      ftp      {size:>8} Jan 01 00:00 {name}")
}

/// How a mocked file transfer should fail
#[derive(Clone, Debug)]
pub(crate) enum Failure {
    Connection,
    Transfer,
    /// `550` on `CWD`: reported as a connection error that is not retried
    MissingDirectory,
}

/// In-memory archive standing in for the FTP server.
#[derive(Default)]
pub(crate) struct MockTransport {
    listings: Mutex<HashMap<String, Vec<String>>>,
    listing_sequences: Mutex<HashMap<String, VecDeque<Vec<String>>>>,
    unreachable_paths: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, Failure>>,
    panics: Mutex<HashSet<String>>,
    transfer_delay: Option<Duration>,
    pub(crate) list_calls: AtomicUsize,
    pub(crate) retrieve_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_transfer_delay(delay: Duration) -> Self {
        Self {
            transfer_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn set_listing(&self, path: &str, lines: Vec<String>) {
        self.listings
            .lock()
            .unwrap()
            .insert(path.to_string(), lines);
    }

    /// Serve `sequence` one listing per call; the last one repeats
    pub(crate) fn set_listing_sequence(&self, path: &str, sequence: Vec<Vec<String>>) {
        self.listing_sequences
            .lock()
            .unwrap()
            .insert(path.to_string(), sequence.into());
    }

    pub(crate) fn set_unreachable(&self, path: &str) {
        self.unreachable_paths
            .lock()
            .unwrap()
            .insert(path.to_string());
    }

    pub(crate) fn add_file(&self, name: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), contents.to_vec());
    }

    pub(crate) fn fail_file(&self, name: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(name.to_string(), failure);
    }

    pub(crate) fn panic_on(&self, name: &str) {
        self.panics.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait::async_trait]
impl ArchiveTransport for MockTransport {
    async fn list_lines(&self, path: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable_paths.lock().unwrap().contains(path) {
            return Err(
                Error::connection(Some(path), "550 Failed to change directory").retryable(false),
            );
        }
        if let Some(sequence) = self.listing_sequences.lock().unwrap().get_mut(path) {
            let lines = if sequence.len() > 1 {
                sequence.pop_front()
            } else {
                sequence.front().cloned()
            };
            if let Some(lines) = lines {
                return Ok(lines);
            }
        }
        self.listings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                Error::connection(Some(path), "550 Failed to change directory").retryable(false)
            })
    }

    async fn retrieve(&self, remote_dir: &str, file_name: &str, target: &Path) -> Result<u64> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }

        let should_panic = self.panics.lock().unwrap().contains(file_name);
        let failure = self.failures.lock().unwrap().get(file_name).cloned();
        let contents = self.files.lock().unwrap().get(file_name).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if should_panic {
            panic!("simulated worker panic for {file_name}");
        }
        match failure {
            Some(Failure::Connection) => {
                return Err(Error::connection(None, "421 Service not available"));
            }
            Some(Failure::Transfer) => {
                return Err(Error::transfer(file_name, "426 Transfer aborted").retryable(true));
            }
            Some(Failure::MissingDirectory) => {
                return Err(
                    Error::connection(Some(remote_dir), "550 Failed to change directory")
                        .retryable(false),
                );
            }
            None => {}
        }

        let contents = contents
            .ok_or_else(|| Error::transfer(file_name, "550 Failed to open file"))?;
        tokio::fs::write(target, &contents).await?;
        Ok(contents.len() as u64)
    }
}

/// Severity an event was reported with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Severity {
    Info,
    Error,
}

/// Observer that keeps every event in memory.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<(Severity, Event)>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<(Severity, Event)> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| pred(e))
            .count()
    }
}

impl Observer for RecordingObserver {
    fn info(&self, event: Event) {
        self.events.lock().unwrap().push((Severity::Info, event));
    }

    fn error(&self, event: Event) {
        self.events.lock().unwrap().push((Severity::Error, event));
    }
}

/// Clock whose time only moves when something sleeps on it.
pub(crate) struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        *self.elapsed.lock().unwrap() += duration;
    }
}
