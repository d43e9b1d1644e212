//! Fetch orchestration: top-level lifecycle for one forecast cycle.
//!
//! Phases:
//! 1. Derive the dataset identifier and remote path from the cycle
//! 2. Poll the readiness monitor until the dataset is published
//! 3. List the dataset directory and keep files matching the rendered prefix
//! 4. Fetch the matches with the concurrent fetcher
//! 5. Report and return the outcome set

mod polling;


pub use polling::{Clock, SystemClock};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::ConcurrentFetcher;
use crate::lister::{DirectoryLister, UnixListingLister};
use crate::monitor::ReadinessMonitor;
use crate::observer::{SharedObserver, TracingObserver};
use crate::transport::{ArchiveTransport, FtpTransport};
use crate::types::{DatasetId, Event, FetchReport, ForecastCycle};

use polling::{PollBounds, wait_until_ready};

/// What to fetch for one run
///
/// Unset options fall back to the orchestrator's [`Config`].
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// Forecast cycle (date and hour)
    pub cycle: ForecastCycle,
    /// Grid resolution suffix, e.g. `0p25`
    pub resolution: String,
    /// File-name template overriding `archive.file_pattern`
    pub name_pattern: Option<String>,
    /// Local directory overriding `fetch.download_dir`
    pub local_dir: Option<PathBuf>,
    /// Worker count overriding `fetch.workers`
    pub workers: Option<usize>,
    /// Poll interval overriding `poll.interval`
    pub poll_interval: Option<Duration>,
}

impl FetchRequest {
    /// Request the files of one cycle at one resolution
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        resolution: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::for_cycle(
            ForecastCycle::new(year, month, day, hour)?,
            resolution,
        ))
    }

    /// Request the files of an already validated cycle
    pub fn for_cycle(cycle: ForecastCycle, resolution: impl Into<String>) -> Self {
        Self {
            cycle,
            resolution: resolution.into(),
            name_pattern: None,
            local_dir: None,
            workers: None,
            poll_interval: None,
        }
    }

    /// Use a different file-name template
    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    /// Write into a different local directory
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    /// Use a different worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Use a different poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// Waits for a dataset to be published and downloads the requested files.
#[derive(Clone)]
pub struct FetchOrchestrator {
    config: Arc<Config>,
    transport: Arc<dyn ArchiveTransport>,
    lister: Arc<dyn DirectoryLister>,
    observer: SharedObserver,
    clock: Arc<dyn Clock>,
    cancel_token: CancellationToken,
}

impl FetchOrchestrator {
    /// Create an orchestrator talking FTP to the configured server, logging through `tracing`
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn ArchiveTransport> = Arc::new(FtpTransport::new(
            config.server.clone(),
            config.fetch.chunk_size,
        ));
        Self::with_transport(config, transport)
    }

    /// Create an orchestrator on top of a custom transport, using the `ls -l` lister
    pub fn with_transport(config: Config, transport: Arc<dyn ArchiveTransport>) -> Result<Self> {
        let lister: Arc<dyn DirectoryLister> = Arc::new(UnixListingLister::new(Arc::clone(&transport)));
        Self::with_components(config, transport, lister)
    }

    /// Create an orchestrator from explicit transport and lister implementations
    pub fn with_components(
        config: Config,
        transport: Arc<dyn ArchiveTransport>,
        lister: Arc<dyn DirectoryLister>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
            lister,
            observer: Arc::new(TracingObserver),
            clock: Arc::new(SystemClock),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Report events to `observer` instead of plain `tracing`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Use `clock` for polling sleeps and deadlines
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Abort polling and stop starting transfers when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Token that cancels this orchestrator's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Readiness monitor for the configured archive
    pub fn monitor(&self) -> ReadinessMonitor {
        ReadinessMonitor::new(
            Arc::clone(&self.lister),
            &self.config.archive,
            Arc::clone(&self.observer),
        )
    }

    /// Dataset identifier of a cycle
    pub fn dataset_id(&self, cycle: &ForecastCycle) -> Result<DatasetId> {
        cycle.dataset_id(&self.config.archive.dataset_template)
    }

    /// Remote directory of a cycle's dataset
    pub fn dataset_path(&self, cycle: &ForecastCycle) -> Result<String> {
        let id = self.dataset_id(cycle)?;
        Ok(self.config.archive.dataset_path(id.as_str()))
    }

    /// File-name prefix selecting a request's files: rendered pattern, `.`, resolution
    pub fn file_prefix(&self, request: &FetchRequest) -> Result<String> {
        let pattern = request
            .name_pattern
            .as_deref()
            .unwrap_or(&self.config.archive.file_pattern);
        Ok(format!("{}.{}", request.cycle.render(pattern)?, request.resolution))
    }

    /// Identifiers of every dataset currently in the archive root
    pub async fn list_available_datasets(&self) -> Result<Vec<DatasetId>> {
        self.monitor().list_available_datasets().await
    }

    /// Block until the cycle's dataset is published, returning the number of checks made
    pub async fn wait_until_ready(&self, cycle: &ForecastCycle, interval: Duration) -> Result<u32> {
        if interval.is_zero() {
            return Err(Error::config(
                "poll.interval",
                "poll interval must be greater than zero",
            ));
        }
        let dataset = self.dataset_id(cycle)?;
        let bounds = PollBounds {
            interval,
            max_attempts: self.config.poll.max_attempts,
            deadline: self.config.poll.deadline,
        };
        wait_until_ready(
            &self.monitor(),
            &dataset,
            bounds,
            self.clock.as_ref(),
            &self.cancel_token,
            &self.observer,
        )
        .await
    }

    /// Wait for the dataset, then fetch every matching file
    ///
    /// Listing failures (while polling or enumerating files) fail the run.
    /// Individual file failures only show up in the returned report.
    pub async fn run(&self, request: &FetchRequest) -> Result<FetchReport> {
        let dataset = self.dataset_id(&request.cycle)?;
        let remote_dir = self.config.archive.dataset_path(dataset.as_str());
        let prefix = self.file_prefix(request)?;
        let local_dir = request
            .local_dir
            .clone()
            .unwrap_or_else(|| self.config.fetch.download_dir.clone());
        let workers = request.workers.unwrap_or(self.config.fetch.workers);
        let interval = request.poll_interval.unwrap_or(self.config.poll.interval);

        tracing::info!(
            %dataset,
            prefix = %prefix,
            local_dir = %local_dir.display(),
            workers,
            "Fetching dataset files"
        );

        self.wait_until_ready(&request.cycle, interval).await?;

        let listing = self.lister.list(&remote_dir).await?;
        let file_names = listing.names_with_prefix(&prefix);
        self.observer.info(Event::FilesMatched {
            dataset: dataset.clone(),
            prefix,
            count: file_names.len(),
        });

        let fetcher = ConcurrentFetcher::new(
            Arc::clone(&self.transport),
            workers,
            Arc::clone(&self.observer),
        )
        .with_retry(self.config.fetch.retry.clone())
        .with_cancellation(self.cancel_token.clone());

        Ok(fetcher.fetch(&remote_dir, file_names, &local_dir).await)
    }
}
