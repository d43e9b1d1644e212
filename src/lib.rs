//! # gfs-fetch
//!
//! Waits for a GFS forecast cycle to appear on the NOAA FTP archive and
//! downloads its files concurrently.
//!
//! The archive gives no "run complete" marker. A dataset directory counts as
//! published once the archive root lists it with a size at or below a
//! configured threshold, so the crate polls the root listing until that holds,
//! then lists the dataset directory, selects files by a rendered name prefix
//! and fetches them with a bounded worker pool. A failed file never aborts its
//! siblings: the caller gets one outcome per file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gfs_fetch::{Config, FetchOrchestrator, FetchRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = FetchOrchestrator::new(Config::default())?;
//!
//!     let request = FetchRequest::new(2024, 1, 1, 0, "0p25")?.with_local_dir("./gfs");
//!     let report = orchestrator.run(&request).await?;
//!
//!     for outcome in report.failed() {
//!         eprintln!("{}: {:?}", outcome.file_name, outcome.error);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent file fetching
pub mod fetcher;
/// Remote directory listing and `ls -l` parsing
pub mod lister;
/// Dataset readiness detection
pub mod monitor;
/// Progress and error reporting
pub mod observer;
/// Readiness polling and fetch orchestration
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote archive access
pub mod transport;
/// Core types and events
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{ArchiveConfig, Config, FetchConfig, PollConfig, RetryConfig, ServerConfig};
pub use error::{Error, Result};
pub use fetcher::ConcurrentFetcher;
pub use lister::{DirectoryLister, UnixListingLister};
pub use monitor::ReadinessMonitor;
pub use observer::{ChannelObserver, Observer, SharedObserver, TracingObserver};
pub use orchestrator::{Clock, FetchOrchestrator, FetchRequest, SystemClock};
pub use transport::{ArchiveTransport, FtpTransport};
pub use types::{
    DatasetId, DirectoryEntry, DirectoryListing, Event, FailureKind, FetchFailure, FetchOutcome,
    FetchReport, FetchTask, ForecastCycle,
};

/// Run a fetch, cancelling it cleanly on a termination signal.
///
/// On a signal the orchestrator's cancellation token is cancelled: polling
/// stops with [`Error::Cancelled`], or, once fetching has begun, transfers
/// already running finish and the rest are reported as cancelled.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use gfs_fetch::{Config, FetchOrchestrator, FetchRequest, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = FetchOrchestrator::new(Config::default())?;
///     let request = FetchRequest::new(2024, 1, 1, 6, "0p50")?;
///
///     let report = run_with_shutdown(&orchestrator, &request).await?;
///     println!("{} of {} files fetched", report.succeeded().count(), report.len());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    orchestrator: &FetchOrchestrator,
    request: &FetchRequest,
) -> Result<FetchReport> {
    let token = orchestrator.cancellation_token();
    let run = orchestrator.run(request);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = wait_for_signal() => {
            tracing::info!("Shutdown requested, cancelling fetch");
            token.cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
