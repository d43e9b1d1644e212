//! Configuration types for gfs-fetch

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};
use crate::types::ForecastCycle;

/// FTP server connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname (default: "ftp.ncep.noaa.gov")
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 21)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user (default: "anonymous")
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password (default: "anonymous")
    #[serde(default = "default_username")]
    pub password: String,

    /// Timeout for establishing the control connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Socket read/write timeout once connected (None = no timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub io_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: default_username(),
            connect_timeout: default_connect_timeout(),
            io_timeout: None,
        }
    }
}

/// Layout of the remote archive
///
/// Templates use strftime-like specifiers rendered against the forecast cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory holding one sub-directory per dataset (default: "/pub/data/nccf/com/gfs/prod")
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Template for the dataset directory name (default: "gfs.%Y%m%d%H")
    #[serde(default = "default_dataset_template")]
    pub dataset_template: String,

    /// Template for the file-name prefix, before the resolution suffix (default: "gfs.t%Hz.pgrb2b")
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    /// Dataset directory size at or below which publication is complete (default: 196608)
    ///
    /// The archive pre-allocates dataset directories and their reported size
    /// shrinks as placeholders are replaced, so readiness is `size <= threshold`.
    #[serde(default = "default_ready_size_threshold")]
    pub ready_size_threshold: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            dataset_template: default_dataset_template(),
            file_pattern: default_file_pattern(),
            ready_size_threshold: default_ready_size_threshold(),
        }
    }
}

impl ArchiveConfig {
    /// Remote path of a dataset directory: `<root>/<identifier>`
    pub fn dataset_path(&self, dataset: &str) -> String {
        format!("{}/{}", self.root_path.trim_end_matches('/'), dataset)
    }
}

/// Download behavior configuration (directory, concurrency, chunking)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Local download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent file transfers (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Size of each read/write chunk while streaming a file (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-file retry policy (disabled by default)
    #[serde(default = "RetryConfig::disabled")]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            workers: default_workers(),
            chunk_size: default_chunk_size(),
            retry: RetryConfig::disabled(),
        }
    }
}

/// Readiness polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between readiness checks (default: 300 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Give up after this many readiness checks (None = unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Give up once this much time has passed since polling started (None = unbounded)
    #[serde(default, with = "optional_duration_serde")]
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            max_attempts: None,
            deadline: None,
        }
    }
}

/// Retry configuration for transient per-file failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for the fetcher
///
/// Fields are organized into logical sub-configs:
/// - [`server`](ServerConfig): where and how to connect
/// - [`archive`](ArchiveConfig): remote layout and readiness threshold
/// - [`fetch`](FetchConfig): local directory, worker pool, chunking, retry
/// - [`poll`](PollConfig): readiness polling interval and bounds
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// FTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote archive layout
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Download behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Readiness polling
    #[serde(default)]
    pub poll: PollConfig,
}

impl Config {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| crate::error::io_context(path, e))?;
        Self::from_json_str(&json)
    }

    /// Check settings that would otherwise fail late (or panic) at run time
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::config("server.host", "host must not be empty"));
        }
        if self.fetch.workers == 0 {
            return Err(Error::config(
                "fetch.workers",
                "worker count must be at least 1",
            ));
        }
        if self.fetch.chunk_size == 0 {
            return Err(Error::config(
                "fetch.chunk_size",
                "chunk size must be at least 1 byte",
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(Error::config(
                "poll.interval",
                "poll interval must be greater than zero",
            ));
        }
        if self.poll.max_attempts == Some(0) {
            return Err(Error::config(
                "poll.max_attempts",
                "at least one readiness check is required",
            ));
        }

        // Any valid cycle exercises every specifier in the templates
        let sample = ForecastCycle::new(2000, 1, 1, 0)?;
        for (key, template) in [
            ("archive.dataset_template", &self.archive.dataset_template),
            ("archive.file_pattern", &self.archive.file_pattern),
        ] {
            sample
                .render(template)
                .map_err(|e| Error::config(key, e.to_string()))?;
        }
        Ok(())
    }
}

fn default_host() -> String {
    "ftp.ncep.noaa.gov".to_string()
}

fn default_port() -> u16 {
    21
}

fn default_username() -> String {
    "anonymous".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_root_path() -> String {
    "/pub/data/nccf/com/gfs/prod".to_string()
}

fn default_dataset_template() -> String {
    "gfs.%Y%m%d%H".to_string()
}

fn default_file_pattern() -> String {
    "gfs.t%Hz.pgrb2b".to_string()
}

fn default_ready_size_threshold() -> u64 {
    196_608
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_workers() -> usize {
    crate::fetcher::DEFAULT_WORKERS
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
