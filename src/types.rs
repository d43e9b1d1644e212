//! Core types for gfs-fetch

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// A forecast model run, identified by its calendar date and cycle hour
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastCycle(NaiveDateTime);

impl ForecastCycle {
    /// Create a cycle from its components, rejecting impossible dates and hours
    ///
    /// # Examples
    ///
    /// ```
    /// use gfs_fetch::types::ForecastCycle;
    ///
    /// let cycle = ForecastCycle::new(2024, 1, 1, 6).unwrap();
    /// assert_eq!(cycle.render("%Y%m%d%H").unwrap(), "2024010106");
    /// assert!(ForecastCycle::new(2024, 2, 30, 0).is_err());
    /// ```
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .map(Self)
            .ok_or(Error::InvalidCycle {
                year,
                month,
                day,
                hour,
            })
    }

    /// The cycle as a naive (UTC) date-time
    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Render a strftime-like template against this cycle
    ///
    /// Malformed templates are reported as configuration errors instead of panicking.
    pub fn render(&self, template: &str) -> Result<String> {
        let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(Error::Config {
                message: format!("invalid template {template:?}"),
                key: None,
            });
        }

        let mut out = String::new();
        write!(out, "{}", self.0.format_with_items(items.into_iter())).map_err(|_| {
            Error::Config {
                message: format!("template {template:?} cannot be rendered for a cycle"),
                key: None,
            }
        })?;
        Ok(out)
    }

    /// Build the dataset identifier for this cycle from the given template
    pub fn dataset_id(&self, template: &str) -> Result<DatasetId> {
        self.render(template).map(DatasetId)
    }
}

impl std::fmt::Display for ForecastCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %Hz"))
    }
}

/// Name of one remote dataset directory (e.g. `gfs.2024010106`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl DatasetId {
    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One record of a remote directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (file or directory)
    pub name: String,
    /// Size reported by the server in bytes
    pub size: u64,
}

/// Contents of one remote directory at one point in time
///
/// Names are unique; inserting a name twice keeps the last entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    entries: HashMap<String, DirectoryEntry>,
}

impl DirectoryListing {
    /// Create an empty listing
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any earlier entry with the same name
    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.get(name)
    }

    /// Whether an entry with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of distinct entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    /// Names starting with `prefix`, sorted
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl FromIterator<DirectoryEntry> for DirectoryListing {
    fn from_iter<I: IntoIterator<Item = DirectoryEntry>>(iter: I) -> Self {
        let mut listing = Self::new();
        for entry in iter {
            listing.insert(entry);
        }
        listing
    }
}

/// One file to download within a fetch batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTask {
    /// Remote directory holding the file
    pub remote_dir: String,
    /// Remote (and local) file name
    pub file_name: String,
    /// Local directory to write into
    pub local_dir: PathBuf,
}

impl FetchTask {
    /// Local path the file is written to
    pub fn target_path(&self) -> PathBuf {
        self.local_dir.join(&self.file_name)
    }
}

/// Classification of a failed file transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Session could not be established or the remote directory could not be entered
    Connection,
    /// The transfer itself failed after the session was up
    Transfer,
    /// Local filesystem error (creating or writing the target)
    Io,
    /// The worker running the transfer panicked or was aborted
    Join,
}

/// Why a single file transfer failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable error description
    pub message: String,
}

impl From<&Error> for FetchFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of one [`FetchTask`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Remote file name
    pub file_name: String,
    /// Where the file was written (only on success)
    pub local_path: Option<PathBuf>,
    /// Whether the file was downloaded completely
    pub success: bool,
    /// Failure details (only on failure)
    pub error: Option<FetchFailure>,
    /// Bytes written to disk
    pub bytes: u64,
    /// Number of transfer attempts made
    pub attempts: u32,
}

impl FetchOutcome {
    /// Build a success outcome
    pub fn succeeded(file_name: impl Into<String>, local_path: PathBuf, bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            local_path: Some(local_path),
            success: true,
            error: None,
            bytes,
            attempts: 1,
        }
    }

    /// Build a failure outcome
    pub fn failed(file_name: impl Into<String>, failure: FetchFailure) -> Self {
        Self {
            file_name: file_name.into(),
            local_path: None,
            success: false,
            error: Some(failure),
            bytes: 0,
            attempts: 1,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// All outcomes of one fetch batch, in completion order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// One outcome per requested file
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Successful outcomes
    pub fn succeeded(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    /// Failed outcomes
    pub fn failed(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Outcome for a given file name
    pub fn get(&self, file_name: &str) -> Option<&FetchOutcome> {
        self.outcomes.iter().find(|o| o.file_name == file_name)
    }

    /// True when every file in the batch was downloaded
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Event emitted while polling for and fetching a dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A readiness check completed
    ReadinessChecked {
        /// Dataset identifier
        dataset: DatasetId,
        /// Directory size reported by the archive (None if absent)
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
        /// Size at or below which the dataset counts as published
        threshold: u64,
        /// Result of the check
        ready: bool,
    },

    /// Dataset not ready yet; the poller will sleep before checking again
    DatasetNotReady {
        /// Dataset identifier
        dataset: DatasetId,
        /// Readiness checks performed so far
        attempt: u32,
        /// Sleep before the next check, in seconds
        retry_in_secs: u64,
    },

    /// Dataset considered fully published
    DatasetReady {
        /// Dataset identifier
        dataset: DatasetId,
        /// Readiness checks it took
        attempts: u32,
    },

    /// Files in the dataset directory matched the requested prefix
    FilesMatched {
        /// Dataset identifier
        dataset: DatasetId,
        /// Prefix used for filtering
        prefix: String,
        /// Number of matching files
        count: usize,
    },

    /// A file transfer started
    FetchStarted {
        /// Remote file name
        file_name: String,
        /// Remote directory
        remote_dir: String,
        /// Local target directory
        local_dir: PathBuf,
    },

    /// A file transfer finished successfully
    FetchSucceeded {
        /// Remote file name
        file_name: String,
        /// Where it was written
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// A file transfer failed
    FetchFailed {
        /// Remote file name
        file_name: String,
        /// Failure details
        failure: FetchFailure,
    },

    /// Every task of a batch produced an outcome
    BatchComplete {
        /// Successful transfers
        succeeded: usize,
        /// Failed transfers
        failed: usize,
    },
}
