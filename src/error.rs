//! Error types for gfs-fetch
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] enum used by listing, readiness and orchestration
//! - Machine-readable error codes for logs and events
//! - Classification of per-file failures into a [`FailureKind`]

use crate::types::FailureKind;
use std::path::Path;
use thiserror::Error;

/// Result type alias for gfs-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gfs-fetch
///
/// Listing and readiness errors are returned to the caller and abort the
/// enclosing operation. Per-file transfer errors are captured into a
/// [`FetchOutcome`](crate::types::FetchOutcome) instead of being returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.workers")
        key: Option<String>,
    },

    /// The requested forecast cycle is not a valid calendar date/hour
    #[error("invalid forecast cycle {year:04}-{month:02}-{day:02} {hour:02}h")]
    InvalidCycle {
        /// Year of the cycle
        year: i32,
        /// Month of the cycle
        month: u32,
        /// Day of the cycle
        day: u32,
        /// Hour of the cycle
        hour: u32,
    },

    /// Session establishment, login or directory change failed
    #[error("connection error{}: {message}", path_suffix(.path))]
    Connection {
        /// Remote path being entered when the error occurred, if any
        path: Option<String>,
        /// Protocol or socket error message
        message: String,
        /// Whether retrying can succeed (socket failures, 4xx replies)
        retryable: bool,
    },

    /// A listing record does not match the expected token layout
    #[error("cannot parse listing line {line:?}: {reason}")]
    Parse {
        /// The raw listing line
        line: String,
        /// Why the line was rejected
        reason: String,
    },

    /// Downloading a file failed after the session was established
    #[error("transfer of {file} failed: {message}")]
    Transfer {
        /// Remote file name
        file: String,
        /// Protocol or I/O error message
        message: String,
        /// Whether retrying can succeed (dropped data connection, 4xx replies)
        retryable: bool,
    },

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Readiness polling hit its attempt or deadline bound
    #[error("dataset {dataset} not ready after {attempts} checks")]
    NotReady {
        /// Dataset identifier that never became ready
        dataset: String,
        /// Number of readiness checks performed
        attempts: u32,
    },

    /// The operation was cancelled through its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error for a given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a retryable connection error, optionally tied to the remote path being entered
    pub fn connection(path: Option<&str>, message: impl std::fmt::Display) -> Self {
        Error::Connection {
            path: path.map(str::to_string),
            message: message.to_string(),
            retryable: true,
        }
    }

    /// Create a permanent transfer error for a remote file
    pub fn transfer(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Transfer {
            file: file.into(),
            message: message.to_string(),
            retryable: false,
        }
    }

    /// Override whether a connection or transfer error may be retried
    ///
    /// Other variants are returned unchanged.
    pub fn retryable(mut self, value: bool) -> Self {
        if let Error::Connection { retryable, .. } | Error::Transfer { retryable, .. } = &mut self {
            *retryable = value;
        }
        self
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidCycle { .. } => "invalid_cycle",
            Error::Connection { .. } => "connection_error",
            Error::Parse { .. } => "parse_error",
            Error::Transfer { .. } => "transfer_failure",
            Error::Io(_) => "io_error",
            Error::NotReady { .. } => "not_ready",
            Error::Cancelled => "cancelled",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Classify this error for a per-file [`FetchOutcome`](crate::types::FetchOutcome)
    ///
    /// Connection-class errors keep their identity so callers can tell a
    /// server that refused the session apart from a transfer that broke midway.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Connection { .. } => FailureKind::Connection,
            Error::Io(_) => FailureKind::Io,
            _ => FailureKind::Transfer,
        }
    }
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_ref().map(|p| format!(" ({p})")).unwrap_or_default()
}

/// Build an I/O error for a local path with context
pub(crate) fn io_context(path: &Path, err: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        err.kind(),
        format!("{}: {}", path.display(), err),
    ))
}
