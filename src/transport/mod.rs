//! Remote archive access
//!
//! An [`ArchiveTransport`] opens a fresh protocol session for every call and
//! releases it before returning, on success and error paths alike. Sessions
//! are never shared between calls, so concurrent transfers cannot race on
//! session state (current directory, transfer type).

mod ftp;

pub use ftp::FtpTransport;

use std::path::Path;

use crate::error::Result;

/// Abstraction over the archive protocol, enabling testability.
#[async_trait::async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Enter `path` and return the raw, line-oriented directory listing
    ///
    /// Fails with [`Error::Connection`](crate::Error::Connection) when the
    /// session cannot be established or the path cannot be entered.
    async fn list_lines(&self, path: &str) -> Result<Vec<String>>;

    /// Enter `remote_dir` and stream `file_name` into `target`, returning the bytes written
    async fn retrieve(&self, remote_dir: &str, file_name: &str, target: &Path) -> Result<u64>;
}
