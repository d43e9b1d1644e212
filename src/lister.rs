//! Remote directory listing and parsing
//!
//! [`UnixListingLister`] understands the `ls -l` layout the NOAA archive
//! returns for `LIST`. The token positions are a compatibility contract with
//! that server, not a general parser: archives with another layout get their
//! own [`DirectoryLister`] implementation and the readiness monitor and
//! orchestrator keep working unchanged.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::ArchiveTransport;
use crate::types::{DirectoryEntry, DirectoryListing};

/// Token index of the size column in an `ls -l` line
const SIZE_TOKEN: usize = 4;
/// Token index of the name column in an `ls -l` line
const NAME_TOKEN: usize = 8;

/// Lists one remote directory as structured entries.
#[async_trait::async_trait]
pub trait DirectoryLister: Send + Sync {
    /// List `path` as it is right now
    ///
    /// Fails as a whole if any record cannot be parsed; no partial listing is returned.
    async fn list(&self, path: &str) -> Result<DirectoryListing>;
}

/// [`DirectoryLister`] for servers answering `LIST` with Unix `ls -l` lines.
#[derive(Clone)]
pub struct UnixListingLister {
    transport: Arc<dyn ArchiveTransport>,
}

impl UnixListingLister {
    /// Create a lister on top of the given transport
    pub fn new(transport: Arc<dyn ArchiveTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl DirectoryLister for UnixListingLister {
    async fn list(&self, path: &str) -> Result<DirectoryListing> {
        let lines = self.transport.list_lines(path).await?;
        let listing = parse_unix_listing(&lines)?;
        tracing::debug!(path, entries = listing.len(), "Listed remote directory");
        Ok(listing)
    }
}

/// Parse a complete `ls -l` listing; the first bad line aborts the parse
pub fn parse_unix_listing<S: AsRef<str>>(lines: &[S]) -> Result<DirectoryListing> {
    lines
        .iter()
        .map(|line| parse_unix_listing_line(line.as_ref()))
        .collect()
}

/// Parse one `ls -l` record, e.g.
/// `drwxr-xr-x 2 ftp ftp 196608 Jan 01 03:35 gfs.2024010100`
pub fn parse_unix_listing_line(line: &str) -> Result<DirectoryEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() <= NAME_TOKEN {
        return Err(Error::Parse {
            line: line.to_string(),
            reason: format!(
                "expected at least {} fields, found {}",
                NAME_TOKEN + 1,
                tokens.len()
            ),
        });
    }

    let size = tokens[SIZE_TOKEN].parse::<u64>().map_err(|e| Error::Parse {
        line: line.to_string(),
        reason: format!("size field {:?}: {e}", tokens[SIZE_TOKEN]),
    })?;

    Ok(DirectoryEntry {
        name: tokens[NAME_TOKEN].to_string(),
        size,
    })
}
