//! In-memory archive implementing the public transport trait

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use gfs_fetch::{ArchiveTransport, Error, Result};

/// Format one `ls -l` style listing line
pub fn listing_line(name: &str, size: u64) -> String {
    format!("drwxr-xr-x    2 ftp      ftp      {size:>8} Jan 01 00:00 {name}")
}

/// Directory listings and file bodies served from memory
#[derive(Default)]
pub struct MemoryArchive {
    listings: Mutex<HashMap<String, Vec<Vec<String>>>>,
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    /// Number of completed `retrieve` calls
    pub retrievals: AtomicUsize,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `listings` for `path`, one per call; the last one repeats
    pub fn listings(&self, path: &str, mut listings: Vec<Vec<String>>) {
        listings.reverse();
        self.listings
            .lock()
            .unwrap()
            .insert(path.to_string(), listings);
    }

    /// Publish one file under `dir` and add it to that directory's listing
    pub fn publish(&self, dir: &str, name: &str, body: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert((dir.to_string(), name.to_string()), body.to_vec());
        let mut listings = self.listings.lock().unwrap();
        let entry = listings.entry(dir.to_string()).or_insert_with(|| vec![Vec::new()]);
        for listing in entry.iter_mut() {
            listing.push(listing_line(name, body.len() as u64));
        }
    }
}

#[async_trait::async_trait]
impl ArchiveTransport for MemoryArchive {
    async fn list_lines(&self, path: &str) -> Result<Vec<String>> {
        let mut listings = self.listings.lock().unwrap();
        let stack = listings
            .get_mut(path)
            .ok_or_else(|| {
                Error::connection(Some(path), "550 Failed to change directory").retryable(false)
            })?;
        let lines = if stack.len() > 1 {
            stack.pop()
        } else {
            stack.last().cloned()
        };
        Ok(lines.unwrap_or_default())
    }

    async fn retrieve(&self, remote_dir: &str, file_name: &str, target: &Path) -> Result<u64> {
        let body = self
            .files
            .lock()
            .unwrap()
            .get(&(remote_dir.to_string(), file_name.to_string()))
            .cloned()
            .ok_or_else(|| Error::transfer(file_name, "550 Failed to open file"))?;
        tokio::fs::write(target, &body).await?;
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        Ok(body.len() as u64)
    }
}
