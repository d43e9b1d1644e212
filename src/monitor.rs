//! Dataset readiness detection
//!
//! The producer never signals that a model run is complete. The archive
//! pre-allocates each dataset directory and its reported size shrinks as
//! placeholders are replaced by real files, so a run counts as published once
//! its directory entry exists with `size <= threshold`.

use std::sync::Arc;

use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::lister::DirectoryLister;
use crate::observer::SharedObserver;
use crate::types::{DatasetId, DirectoryListing, Event};

/// Readiness predicate over one listing of the archive root
pub fn is_published(listing: &DirectoryListing, dataset: &DatasetId, threshold: u64) -> bool {
    listing
        .get(dataset.as_str())
        .is_some_and(|entry| entry.size <= threshold)
}

/// Decides whether a dataset has been fully published.
#[derive(Clone)]
pub struct ReadinessMonitor {
    lister: Arc<dyn DirectoryLister>,
    root_path: String,
    threshold: u64,
    observer: SharedObserver,
}

impl ReadinessMonitor {
    /// Create a monitor for the archive described by `archive`
    pub fn new(
        lister: Arc<dyn DirectoryLister>,
        archive: &ArchiveConfig,
        observer: SharedObserver,
    ) -> Self {
        Self {
            lister,
            root_path: archive.root_path.clone(),
            threshold: archive.ready_size_threshold,
            observer,
        }
    }

    /// Check once whether `dataset` is ready
    ///
    /// Listing failures (connection or parse) are returned, not treated as "not ready".
    pub async fn is_ready(&self, dataset: &DatasetId) -> Result<bool> {
        let listing = self.lister.list(&self.root_path).await?;
        let ready = is_published(&listing, dataset, self.threshold);

        self.observer.info(Event::ReadinessChecked {
            dataset: dataset.clone(),
            size: listing.get(dataset.as_str()).map(|e| e.size),
            threshold: self.threshold,
            ready,
        });
        Ok(ready)
    }

    /// Identifiers of every dataset directory currently in the archive root, sorted
    pub async fn list_available_datasets(&self) -> Result<Vec<DatasetId>> {
        let listing = self.lister.list(&self.root_path).await?;
        let mut ids: Vec<DatasetId> = listing
            .iter()
            .map(|entry| DatasetId(entry.name.clone()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
