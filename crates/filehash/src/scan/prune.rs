//! Removal of records whose files no longer exist

use super::db::Database;
use super::error::Result;
use super::types::PruneStats;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Default number of paths examined (and deleted) per transaction.
pub const DEFAULT_PRUNE_BATCH: usize = 100;

/// Walks the stored paths in order and deletes the stale ones.
///
/// A record is stale when its path no longer names a regular file. Paths
/// are read in pages so memory stays bounded for large stores, and each
/// page's deletions commit in one transaction.
pub struct Reconciler<'db> {
    db: &'db Database,
    batch_size: usize,
}

impl<'db> Reconciler<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            batch_size: DEFAULT_PRUNE_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Prune stale records, calling `on_removed` for each path before it is deleted.
    pub fn run(&self, mut on_removed: impl FnMut(&str)) -> Result<PruneStats> {
        let start = Instant::now();
        let mut stats = PruneStats::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.db.page_paths(cursor.as_deref(), self.batch_size)?;
            let Some(last) = page.last().cloned() else {
                break;
            };
            stats.examined += page.len() as u64;

            let stale: Vec<String> = page
                .into_iter()
                .filter(|path| !Path::new(path).is_file())
                .collect();
            for path in &stale {
                on_removed(path);
            }
            if !stale.is_empty() {
                stats.removed += self.db.delete_files(&stale)?;
                debug!(removed = stale.len(), "Deleted stale records");
            }
            cursor = Some(last);
        }

        info!(
            examined = stats.examined,
            removed = stats.removed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Prune complete"
        );
        Ok(stats)
    }
}
