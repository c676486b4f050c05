//! Scan orchestration
//!
//! # Design
//!
//! - A walker thread streams [`FileTask`] chunks into a bounded channel
//! - N hash workers pull chunks and emit one outcome per file
//! - The calling thread runs the [`Collector`], the only database writer
//! - Both channels are bounded, so a slow disk or a slow commit applies
//!   backpressure to the walk instead of buffering the whole tree

use super::cancel::ScanCancelToken;
use super::collector::{Collector, ScanObserver};
use super::db::Database;
use super::error::{Result, ScanError};
use super::hasher::{ContentHasher, MIN_BLOCK_SIZE};
use super::host::local_hostname;
use super::pool::{resolve_worker_count, WorkerPool};
use super::types::{FileTask, HashOutcome, ScanStats};
use super::walker::{IgnoreRules, ScanIssue, Walker};
use crossbeam_channel::{bounded, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{info, warn};

/// Default rows per commit.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default tasks per chunk handed to a worker.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Configuration for scanning operations
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Hash worker threads (0 = one per CPU)
    pub workers: usize,
    /// Tasks per chunk sent to a worker
    pub chunk_size: usize,
    /// Records per database transaction
    pub batch_size: usize,
    /// Read block size for hashing
    pub block_size: usize,
    pub ignore: IgnoreRules,
    /// Host label written on every record
    pub host: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            block_size: MIN_BLOCK_SIZE,
            ignore: IgnoreRules::default(),
            host: local_hostname(),
        }
    }
}

/// Result of a scan operation
#[derive(Debug)]
pub struct ScanResult {
    /// Canonical root that was walked
    pub root: PathBuf,
    pub stats: ScanStats,
    /// Directories the walk could not read
    pub issues: Vec<ScanIssue>,
}

/// What the walker thread reports when it finishes.
#[derive(Debug, Default)]
struct WalkSummary {
    discovered: u64,
    issues: Vec<ScanIssue>,
}

/// Filesystem scanner
pub struct Scanner<'db> {
    db: &'db Database,
    config: ScanConfig,
    cancel: ScanCancelToken,
}

impl<'db> Scanner<'db> {
    /// Create a new scanner with custom configuration
    pub fn with_config(db: &'db Database, config: ScanConfig) -> Self {
        Self {
            db,
            config,
            cancel: ScanCancelToken::new(),
        }
    }

    /// Use an externally owned cancel token (e.g. wired to SIGINT).
    pub fn with_cancel(mut self, cancel: ScanCancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Walk `root`, hash every eligible file and upsert the results.
    ///
    /// Returns `ScanError::Cancelled` if the token fires; batches committed
    /// before that point stay in the store.
    pub fn scan(&self, root: &Path, observer: &mut dyn ScanObserver) -> Result<ScanResult> {
        let start = Instant::now();

        if !root.exists() {
            return Err(ScanError::PathNotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.display().to_string()));
        }
        let root = fs::canonicalize(root)?;

        let workers = resolve_worker_count(self.config.workers);
        let chunk_size = self.config.chunk_size.max(1);
        info!(
            root = %root.display(),
            workers,
            chunk_size,
            batch_size = self.config.batch_size,
            "Starting scan"
        );

        let (task_tx, task_rx) = bounded::<Vec<FileTask>>(workers * 2);
        let (result_tx, result_rx) = bounded::<HashOutcome>(workers * chunk_size * 2);

        let walker = Walker::new(root.clone(), self.config.ignore.clone());
        let walk_cancel = self.cancel.clone();
        let walk_handle: JoinHandle<WalkSummary> = thread::Builder::new()
            .name("filehash-walker".to_string())
            .spawn(move || produce_tasks(walker, chunk_size, task_tx, walk_cancel))?;

        let pool = WorkerPool::spawn(
            workers,
            ContentHasher::new(self.config.block_size),
            task_rx,
            result_tx,
            self.cancel.clone(),
        )?;

        let collector = Collector::new(
            self.db,
            self.config.batch_size,
            self.config.host.as_str(),
            self.cancel.clone(),
        );
        let collected = collector.run(&result_rx, observer);
        // Closing the result channel stops workers, which in turn stops the walker
        drop(result_rx);

        let mut stats = match collected {
            Ok(stats) => stats,
            Err(ScanError::Cancelled) => {
                pool.detach();
                drop(walk_handle);
                info!(root = %root.display(), "Scan cancelled");
                return Err(ScanError::Cancelled);
            }
            Err(e) => {
                let _ = pool.join();
                let _ = walk_handle.join();
                warn!(root = %root.display(), error = %e, "Scan aborted");
                return Err(e);
            }
        };

        pool.join()?;
        let walk = walk_handle
            .join()
            .map_err(|_| ScanError::InvalidState("Walker thread panicked".to_string()))?;

        stats.files_discovered = walk.discovered;
        stats.walk_errors = walk.issues.len() as u64;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            root = %root.display(),
            discovered = stats.files_discovered,
            hashed = stats.files_hashed,
            unreadable = stats.files_unreadable,
            skipped = stats.files_skipped,
            batches = stats.batches_committed,
            walk_errors = stats.walk_errors,
            duration_ms = stats.duration_ms,
            "Scan complete"
        );

        Ok(ScanResult {
            root,
            stats,
            issues: walk.issues,
        })
    }
}

/// Walker thread body: chunk tasks and feed the workers.
fn produce_tasks(
    walker: Walker,
    chunk_size: usize,
    tx: Sender<Vec<FileTask>>,
    cancel: ScanCancelToken,
) -> WalkSummary {
    let mut summary = WalkSummary::default();
    let mut chunk = Vec::with_capacity(chunk_size);

    for item in walker.into_tasks() {
        if cancel.is_cancelled() {
            return summary;
        }
        match item {
            Ok(task) => {
                summary.discovered += 1;
                chunk.push(task);
                if chunk.len() >= chunk_size {
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
                    if tx.send(full).is_err() {
                        return summary;
                    }
                }
            }
            Err(issue) => {
                warn!(path = %issue.path, error = %issue.message, "Error accessing path");
                summary.issues.push(issue);
            }
        }
    }

    if !chunk.is_empty() {
        let _ = tx.send(chunk);
    }
    summary
}
