//! Single-writer collector
//!
//! The only component that writes scan results. Outcomes are turned into
//! [`FileRecord`]s and committed in transactions of `batch_size` rows; a
//! failed commit aborts the scan and leaves earlier batches durable.

use super::cancel::ScanCancelToken;
use super::error::{Result, ScanError};
use super::types::{FailureKind, FileRecord, HashOutcome, ScanStats};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// How often a waiting collector re-checks the cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for committed batches.
pub trait RecordSink {
    /// Write `records` atomically: all of them or none.
    fn commit_batch(&self, records: &[FileRecord]) -> Result<()>;
}

/// Hooks invoked by the collector as outcomes arrive.
pub trait ScanObserver {
    /// A file was hashed. `processed` counts hashed files so far.
    fn on_record(&mut self, _processed: u64, _record: &FileRecord) {}

    /// A worker failed on `path`.
    fn on_failure(&mut self, _path: &Path, _kind: FailureKind, _message: &str) {}

    /// A batch was committed. `committed` counts rows written so far.
    fn on_commit(&mut self, _committed: u64) {}
}

impl ScanObserver for () {}

/// Progress snapshot sent to the TUI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub files_processed: u64,
    pub files_committed: u64,
    pub current_file: Option<String>,
}

impl ScanObserver for mpsc::Sender<ScanProgress> {
    fn on_record(&mut self, processed: u64, record: &FileRecord) {
        let _ = self.send(ScanProgress {
            files_processed: processed,
            files_committed: 0,
            current_file: Some(record.display_name().to_string()),
        });
    }

    fn on_commit(&mut self, committed: u64) {
        let _ = self.send(ScanProgress {
            files_processed: 0,
            files_committed: committed,
            current_file: None,
        });
    }
}

/// Accumulates records and commits them in fixed-size batches.
pub struct Collector<'a, S: RecordSink + ?Sized> {
    sink: &'a S,
    batch_size: usize,
    host: String,
    cancel: ScanCancelToken,
    pending: Vec<FileRecord>,
    stats: ScanStats,
}

impl<'a, S: RecordSink + ?Sized> Collector<'a, S> {
    pub fn new(sink: &'a S, batch_size: usize, host: impl Into<String>, cancel: ScanCancelToken) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            host: host.into(),
            cancel,
            pending: Vec::with_capacity(batch_size),
            stats: ScanStats::default(),
        }
    }

    /// Drain `results` until every sender is gone, then flush the final
    /// partial batch.
    ///
    /// On cancellation the pending partial batch is discarded and
    /// `ScanError::Cancelled` is returned.
    pub fn run(
        mut self,
        results: &Receiver<HashOutcome>,
        observer: &mut dyn ScanObserver,
    ) -> Result<ScanStats> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.abandon());
            }
            match results.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(outcome) => self.accept(outcome, observer)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if self.cancel.is_cancelled() {
            return Err(self.abandon());
        }
        self.flush(observer)?;
        Ok(self.stats)
    }

    /// Handle one outcome, committing if the batch is full.
    pub fn accept(&mut self, outcome: HashOutcome, observer: &mut dyn ScanObserver) -> Result<()> {
        let now = Utc::now();
        match outcome {
            HashOutcome::Success(file) => {
                let record = FileRecord::from_hashed(&file, &self.host, now);
                self.stats.files_hashed += 1;
                self.stats.bytes_hashed += file.stat.size;
                observer.on_record(self.stats.files_hashed, &record);
                self.pending.push(record);
            }
            HashOutcome::Failure(file) => {
                let path = &file.location.full_path;
                observer.on_failure(path, file.kind, &file.message);
                if file.kind.persists() {
                    warn!(path = %path.display(), kind = file.kind.as_str(), error = %file.message, "Error accessing file");
                    self.stats.files_unreadable += 1;
                    self.pending.push(FileRecord::unreadable(&file, &self.host, now));
                } else if file.kind == FailureKind::InvalidPath {
                    warn!(path = %path.display(), "Skipping file with non UTF-8 path");
                    self.stats.files_skipped += 1;
                } else {
                    debug!(path = %path.display(), kind = file.kind.as_str(), "Dropped entry");
                    self.stats.files_skipped += 1;
                }
            }
        }

        if self.pending.len() >= self.batch_size {
            self.flush(observer)?;
        }
        Ok(())
    }

    /// Commit whatever is pending.
    pub fn flush(&mut self, observer: &mut dyn ScanObserver) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = self.pending.len() as u64;
        self.sink.commit_batch(&self.pending)?;
        self.pending.clear();
        self.stats.batches_committed += 1;
        self.stats.records_committed += rows;
        debug!(
            rows,
            batches = self.stats.batches_committed,
            total = self.stats.records_committed,
            "Committed batch"
        );
        observer.on_commit(self.stats.records_committed);
        Ok(())
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    fn abandon(&mut self) -> ScanError {
        if !self.pending.is_empty() {
            debug!(rows = self.pending.len(), "Discarding uncommitted batch on cancel");
            self.pending.clear();
        }
        ScanError::Cancelled
    }
}
