//! Filesystem inventory scanning
//!
//! Walk a directory tree, hash file contents in parallel, and keep a
//! path-keyed inventory in SQLite that can be reported on and pruned.

pub mod cancel;
pub mod collector;
pub mod db;
pub mod error;
pub mod hasher;
pub mod host;
pub mod pool;
pub mod prune;
pub mod scanner;
pub mod types;
pub mod walker;

pub use cancel::ScanCancelToken;
pub use collector::{Collector, RecordSink, ScanObserver, ScanProgress};
pub use db::{Database, REPORT_LIMIT};
pub use error::{Result, ScanError};
pub use hasher::ContentHasher;
pub use prune::Reconciler;
pub use scanner::{ScanConfig, ScanResult, Scanner};
pub use types::{
    DuplicateGroup, FailureKind, FileRecord, FileTask, HashOutcome, PruneStats, ReportData,
    ScanStats,
};
pub use walker::{IgnoreRules, ScanIssue, Walker, DEFAULT_IGNORE_DIRS, DEFAULT_IGNORE_EXTENSIONS};
