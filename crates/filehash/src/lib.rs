//! filehash: filesystem inventory and duplicate-content detection
//!
//! Scans a directory tree, records every file's size, timestamps and MD5
//! digest in a SQLite inventory keyed by absolute path, and answers
//! "what is big" and "what is duplicated" questions about it.

pub mod config;
pub mod scan;

pub use config::FilehashConfig;
pub use scan::{
    Database, DuplicateGroup, FileRecord, Reconciler, ReportData, ScanCancelToken, ScanConfig,
    ScanError, ScanObserver, ScanResult, Scanner,
};
