//! Core types for the scan pipeline
//!
//! A scan moves three kinds of values between threads:
//! [`FileTask`] (walker → workers), [`HashOutcome`] (workers → collector)
//! and [`FileRecord`] (collector → store).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Maximum stored length of the `host` label.
pub const MAX_HOST_LEN: usize = 50;

// ============================================================================
// Pipeline Types
// ============================================================================

/// One directory entry the walker wants hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub dir: PathBuf,
    pub file_name: OsString,
}

impl FileTask {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<OsString>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Size and timestamps captured by a worker's stat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

impl FileStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            // Not every filesystem records a birth time
            created: metadata.created().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// Why a worker could not hash a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Listed by the walker but gone by the time a worker looked.
    Vanished,
    /// Exists but is not a regular file (directory, socket, device).
    NotRegularFile,
    /// The path is not valid UTF-8 and cannot be stored as a key.
    InvalidPath,
    PermissionDenied,
    Io,
}

impl FailureKind {
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FailureKind::Vanished,
            std::io::ErrorKind::PermissionDenied => FailureKind::PermissionDenied,
            _ => FailureKind::Io,
        }
    }

    /// Whether a visit with this failure is worth a `readable = false` row.
    ///
    /// Access errors are persisted so "seen but inaccessible" stays
    /// distinguishable from "never seen". Vanished entries and non-files
    /// have nothing to describe.
    pub fn persists(&self) -> bool {
        matches!(self, FailureKind::PermissionDenied | FailureKind::Io)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Vanished => "vanished",
            FailureKind::NotRegularFile => "not a regular file",
            FailureKind::InvalidPath => "path is not valid UTF-8",
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::Io => "i/o error",
        }
    }
}

/// Path pieces shared by both outcome variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub full_path: PathBuf,
    pub parent_dir: PathBuf,
    pub file_name: String,
    pub extension: String,
}

impl FileLocation {
    pub fn from_task(task: &FileTask) -> Self {
        let file_name = task.file_name.to_string_lossy().into_owned();
        let extension = split_extension(&file_name).to_string();
        Self {
            full_path: task.full_path(),
            parent_dir: task.dir.clone(),
            file_name,
            extension,
        }
    }
}

/// A file that was stat'd and hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    pub location: FileLocation,
    pub stat: FileStat,
    pub content_hash: String,
}

/// A file a worker gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub location: FileLocation,
    pub kind: FailureKind,
    pub message: String,
    /// Present when the stat succeeded but opening or reading failed.
    pub stat: Option<FileStat>,
}

/// Result of processing one [`FileTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    Success(HashedFile),
    Failure(FailedFile),
}

impl HashOutcome {
    pub fn full_path(&self) -> &Path {
        match self {
            HashOutcome::Success(file) => &file.location.full_path,
            HashOutcome::Failure(file) => &file.location.full_path,
        }
    }
}

// ============================================================================
// Stored Types
// ============================================================================

/// One row of the `files` table, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub full_path: String,
    pub host: String,
    /// Lowercase hex MD5. `None` when the file could not be read.
    pub content_hash: Option<String>,
    pub parent_dir: Option<String>,
    pub size_bytes: Option<u64>,
    pub filename: Option<String>,
    /// Includes the leading dot, or is empty.
    pub extension: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub readable: Option<bool>,
    pub last_checked_at: DateTime<Utc>,
}

impl FileRecord {
    fn base(location: &FileLocation, host: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            full_path: location.full_path.to_string_lossy().into_owned(),
            host: truncate_host(host),
            content_hash: None,
            parent_dir: Some(location.parent_dir.to_string_lossy().into_owned()),
            size_bytes: None,
            filename: Some(location.file_name.clone()),
            extension: Some(location.extension.clone()),
            modified_at: None,
            created_at: None,
            readable: None,
            last_checked_at: checked_at,
        }
    }

    /// Record for a successfully hashed file.
    pub fn from_hashed(file: &HashedFile, host: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            content_hash: Some(file.content_hash.clone()),
            size_bytes: Some(file.stat.size),
            modified_at: file.stat.modified,
            created_at: file.stat.created,
            readable: Some(true),
            ..Self::base(&file.location, host, checked_at)
        }
    }

    /// Record marking a visited-but-unreadable file.
    pub fn unreadable(file: &FailedFile, host: &str, checked_at: DateTime<Utc>) -> Self {
        let stat = file.stat.as_ref();
        Self {
            size_bytes: stat.map(|s| s.size),
            modified_at: stat.and_then(|s| s.modified),
            created_at: stat.and_then(|s| s.created),
            readable: Some(false),
            ..Self::base(&file.location, host, checked_at)
        }
    }

    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.full_path)
    }
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "File: {} (Hash: {})",
            self.display_name(),
            self.content_hash.as_deref().unwrap_or("-")
        )
    }
}

/// Files sharing one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub copies: u64,
    /// Bytes occupied by every copy together.
    pub total_size: u64,
}

impl DuplicateGroup {
    /// Bytes freed by keeping a single copy.
    pub fn reclaimable_bytes(&self) -> u64 {
        if self.copies == 0 {
            return 0;
        }
        self.total_size - self.total_size / self.copies
    }
}

/// Aggregate view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportData {
    pub total_files: u64,
    pub total_size: u64,
    pub largest_files: Vec<FileRecord>,
    pub duplicates: Vec<DuplicateGroup>,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters from one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Tasks produced by the walker.
    pub files_discovered: u64,
    /// Files hashed and written with `readable = true`.
    pub files_hashed: u64,
    /// Files written with `readable = false`.
    pub files_unreadable: u64,
    /// Outcomes dropped without a row (vanished, not a regular file).
    pub files_skipped: u64,
    pub bytes_hashed: u64,
    pub batches_committed: u64,
    pub records_committed: u64,
    pub walk_errors: u64,
    pub duration_ms: u64,
}

/// Counters from one prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub examined: u64,
    pub removed: u64,
}

/// Python-style `splitext`: the suffix from the last dot, ignoring leading dots.
///
/// `archive.tar.gz` → `.gz`, `.bashrc` → ``, `notes.` → `.`
pub fn split_extension(file_name: &str) -> &str {
    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[stem_start..].rfind('.') {
        Some(idx) => &file_name[stem_start + idx..],
        None => "",
    }
}

fn truncate_host(host: &str) -> String {
    host.chars().take(MAX_HOST_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.txt"), ".txt");
        assert_eq!(split_extension("archive.tar.gz"), ".gz");
        assert_eq!(split_extension("Makefile"), "");
        assert_eq!(split_extension(".bashrc"), "");
        assert_eq!(split_extension("..hidden"), "");
        assert_eq!(split_extension(".config.swp"), ".swp");
        assert_eq!(split_extension("notes."), ".");
    }

    #[test]
    fn test_failure_kind_from_io() {
        use std::io::{Error, ErrorKind};
        assert_eq!(
            FailureKind::from_io(&Error::from(ErrorKind::NotFound)),
            FailureKind::Vanished
        );
        assert_eq!(
            FailureKind::from_io(&Error::from(ErrorKind::PermissionDenied)),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            FailureKind::from_io(&Error::from(ErrorKind::UnexpectedEof)),
            FailureKind::Io
        );
        assert!(FailureKind::PermissionDenied.persists());
        assert!(!FailureKind::Vanished.persists());
        assert!(!FailureKind::NotRegularFile.persists());
    }

    #[test]
    fn test_unreadable_record_has_no_hash() {
        let task = FileTask::new("/data", "locked.bin");
        let failed = FailedFile {
            location: FileLocation::from_task(&task),
            kind: FailureKind::PermissionDenied,
            message: "denied".to_string(),
            stat: Some(FileStat {
                size: 42,
                modified: None,
                created: None,
            }),
        };
        let record = FileRecord::unreadable(&failed, "box", Utc::now());
        assert_eq!(record.full_path, "/data/locked.bin");
        assert_eq!(record.readable, Some(false));
        assert_eq!(record.content_hash, None);
        assert_eq!(record.size_bytes, Some(42));
        assert_eq!(record.extension.as_deref(), Some(".bin"));
    }

    #[test]
    fn test_host_is_truncated() {
        let task = FileTask::new("/data", "a.txt");
        let hashed = HashedFile {
            location: FileLocation::from_task(&task),
            stat: FileStat {
                size: 1,
                modified: None,
                created: None,
            },
            content_hash: "0".repeat(32),
        };
        let long_host = "h".repeat(80);
        let record = FileRecord::from_hashed(&hashed, &long_host, Utc::now());
        assert_eq!(record.host.len(), MAX_HOST_LEN);
    }

    #[test]
    fn test_reclaimable_bytes() {
        let group = DuplicateGroup {
            content_hash: "abc".to_string(),
            copies: 3,
            total_size: 300,
        };
        assert_eq!(group.reclaimable_bytes(), 200);
    }
}
