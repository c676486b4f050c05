//! Directory walk producing hash tasks
//!
//! Ignored directory names prune whole subtrees; ignored extensions drop
//! single files. Directory and extension matching is exact and
//! case-sensitive. The root itself is never pruned, even if its name is
//! on the ignore list.

use super::types::{split_extension, FileTask};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Directory names skipped by default.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    "venv",
    ".env",
    ".idea",
    ".vscode",
];

/// File extensions skipped by default (with the leading dot).
pub const DEFAULT_IGNORE_EXTENSIONS: &[&str] = &[".pyc", ".o", ".tmp", ".swp", ".class"];

/// Directory-name and extension filters applied during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    dirs: HashSet<String>,
    extensions: HashSet<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_IGNORE_DIRS.iter().copied(),
            DEFAULT_IGNORE_EXTENSIONS.iter().copied(),
        )
    }
}

impl IgnoreRules {
    pub fn new<D, E>(dirs: D, extensions: E) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.into()))
                .collect(),
        }
    }

    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            dirs: HashSet::new(),
            extensions: HashSet::new(),
        }
    }

    pub fn ignores_dir(&self, name: &OsStr) -> bool {
        name.to_str().map_or(false, |n| self.dirs.contains(n))
    }

    pub fn ignores_file(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        let ext = split_extension(&name);
        !ext.is_empty() && self.extensions.contains(ext)
    }
}

/// Accept `pyc` as well as `.pyc` in configured extension lists.
fn normalize_extension(ext: String) -> String {
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// A directory entry the walk could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    pub path: String,
    pub message: String,
}

/// Depth-first walk over a root directory.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    rules: IgnoreRules,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    /// Lazily yield one task per non-directory entry.
    ///
    /// Symlinks are not followed and are yielded as files; workers decide
    /// what they point at. Unreadable directories become `Err` items and
    /// the walk continues with their siblings.
    pub fn into_tasks(self) -> impl Iterator<Item = Result<FileTask, ScanIssue>> + Send {
        let Walker { root, rules } = self;
        let file_rules = rules.clone();

        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !rules.ignores_dir(entry.file_name())
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if entry.file_type().is_dir() || file_rules.ignores_file(entry.file_name()) {
                        return None;
                    }
                    let dir = entry.path().parent()?.to_path_buf();
                    Some(Ok(FileTask::new(dir, entry.file_name().to_os_string())))
                }
                Err(err) => Some(Err(ScanIssue {
                    path: err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    message: err.to_string(),
                })),
            })
    }
}
