//! Command-line front end
//!
//! Thin wrappers that turn library results into terminal output. Store
//! access goes through [`open_store`] / [`open_store_readonly`] so lock
//! and missing-file errors always read the same way.

pub mod error;
pub mod output;
pub mod prune;
pub mod report;
pub mod scan;
pub mod signal;
pub mod tui;

use anyhow::Result;
use filehash::scan::{Database, ScanError};
use filehash_db::BackendError;
use std::path::Path;

use error::HelpfulError;

/// Open the store for writing, mapping lock contention to a helpful error.
pub fn open_store(path: &Path) -> Result<Database> {
    Database::open(path).map_err(|err| match err {
        ScanError::Database(BackendError::Locked(detail)) => {
            HelpfulError::database_locked(path, &detail).into()
        }
        other => anyhow::Error::new(other)
            .context(format!("Failed to open database {}", path.display())),
    })
}

/// Open an existing store for queries.
pub fn open_store_readonly(path: &Path) -> Result<Database> {
    Database::open_readonly(path).map_err(|err| match err {
        ScanError::Database(BackendError::NotFound(_)) => {
            HelpfulError::database_not_found(path).into()
        }
        other => anyhow::Error::new(other)
            .context(format!("Failed to open database {}", path.display())),
    })
}
