//! Default command: scan a directory into the inventory

use super::error::HelpfulError;
use super::open_store;
use anyhow::Result;
use filehash::scan::{FailureKind, FileRecord, ScanObserver, ScanResult, Scanner};
use filehash::{FilehashConfig, ScanCancelToken};
use std::path::{Path, PathBuf};

/// Arguments for a scan run
#[derive(Debug, Clone)]
pub struct ScanArgs {
    pub directory: PathBuf,
    pub verbose: bool,
}

/// Prints each record and per-file error when verbose.
struct ConsoleObserver {
    verbose: bool,
}

impl ScanObserver for ConsoleObserver {
    fn on_record(&mut self, _processed: u64, record: &FileRecord) {
        if self.verbose {
            println!("{}", record);
        }
    }

    fn on_failure(&mut self, path: &Path, kind: FailureKind, message: &str) {
        if let Some(line) = failure_line(self.verbose, path, kind, message) {
            println!("{}", line);
        }
    }
}

/// Console line for a failed file, if one should be shown.
///
/// Non-regular entries (FIFOs, sockets, links to directories) are skipped
/// silently.
fn failure_line(verbose: bool, path: &Path, kind: FailureKind, message: &str) -> Option<String> {
    if !verbose || kind == FailureKind::NotRegularFile {
        return None;
    }
    Some(format!("Error accessing {}: {}", path.display(), message))
}

/// Validate the root, scan it, and return the result.
///
/// A cancelled scan surfaces as `ScanError::Cancelled` inside the error.
pub fn run(
    args: &ScanArgs,
    config: &FilehashConfig,
    db_path: &Path,
    cancel: ScanCancelToken,
) -> Result<ScanResult> {
    if !args.directory.exists() {
        return Err(HelpfulError::path_not_found(&args.directory).into());
    }
    if !args.directory.is_dir() {
        return Err(HelpfulError::not_a_directory(&args.directory).into());
    }

    let db = open_store(db_path)?;
    let scanner = Scanner::with_config(&db, config.scan_config()).with_cancel(cancel);
    let mut observer = ConsoleObserver {
        verbose: args.verbose,
    };
    let result = scanner.scan(&args.directory, &mut observer)?;

    if args.verbose {
        for issue in &result.issues {
            println!("Error accessing {}: {}", issue.path, issue.message);
        }
    }
    Ok(result)
}
