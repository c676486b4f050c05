//! `--prune`: drop records whose files are gone

use super::open_store;
use anyhow::Result;
use filehash::scan::{PruneStats, Reconciler};
use std::path::Path;

pub fn run(db_path: &Path, verbose: bool) -> Result<PruneStats> {
    let db = open_store(db_path)?;
    let stats = Reconciler::new(&db).run(|path| {
        if verbose {
            println!("Removing stale record: {}", path);
        }
    })?;
    Ok(stats)
}
