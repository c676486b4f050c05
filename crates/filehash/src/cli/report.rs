//! `--report` and `--hash`: read-only views of the inventory

use super::error::HelpfulError;
use super::open_store_readonly;
use super::output::{format_number, format_size, format_timestamp, print_table};
use anyhow::{Context, Result};
use filehash::scan::{FileRecord, ReportData};
use std::path::Path;

/// Print totals, the largest files and the biggest duplicate groups.
pub fn run_report(db_path: &Path, json: bool) -> Result<()> {
    let db = open_store_readonly(db_path)?;
    let report = db.report()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &ReportData) {
    println!("Database Report");
    println!();
    println!("Total Files Stored: {}", format_number(report.total_files));
    println!("Total Size Tracked: {}", format_size(report.total_size));
    println!();

    println!("Largest Files");
    if report.largest_files.is_empty() {
        println!("  (none)");
    } else {
        let rows = report
            .largest_files
            .iter()
            .map(|f| {
                vec![
                    f.display_name().to_string(),
                    format_size(f.size_bytes.unwrap_or(0)),
                    f.full_path.clone(),
                ]
            })
            .collect();
        print_table(&["Name", "Size", "Path"], rows);
    }
    println!();

    println!("Duplicate Content");
    if report.duplicates.is_empty() {
        println!("  No complete duplicates found.");
        return;
    }
    let rows = report
        .duplicates
        .iter()
        .map(|g| {
            vec![
                g.content_hash.clone(),
                g.copies.to_string(),
                format_size(g.total_size),
                format_size(g.reclaimable_bytes()),
            ]
        })
        .collect();
    print_table(&["Hash", "Copies", "Total", "Reclaimable"], rows);
}

/// Normalize and validate an MD5 hex digest.
pub fn parse_hash(raw: &str) -> Result<String, HelpfulError> {
    let hash = raw.trim().to_ascii_lowercase();
    if hash.len() == 32 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hash)
    } else {
        Err(HelpfulError::invalid_hash(raw))
    }
}

/// List every stored file with the given content hash.
pub fn run_hash(db_path: &Path, raw_hash: &str, json: bool) -> Result<()> {
    let hash = parse_hash(raw_hash)?;
    let db = open_store_readonly(db_path)?;
    let files = db.files_by_hash(&hash)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&files).context("Failed to serialize files")?
        );
        return Ok(());
    }

    print_files(&hash, &files);
    Ok(())
}

fn print_files(hash: &str, files: &[FileRecord]) {
    println!("Files with hash {} ({}):", hash, files.len());
    if files.is_empty() {
        return;
    }
    let rows = files
        .iter()
        .enumerate()
        .map(|(i, f)| {
            vec![
                (i + 1).to_string(),
                f.full_path.clone(),
                format_size(f.size_bytes.unwrap_or(0)),
                format_timestamp(f.modified_at),
            ]
        })
        .collect();
    print_table(&["#", "Path", "Size", "Modified"], rows);
}
