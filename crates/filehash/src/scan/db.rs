//! File inventory store
//!
//! One table keyed by absolute path. Every write goes through a
//! transaction; readers use separate read-only connections.
//! All timestamps are stored as INTEGER (milliseconds since Unix epoch).

use super::collector::RecordSink;
use super::error::{Result, ScanError};
use super::types::{DuplicateGroup, FileRecord, ReportData};
use chrono::{DateTime, Utc};
use filehash_db::{DbConnection, DbRow, DbValue};
use std::path::Path;
use tracing::debug;

/// Rows shown in each report section.
pub const REPORT_LIMIT: usize = 5;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    full_path TEXT PRIMARY KEY,
    host TEXT NOT NULL,
    content_hash TEXT,
    parent_dir TEXT,
    size_bytes INTEGER,
    filename TEXT,
    extension TEXT,
    modified_at INTEGER,
    created_at INTEGER,
    readable INTEGER,
    last_checked_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_files_size_bytes ON files(size_bytes);
"#;

const FILE_COLUMNS: &str = "full_path, host, content_hash, parent_dir, size_bytes, filename, \
extension, modified_at, created_at, readable, last_checked_at";

const REQUIRED_COLUMNS: &[&str] = &[
    "full_path",
    "host",
    "content_hash",
    "parent_dir",
    "size_bytes",
    "filename",
    "extension",
    "modified_at",
    "created_at",
    "readable",
    "last_checked_at",
];

const UPSERT_SQL: &str = r#"
INSERT INTO files (full_path, host, content_hash, parent_dir, size_bytes, filename,
                   extension, modified_at, created_at, readable, last_checked_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(full_path) DO UPDATE SET
    host = excluded.host,
    content_hash = excluded.content_hash,
    parent_dir = excluded.parent_dir,
    size_bytes = excluded.size_bytes,
    filename = excluded.filename,
    extension = excluded.extension,
    modified_at = excluded.modified_at,
    created_at = excluded.created_at,
    readable = excluded.readable,
    last_checked_at = excluded.last_checked_at
"#;

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

fn datetime_to_value(ts: Option<DateTime<Utc>>) -> DbValue {
    ts.map(|t| t.timestamp_millis()).into()
}

fn size_to_value(size: Option<u64>) -> DbValue {
    size.map(|s| i64::try_from(s).unwrap_or(i64::MAX)).into()
}

fn record_params(record: &FileRecord) -> [DbValue; 11] {
    [
        record.full_path.as_str().into(),
        record.host.as_str().into(),
        record.content_hash.as_deref().into(),
        record.parent_dir.as_deref().into(),
        size_to_value(record.size_bytes),
        record.filename.as_deref().into(),
        record.extension.as_deref().into(),
        datetime_to_value(record.modified_at),
        datetime_to_value(record.created_at),
        record.readable.into(),
        record.last_checked_at.timestamp_millis().into(),
    ]
}

/// Handle to the inventory database.
#[derive(Debug)]
pub struct Database {
    conn: DbConnection,
}

impl Database {
    /// Open or create the store for writing. Takes the exclusive writer lock.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = DbConnection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Self::validate_schema(&conn)?;
        debug!(path = %path.display(), "Opened inventory database");
        Ok(Self { conn })
    }

    /// Open an existing store for queries only. Does not take the writer lock.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        let conn = DbConnection::open_readonly(path)?;
        Self::validate_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = DbConnection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Fail loud if the file holds a table with a different shape.
    fn validate_schema(conn: &DbConnection) -> Result<()> {
        let rows = conn.query_all("SELECT name FROM pragma_table_info('files')", &[])?;
        let present: Vec<String> = rows
            .iter()
            .map(|row| row.get_by_name::<String>("name"))
            .collect::<std::result::Result<_, _>>()?;

        if present.is_empty() {
            return Err(ScanError::Config(
                "Database has no 'files' table. Run a scan first.".to_string(),
            ));
        }

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !present.iter().any(|p| p == col))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        Err(ScanError::Config(format!(
            "Database table 'files' is missing columns: {}. \
Delete the database or point --database at a new file.",
            missing.join(", ")
        )))
    }

    /// Get the underlying connection.
    pub fn conn(&self) -> &DbConnection {
        &self.conn
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace one record outside of any batch.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        self.conn.execute(UPSERT_SQL, &record_params(record))?;
        Ok(())
    }

    /// Upsert every record in a single transaction.
    pub fn upsert_files(&self, records: &[FileRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.conn.transaction(|tx| {
            for record in records {
                tx.execute(UPSERT_SQL, &record_params(record))?;
            }
            Ok(())
        })?;
        Ok(records.len())
    }

    /// Delete the given paths in a single transaction.
    pub fn delete_files(&self, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let removed = self.conn.transaction(|tx| {
            let mut removed = 0;
            for path in paths {
                removed += tx.execute(
                    "DELETE FROM files WHERE full_path = ?",
                    &[DbValue::from(path.as_str())],
                )?;
            }
            Ok(removed)
        })?;
        Ok(removed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_file(&self, full_path: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE full_path = ?");
        let row = self.conn.query_optional(&sql, &[full_path.into()])?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    pub fn count_files(&self) -> Result<u64> {
        Ok(self.conn.query_scalar("SELECT COUNT(*) FROM files", &[])?)
    }

    /// Sum of recorded sizes. Rows without a size count as zero.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM files", &[])?)
    }

    /// Largest files first; ties broken by path.
    pub fn largest_files(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE size_bytes IS NOT NULL \
             ORDER BY size_bytes DESC, full_path ASC LIMIT ?"
        );
        let rows = self.conn.query_all(&sql, &[(limit as i64).into()])?;
        rows.iter().map(Self::row_to_record).collect()
    }

    /// Hashes shared by more than one readable file, by combined size.
    pub fn duplicate_groups(&self, limit: usize) -> Result<Vec<DuplicateGroup>> {
        let rows = self.conn.query_all(
            r#"
            SELECT content_hash, COUNT(*) AS copies, COALESCE(SUM(size_bytes), 0) AS total_size
            FROM files
            WHERE content_hash IS NOT NULL AND readable = 1
            GROUP BY content_hash
            HAVING COUNT(*) > 1
            ORDER BY total_size DESC, content_hash ASC
            LIMIT ?
            "#,
            &[(limit as i64).into()],
        )?;
        rows.iter()
            .map(|row| -> Result<DuplicateGroup> {
                Ok(DuplicateGroup {
                    content_hash: row.get(0)?,
                    copies: row.get(1)?,
                    total_size: row.get(2)?,
                })
            })
            .collect()
    }

    /// Totals plus the top [`REPORT_LIMIT`] largest files and duplicate groups.
    pub fn report(&self) -> Result<ReportData> {
        Ok(ReportData {
            total_files: self.count_files()?,
            total_size: self.total_size()?,
            largest_files: self.largest_files(REPORT_LIMIT)?,
            duplicates: self.duplicate_groups(REPORT_LIMIT)?,
        })
    }

    /// Every record with this content hash, ordered by path.
    pub fn files_by_hash(&self, content_hash: &str) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE content_hash = ? ORDER BY full_path ASC"
        );
        let rows = self.conn.query_all(&sql, &[content_hash.into()])?;
        rows.iter().map(Self::row_to_record).collect()
    }

    /// One page of stored paths in ascending order, starting after `after`.
    pub fn page_paths(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let rows = match after {
            Some(after) => self.conn.query_all(
                "SELECT full_path FROM files WHERE full_path > ? ORDER BY full_path ASC LIMIT ?",
                &[after.into(), (limit as i64).into()],
            )?,
            None => self.conn.query_all(
                "SELECT full_path FROM files ORDER BY full_path ASC LIMIT ?",
                &[(limit as i64).into()],
            )?,
        };
        rows.iter()
            .map(|row| row.get::<String>(0).map_err(ScanError::from))
            .collect()
    }

    fn row_to_record(row: &DbRow) -> Result<FileRecord> {
        // 0:full_path, 1:host, 2:content_hash, 3:parent_dir, 4:size_bytes, 5:filename,
        // 6:extension, 7:modified_at, 8:created_at, 9:readable, 10:last_checked_at
        let modified: Option<i64> = row.get(7)?;
        let created: Option<i64> = row.get(8)?;
        let checked: i64 = row.get(10)?;

        Ok(FileRecord {
            full_path: row.get(0)?,
            host: row.get(1)?,
            content_hash: row.get(2)?,
            parent_dir: row.get(3)?,
            size_bytes: row.get(4)?,
            filename: row.get(5)?,
            extension: row.get(6)?,
            modified_at: modified.and_then(millis_to_datetime),
            created_at: created.and_then(millis_to_datetime),
            readable: row.get(9)?,
            last_checked_at: millis_to_datetime(checked).ok_or_else(|| {
                ScanError::InvalidState(format!("Invalid last_checked_at: {}", checked))
            })?,
        })
    }
}

impl RecordSink for Database {
    fn commit_batch(&self, records: &[FileRecord]) -> Result<()> {
        self.upsert_files(records).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(path: &str, hash: Option<&str>, size: Option<u64>, readable: bool) -> FileRecord {
        let (dir, name) = path.rsplit_once('/').unwrap();
        FileRecord {
            full_path: path.to_string(),
            host: "box".to_string(),
            content_hash: hash.map(String::from),
            parent_dir: Some(dir.to_string()),
            size_bytes: size,
            filename: Some(name.to_string()),
            extension: Some(crate::scan::types::split_extension(name).to_string()),
            modified_at: Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()),
            created_at: None,
            readable: Some(readable),
            last_checked_at: Utc.timestamp_millis_opt(1_700_000_100_000).unwrap(),
        }
    }

    #[test]
    fn test_upsert_roundtrip_preserves_fields() {
        let db = Database::open_in_memory().unwrap();
        let original = record("/d/a.txt", Some("aa"), Some(6), true);
        db.upsert_file(&original).unwrap();

        let loaded = db.get_file("/d/a.txt").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(db.get_file("/d/missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_file(&record("/d/a.txt", Some("aa"), Some(6), true))
            .unwrap();
        db.upsert_files(&[record("/d/a.txt", Some("bb"), Some(9), true)])
            .unwrap();

        assert_eq!(db.count_files().unwrap(), 1);
        let loaded = db.get_file("/d/a.txt").unwrap().unwrap();
        assert_eq!(loaded.content_hash.as_deref(), Some("bb"));
        assert_eq!(loaded.size_bytes, Some(9));
    }

    #[test]
    fn test_report_on_empty_store() {
        let db = Database::open_in_memory().unwrap();
        let report = db.report().unwrap();
        assert_eq!(report, ReportData::default());
    }

    #[test]
    fn test_duplicate_groups_order_and_filter() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_files(&[
            record("/d/a1", Some("aaa"), Some(10), true),
            record("/d/a2", Some("aaa"), Some(10), true),
            record("/d/a3", Some("aaa"), Some(10), true),
            record("/d/b1", Some("bbb"), Some(500), true),
            record("/d/c1", Some("ccc"), Some(20), true),
            record("/d/c2", Some("ccc"), Some(20), true),
            record("/d/u1", None, Some(999), false),
            record("/d/u2", None, Some(999), false),
        ])
        .unwrap();

        let groups = db.duplicate_groups(REPORT_LIMIT).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].content_hash, "ccc");
        assert_eq!(groups[0].copies, 2);
        assert_eq!(groups[0].total_size, 40);
        assert_eq!(groups[1].content_hash, "aaa");
        assert_eq!(groups[1].copies, 3);
        assert_eq!(groups[1].total_size, 30);
        assert_eq!(groups[1].reclaimable_bytes(), 20);
    }

    #[test]
    fn test_duplicate_ties_break_by_hash() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_files(&[
            record("/d/y1", Some("yyy"), Some(5), true),
            record("/d/y2", Some("yyy"), Some(5), true),
            record("/d/x1", Some("xxx"), Some(5), true),
            record("/d/x2", Some("xxx"), Some(5), true),
        ])
        .unwrap();

        let hashes: Vec<String> = db
            .duplicate_groups(REPORT_LIMIT)
            .unwrap()
            .into_iter()
            .map(|g| g.content_hash)
            .collect();
        assert_eq!(hashes, vec!["xxx", "yyy"]);
    }

    #[test]
    fn test_largest_files() {
        let db = Database::open_in_memory().unwrap();
        let mut batch = Vec::new();
        for i in 0..8u64 {
            batch.push(record(&format!("/d/f{i}"), Some("h"), Some(i * 100), true));
        }
        batch.push(record("/d/tie", Some("h"), Some(700), true));
        batch.push(record("/d/nosize", None, None, false));
        db.upsert_files(&batch).unwrap();

        let largest = db.largest_files(REPORT_LIMIT).unwrap();
        let paths: Vec<&str> = largest.iter().map(|r| r.full_path.as_str()).collect();
        assert_eq!(paths, vec!["/d/f7", "/d/tie", "/d/f6", "/d/f5", "/d/f4"]);

        let report = db.report().unwrap();
        assert_eq!(report.total_files, 10);
        assert_eq!(report.total_size, 2800 + 700);
    }

    #[test]
    fn test_files_by_hash_sorted_by_path() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_files(&[
            record("/d/z", Some("aaa"), Some(1), true),
            record("/d/a", Some("aaa"), Some(1), true),
            record("/d/m", Some("bbb"), Some(1), true),
        ])
        .unwrap();

        let paths: Vec<String> = db
            .files_by_hash("aaa")
            .unwrap()
            .into_iter()
            .map(|r| r.full_path)
            .collect();
        assert_eq!(paths, vec!["/d/a", "/d/z"]);
        assert!(db.files_by_hash("nope").unwrap().is_empty());
    }

    #[test]
    fn test_page_paths_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_files(&[
            record("/d/a", Some("1"), Some(1), true),
            record("/d/b", Some("2"), Some(1), true),
            record("/d/c", Some("3"), Some(1), true),
        ])
        .unwrap();

        let first = db.page_paths(None, 2).unwrap();
        assert_eq!(first, vec!["/d/a", "/d/b"]);
        let second = db.page_paths(Some("/d/b"), 2).unwrap();
        assert_eq!(second, vec!["/d/c"]);

        let removed = db
            .delete_files(&["/d/a".to_string(), "/d/missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.count_files().unwrap(), 2);
    }

    #[test]
    fn test_readonly_requires_existing_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.sqlite");
        assert!(Database::open_readonly(&path).is_err());

        {
            let db = Database::open(&path).unwrap();
            db.upsert_file(&record("/d/a", Some("1"), Some(1), true))
                .unwrap();
        }

        let reader = Database::open_readonly(&path).unwrap();
        assert_eq!(reader.count_files().unwrap(), 1);
        assert!(reader
            .upsert_file(&record("/d/b", Some("2"), Some(1), true))
            .is_err());
    }
}
