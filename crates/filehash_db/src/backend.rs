//! Database backend.
//!
//! SQLite-only synchronous backend.
//! - Single connection, owned by the caller's thread
//! - Single-writer enforced via file lock
//! - WAL journal so readers never block the writer

use crate::lock::{LockError, WriterLock};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug_span, info};

/// How long a statement waits on a busy database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from database backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database is locked by another process: {0}")]
    Locked(String),

    #[error("Operation requires write access but database is read-only")]
    ReadOnly,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Database not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<LockError> for BackendError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { path, pid: Some(pid) } => {
                BackendError::Locked(format!("{} (held by pid {})", path.display(), pid))
            }
            LockError::Held { path, pid: None } => BackendError::Locked(path.display().to_string()),
            other => BackendError::Database(other.to_string()),
        }
    }
}

/// Database access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-write access (holds the exclusive lock)
    ReadWrite,
    /// Read-only access (can coexist with a writer)
    ReadOnly,
}

/// Value type for query parameters and results.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

impl ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::Owned(Value::Null),
            DbValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            DbValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            // SQLite has no boolean storage class
            DbValue::Boolean(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
        })
    }
}

impl DbValue {
    /// The store only holds integers, text and NULL.
    fn from_value_ref(value: ValueRef<'_>) -> Result<Self, BackendError> {
        match value {
            ValueRef::Null => Ok(DbValue::Null),
            ValueRef::Integer(v) => Ok(DbValue::Integer(v)),
            ValueRef::Text(v) => Ok(DbValue::Text(String::from_utf8_lossy(v).into_owned())),
            ValueRef::Real(_) | ValueRef::Blob(_) => Err(BackendError::TypeConversion(format!(
                "Unsupported column type {}",
                value.data_type()
            ))),
        }
    }
}

/// Row data from a query result.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl DbRow {
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        self.values
            .get(index)
            .ok_or_else(|| {
                BackendError::TypeConversion(format!("Column index {} out of bounds", index))
            })
            .and_then(|v| T::from_db_value(v))
    }

    /// Get a value by column name.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, BackendError> {
        let index =
            self.columns.iter().position(|c| c == name).ok_or_else(|| {
                BackendError::TypeConversion(format!("Column '{}' not found", name))
            })?;
        self.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trait for converting from DbValue.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

fn null_error(type_name: &str) -> BackendError {
    BackendError::TypeConversion(format!(
        "{type_name} field is NULL - use Option<{type_name}> for nullable columns"
    ))
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Boolean(v) => Ok(i64::from(*v)),
            DbValue::Null => Err(null_error("i64")),
            _ => Err(BackendError::TypeConversion("Expected integer".to_string())),
        }
    }
}

impl FromDbValue for u64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => u64::try_from(*v).map_err(|_| {
                BackendError::TypeConversion(format!("Expected non-negative integer, got {}", v))
            }),
            DbValue::Null => Err(null_error("u64")),
            _ => Err(BackendError::TypeConversion("Expected integer".to_string())),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(null_error("String")),
            _ => Err(BackendError::TypeConversion("Expected text".to_string())),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v != 0),
            DbValue::Null => Err(null_error("bool")),
            _ => Err(BackendError::TypeConversion("Expected boolean".to_string())),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

/// A single SQLite connection plus the lock that makes it the only writer.
pub struct DbConnection {
    conn: Connection,
    access_mode: AccessMode,
    /// Holds the exclusive file lock via RAII - dropping it releases the lock.
    _lock_guard: Option<WriterLock>,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"SQLite")
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

impl DbConnection {
    /// Open (or create) a database with the exclusive write lock.
    ///
    /// Only one writer process may hold a store at a time; a second
    /// writer gets `BackendError::Locked` immediately instead of waiting.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BackendError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let lock_guard = WriterLock::acquire(path)?;
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        info!(path = %path.display(), "Opened SQLite database with exclusive lock");

        Ok(Self {
            conn,
            access_mode: AccessMode::ReadWrite,
            _lock_guard: Some(lock_guard),
        })
    }

    /// Open an existing database read-only (no lock required).
    pub fn open_readonly(path: &Path) -> Result<Self, BackendError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.display().to_string()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!(path = %path.display(), "Opened SQLite database (read-only)");

        Ok(Self {
            conn,
            access_mode: AccessMode::ReadOnly,
            _lock_guard: None,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            access_mode: AccessMode::ReadWrite,
            _lock_guard: None,
        })
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Execute a SQL statement (no results). Returns the number of rows changed.
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.ensure_writable()?;
        execute_on_conn(&self.conn, sql, params)
    }

    /// Execute a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        execute_batch_on_conn(&self.conn, sql)
    }

    /// Query and return all rows.
    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        query_on_conn(&self.conn, sql, params)
    }

    /// Query and return the first row, if any.
    pub fn query_optional(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Option<DbRow>, BackendError> {
        let rows = self.query_all(sql, params)?;
        Ok(rows.into_iter().next())
    }

    /// Query and return exactly one row.
    pub fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow, BackendError> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))
    }

    /// Query and return a single scalar value.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        let row = self.query_one(sql, params)?;
        row.get(0)
    }

    /// Run `op` inside a transaction.
    ///
    /// Commits when `op` returns `Ok`, rolls back when it returns `Err`.
    pub fn transaction<T, F>(&self, op: F) -> Result<T, BackendError>
    where
        F: FnOnce(&mut DbTransaction<'_>) -> Result<T, BackendError>,
    {
        self.ensure_writable()?;
        // IMMEDIATE takes the write lock up front so COMMIT never hits SQLITE_BUSY
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let mut tx = DbTransaction { conn: &self.conn };
        let result = op(&mut tx);

        match result {
            Ok(value) => {
                if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(BackendError::Transaction(format!(
                        "Commit failed: {}",
                        commit_err
                    )));
                }
                Ok(value)
            }
            Err(err) => match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(BackendError::Transaction(format!(
                    "Transaction failed: {}; rollback failed: {}",
                    err, rollback_err
                ))),
            },
        }
    }

    fn ensure_writable(&self) -> Result<(), BackendError> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(BackendError::ReadOnly);
        }
        Ok(())
    }
}

/// Statement access inside `DbConnection::transaction`.
pub struct DbTransaction<'a> {
    conn: &'a Connection,
}

impl<'a> DbTransaction<'a> {
    pub fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        execute_on_conn(self.conn, sql, params)
    }
}

fn execute_on_conn(conn: &Connection, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
    let span = debug_span!(
        "db.exec",
        op = sql_op_name(sql),
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    // prepare_cached keeps the per-row upsert from re-parsing SQL every call
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(rusqlite::params_from_iter(params.iter()))?;

    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(changed as u64)
}

fn execute_batch_on_conn(conn: &Connection, sql: &str) -> Result<(), BackendError> {
    let span = debug_span!(
        "db.exec_batch",
        op = "BATCH",
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    conn.execute_batch(sql)?;

    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(())
}

fn query_on_conn(conn: &Connection, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
    let span = debug_span!(
        "db.query",
        op = sql_op_name(sql),
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let column_count = columns.len();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(DbValue::from_value_ref(row.get_ref(i)?)?);
        }
        result.push(DbRow::new(columns.clone(), values));
    }

    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(result)
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_with_table() -> DbConnection {
        let conn = DbConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, flag INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn execute_and_query_round_values() {
        let conn = memory_with_table();
        conn.execute(
            "INSERT INTO t (id, name, flag) VALUES (?, ?, ?)",
            &[1_i64.into(), "alpha".into(), true.into()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO t (id, name, flag) VALUES (?, ?, ?)",
            &[2_i64.into(), DbValue::Null, false.into()],
        )
        .unwrap();

        let rows = conn
            .query_all("SELECT id, name, flag FROM t ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String>(1).unwrap(), "alpha");
        assert!(rows[0].get::<bool>(2).unwrap());
        assert_eq!(rows[1].get::<Option<String>>(1).unwrap(), None);
        assert!(!rows[1].get_by_name::<bool>("flag").unwrap());
    }

    #[test]
    fn null_into_non_option_is_an_error() {
        let conn = memory_with_table();
        conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();
        let row = conn.query_one("SELECT name FROM t", &[]).unwrap();
        assert!(matches!(
            row.get::<String>(0),
            Err(BackendError::TypeConversion(_))
        ));
    }

    #[test]
    fn real_columns_are_rejected() {
        let conn = memory_with_table();
        let result = conn.query_all("SELECT 1.5", &[]);
        assert!(matches!(result, Err(BackendError::TypeConversion(_))));
    }

    #[test]
    fn transaction_commits_on_ok() {
        let conn = memory_with_table();
        conn.transaction(|tx| {
            tx.execute("INSERT INTO t (id) VALUES (1)", &[])?;
            tx.execute("INSERT INTO t (id) VALUES (2)", &[])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let conn = memory_with_table();
        let result: Result<(), BackendError> = conn.transaction(|tx| {
            tx.execute("INSERT INTO t (id) VALUES (1)", &[])?;
            Err(BackendError::Query("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn readonly_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.sqlite");
        {
            let conn = DbConnection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        }

        let conn = DbConnection::open_readonly(&path).unwrap();
        assert_eq!(conn.access_mode(), AccessMode::ReadOnly);
        assert!(matches!(
            conn.execute("INSERT INTO t (id) VALUES (1)", &[]),
            Err(BackendError::ReadOnly)
        ));
    }

    #[test]
    fn readonly_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let result = DbConnection::open_readonly(&temp.path().join("missing.sqlite"));
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[test]
    fn second_writer_is_locked_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.sqlite");

        let _first = DbConnection::open(&path).unwrap();
        let second = DbConnection::open(&path);
        assert!(matches!(second, Err(BackendError::Locked(_))));
    }
}
