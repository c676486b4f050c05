//! Database layer for filehash.
//!
//! A thin synchronous wrapper over one SQLite connection. The scan
//! pipeline funnels every write through a single owner of a
//! [`DbConnection`], so the type is deliberately `Send` but not `Clone`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use filehash_db::{DbConnection, DbValue};
//!
//! let conn = DbConnection::open(Path::new("filehashdata.sqlite"))?;
//! conn.transaction(|tx| {
//!     tx.execute("DELETE FROM files WHERE full_path = ?", &[DbValue::from("/tmp/a")])?;
//!     Ok(())
//! })?;
//! ```

mod backend;
pub mod lock;

pub use backend::{
    AccessMode, BackendError, DbConnection, DbRow, DbTransaction, DbValue, FromDbValue,
};
pub use lock::{lock_path_for, LockError, WriterLock};
