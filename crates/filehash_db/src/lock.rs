//! Single-writer lock for an inventory file.
//!
//! SQLite tolerates many readers, but a scan assumes it is the only
//! writer. A `<db>.lock` file held with an exclusive advisory lock
//! enforces that across processes; the holder's pid is written into the
//! file so a second writer can say who is in the way.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is in use by another writer", path.display())]
    Held { path: PathBuf, pid: Option<u32> },

    #[error("Cannot open lock file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot lock {}: {source}", path.display())]
    Acquire {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive writer lock; released when dropped.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Take the lock for `db_path` without waiting.
    pub fn acquire(db_path: &Path) -> Result<Self, LockError> {
        let path = lock_path_for(db_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        // Fully qualified so newer toolchains don't pick std's File::try_lock_exclusive
        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(LockError::Held {
                    path: db_path.to_path_buf(),
                    pid: read_pid(&mut file),
                });
            }
            return Err(LockError::Acquire { path, source: e });
        }

        if let Err(e) = write_pid(&mut file) {
            debug!(lock = %path.display(), error = %e, "Could not record pid in lock file");
        }
        debug!(lock = %path.display(), "Acquired writer lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        // Clear the pid so a stale file never names a dead process
        let _ = self.file.set_len(0);
        debug!(lock = %self.path.display(), "Released writer lock");
    }
}

fn write_pid(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut raw = String::new();
    file.read_to_string(&mut raw).ok()?;
    raw.trim().parse().ok()
}

/// `files.sqlite` → `files.sqlite.lock`, `files` → `files.lock`
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name: OsString = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/data/files.sqlite")),
            PathBuf::from("/data/files.sqlite.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/files")),
            PathBuf::from("/data/files.lock")
        );
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("files.sqlite");

        let lock = WriterLock::acquire(&db_path).unwrap();
        assert!(lock.path().exists());
        drop(lock);

        let _again = WriterLock::acquire(&db_path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_second_writer_sees_pid() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("files.sqlite");

        let _lock = WriterLock::acquire(&db_path).unwrap();
        match WriterLock::acquire(&db_path) {
            Err(LockError::Held { pid, .. }) => assert_eq!(pid, Some(std::process::id())),
            other => panic!("expected Held, got {:?}", other.map(|_| ())),
        }
    }
}
