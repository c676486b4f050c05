//! Logging setup for the filehash binary.
//!
//! Two layers: a size-rotated log file under `~/.filehash/logs` that always
//! receives `RUST_LOG` (or the default filter), and a stderr layer whose
//! verbosity depends on how the program was started.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "filehash=info,filehash_db=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the filehash binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr.
    pub verbose: bool,
    /// Keep stderr quiet so log lines don't tear the terminal UI.
    pub tui_mode: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// If the log directory cannot be created, logging continues on stderr
/// only and a warning is printed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.tui_mode {
        EnvFilter::new("error")
    } else if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    let file_layer = match ensure_logs_dir().and_then(|dir| {
        RotatingLog::open(&dir, config.app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))
    }) {
        Ok(log) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log))
                .with_ansi(false)
                .with_filter(file_filter),
        ),
        Err(err) => {
            eprintln!("Warning: file logging disabled: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(())
}

/// Get the filehash home directory: ~/.filehash
///
/// `FILEHASH_HOME` overrides the location.
pub fn filehash_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("FILEHASH_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".filehash"))
        .context("Could not determine home directory (set FILEHASH_HOME)")
}

/// Get the logs directory: ~/.filehash/logs
pub fn logs_dir() -> Result<PathBuf> {
    Ok(filehash_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<name>.log` plus up to `keep - 1` older generations, `<name>.log.1`
/// being the newest. Rotates once the live file would pass `limit` bytes.
struct RotatingLog {
    live: PathBuf,
    keep: usize,
    limit: u64,
    file: File,
    written: u64,
}

impl RotatingLog {
    fn open(dir: &Path, name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let live = dir.join(format!("{name}.log"));
        let file = open_append(&live)?;
        let written = file.metadata()?.len();
        let mut log = Self {
            live,
            keep: keep.max(1),
            limit,
            file,
            written,
        };
        if log.written > log.limit {
            log.rotate()?;
        }
        Ok(log)
    }

    fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.live.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.keep == 1 {
            self.file = File::create(&self.live)?;
        } else {
            // live -> .1 -> .2 ...; whatever sat in the last slot is overwritten
            for n in (1..self.keep).rev() {
                let from = if n == 1 {
                    self.live.clone()
                } else {
                    self.generation(n - 1)
                };
                if from.exists() {
                    fs::rename(&from, self.generation(n))?;
                }
            }
            self.file = open_append(&self.live)?;
        }
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rotates_and_keeps_bounded_generations() {
        let temp = TempDir::new().unwrap();
        let mut log = RotatingLog::open(temp.path(), "filehash", 3, 16).unwrap();

        for _ in 0..4 {
            log.write_all(b"0123456789").unwrap();
        }
        log.flush().unwrap();

        assert!(temp.path().join("filehash.log").exists());
        assert!(temp.path().join("filehash.log.1").exists());
        assert!(temp.path().join("filehash.log.2").exists());
        assert!(!temp.path().join("filehash.log.3").exists());
        assert_eq!(fs::read(temp.path().join("filehash.log")).unwrap(), b"0123456789");
    }

    #[test]
    fn resumes_size_of_existing_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("filehash.log"), b"abc").unwrap();

        let log = RotatingLog::open(temp.path(), "filehash", 2, 1024).unwrap();
        assert_eq!(log.written, 3);
    }

    #[test]
    fn single_generation_truncates() {
        let temp = TempDir::new().unwrap();
        let mut log = RotatingLog::open(temp.path(), "filehash", 1, 8).unwrap();
        log.write_all(b"12345678").unwrap();
        log.write_all(b"abc").unwrap();
        log.flush().unwrap();

        assert_eq!(fs::read(temp.path().join("filehash.log")).unwrap(), b"abc");
        assert!(!temp.path().join("filehash.log.1").exists());
    }
}
