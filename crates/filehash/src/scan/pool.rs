//! Hash worker pool
//!
//! Workers pull chunks of [`FileTask`]s from a shared bounded channel and
//! push one [`HashOutcome`] per task as soon as it is ready, so results
//! reach the writer in completion order rather than walk order.

use super::cancel::ScanCancelToken;
use super::error::{Result, ScanError};
use super::hasher::ContentHasher;
use super::types::{FailedFile, FailureKind, FileLocation, FileStat, FileTask, HashOutcome, HashedFile};
use crossbeam_channel::{Receiver, Sender};
use std::fs;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Resolve a configured worker count, where 0 means one per CPU.
pub fn resolve_worker_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Stat and hash one file. Never fails; problems become `HashOutcome::Failure`.
pub fn process_task(task: &FileTask, hasher: &ContentHasher) -> HashOutcome {
    let location = FileLocation::from_task(task);

    // Stored keys must map back to exactly this path
    if location.full_path.to_str().is_none() {
        let message = FailureKind::InvalidPath.as_str().to_string();
        return failure(location, FailureKind::InvalidPath, message, None);
    }

    let metadata = match fs::metadata(&location.full_path) {
        Ok(metadata) => metadata,
        Err(e) => return failure(location, FailureKind::from_io(&e), e.to_string(), None),
    };
    if !metadata.is_file() {
        return failure(
            location,
            FailureKind::NotRegularFile,
            "not a regular file".to_string(),
            None,
        );
    }

    let stat = FileStat::from_metadata(&metadata);
    match hasher.hash_file(&location.full_path) {
        Ok(content_hash) => HashOutcome::Success(HashedFile {
            location,
            stat,
            content_hash,
        }),
        Err(e) => failure(location, FailureKind::from_io(&e), e.to_string(), Some(stat)),
    }
}

fn failure(
    location: FileLocation,
    kind: FailureKind,
    message: String,
    stat: Option<FileStat>,
) -> HashOutcome {
    HashOutcome::Failure(FailedFile {
        location,
        kind,
        message,
        stat,
    })
}

/// Running hash workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<u64>>,
}

impl WorkerPool {
    /// Start `workers` threads.
    ///
    /// Each thread exits when the task channel closes, when the result
    /// channel's receiver is dropped, or when `cancel` is set.
    pub fn spawn(
        workers: usize,
        hasher: ContentHasher,
        tasks: Receiver<Vec<FileTask>>,
        results: Sender<HashOutcome>,
        cancel: ScanCancelToken,
    ) -> Result<Self> {
        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let tasks = tasks.clone();
            let results = results.clone();
            let cancel = cancel.clone();
            let handle = thread::Builder::new()
                .name(format!("filehash-worker-{index}"))
                .spawn(move || worker_loop(index, hasher, tasks, results, cancel))?;
            handles.push(handle);
        }
        debug!(workers, "Started hash workers");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker and return how many tasks they processed.
    pub fn join(self) -> Result<u64> {
        let mut processed = 0;
        for handle in self.handles {
            processed += handle
                .join()
                .map_err(|_| ScanError::InvalidState("Hash worker panicked".to_string()))?;
        }
        Ok(processed)
    }

    /// Stop tracking the workers without waiting for them.
    ///
    /// Used after cancellation so a worker stuck on a large file does not
    /// delay shutdown. It exits on its own once it sees the closed channel.
    pub fn detach(self) {
        drop(self.handles);
    }
}

fn worker_loop(
    index: usize,
    hasher: ContentHasher,
    tasks: Receiver<Vec<FileTask>>,
    results: Sender<HashOutcome>,
    cancel: ScanCancelToken,
) -> u64 {
    let mut processed = 0u64;
    for chunk in tasks.iter() {
        for task in &chunk {
            if cancel.is_cancelled() {
                trace!(worker = index, "Worker stopping on cancel");
                return processed;
            }
            let outcome = process_task(task, &hasher);
            processed += 1;
            if results.send(outcome).is_err() {
                trace!(worker = index, "Result channel closed");
                return processed;
            }
        }
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_process_task_success() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"hello\n").unwrap();

        let task = FileTask::new(temp.path(), "a.txt");
        match process_task(&task, &ContentHasher::default()) {
            HashOutcome::Success(file) => {
                assert_eq!(file.content_hash, "b1946ac92492d2347c6235b4d2611184");
                assert_eq!(file.stat.size, 6);
                assert_eq!(file.location.extension, ".txt");
                assert!(file.stat.modified.is_some());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_process_task_vanished() {
        let temp = TempDir::new().unwrap();
        let task = FileTask::new(temp.path(), "gone.txt");
        match process_task(&task, &ContentHasher::default()) {
            HashOutcome::Failure(file) => assert_eq!(file.kind, FailureKind::Vanished),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_process_task_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        let task = FileTask::new(temp.path(), "sub");
        match process_task(&task, &ContentHasher::default()) {
            HashOutcome::Failure(file) => assert_eq!(file.kind, FailureKind::NotRegularFile),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_task_non_utf8_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        std::fs::write(temp.path().join(name), b"x").unwrap();

        let task = FileTask::new(temp.path(), name);
        match process_task(&task, &ContentHasher::default()) {
            HashOutcome::Failure(file) => {
                assert_eq!(file.kind, FailureKind::InvalidPath);
                assert!(!file.kind.persists());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_results_arrive_in_completion_order() {
        let temp = TempDir::new().unwrap();
        // Large enough that hashing it outlasts the small files by far
        let big = vec![7u8; 48 * 1024 * 1024];
        std::fs::write(temp.path().join("big.bin"), &big).unwrap();
        let mut small = Vec::new();
        for i in 0..10 {
            let name = format!("s{i}.txt");
            std::fs::write(temp.path().join(&name), format!("small {i}")).unwrap();
            small.push(FileTask::new(temp.path(), name));
        }

        let (task_tx, task_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(64);
        let pool = WorkerPool::spawn(
            2,
            ContentHasher::default(),
            task_rx,
            result_tx,
            ScanCancelToken::new(),
        )
        .unwrap();

        // The big file is queued first, so one worker is busy with it while
        // the other takes the small ones
        task_tx
            .send(vec![FileTask::new(temp.path(), "big.bin")])
            .unwrap();
        task_tx.send(small).unwrap();
        drop(task_tx);

        let order: Vec<String> = result_rx
            .iter()
            .map(|o| o.full_path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        pool.join().unwrap();

        assert_eq!(order.len(), 11);
        assert_ne!(order[0], "big.bin");
        assert_eq!(order.last().map(String::as_str), Some("big.bin"));
    }

    #[test]
    fn test_pool_processes_every_task() {
        let temp = TempDir::new().unwrap();
        let mut chunk = Vec::new();
        for i in 0..25 {
            let name = format!("f{i}.txt");
            std::fs::write(temp.path().join(&name), format!("content {i}")).unwrap();
            chunk.push(FileTask::new(temp.path(), name));
        }

        let (task_tx, task_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(64);
        let pool = WorkerPool::spawn(
            3,
            ContentHasher::default(),
            task_rx,
            result_tx,
            ScanCancelToken::new(),
        )
        .unwrap();
        assert_eq!(pool.len(), 3);

        for part in chunk.chunks(10) {
            task_tx.send(part.to_vec()).unwrap();
        }
        drop(task_tx);

        let outcomes: Vec<HashOutcome> = result_rx.iter().collect();
        assert_eq!(pool.join().unwrap(), 25);
        assert_eq!(outcomes.len(), 25);

        let hashes: HashSet<String> = outcomes
            .iter()
            .map(|o| match o {
                HashOutcome::Success(file) => file.content_hash.clone(),
                other => panic!("unexpected failure {:?}", other),
            })
            .collect();
        assert_eq!(hashes.len(), 25);
    }

    #[test]
    fn test_cancelled_pool_stops_early() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let cancel = ScanCancelToken::new();
        cancel.cancel();

        let (task_tx, task_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(8);
        let pool =
            WorkerPool::spawn(1, ContentHasher::default(), task_rx, result_tx, cancel).unwrap();
        task_tx
            .send(vec![FileTask::new(temp.path(), "a.txt")])
            .unwrap();
        drop(task_tx);

        assert_eq!(pool.join().unwrap(), 0);
        assert!(result_rx.try_recv().is_err());
    }
}
