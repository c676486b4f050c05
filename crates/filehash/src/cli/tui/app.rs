//! Application state for the TUI
//!
//! A small state machine. Long operations (scan, prune) run on background
//! threads that open their own database handle; the UI thread polls them
//! on every tick and never holds a writer connection itself.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use filehash::scan::{
    Database, DuplicateGroup, FileRecord, PruneStats, Reconciler, ReportData, ScanError,
    ScanProgress, ScanResult, Scanner,
};
use filehash::{FilehashConfig, ScanCancelToken};
use filehash_db::BackendError;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Main menu entries, in display order.
pub const MENU_ITEMS: [&str; 4] = [
    "Scan Directory",
    "View Database Report",
    "Prune Invalid Entries",
    "Exit",
];

const MENU_SCAN: usize = 0;
const MENU_REPORT: usize = 1;
const MENU_PRUNE: usize = 2;
const MENU_EXIT: usize = 3;

/// Rows moved by PageUp/PageDown in the detail view.
const PAGE_STEP: usize = 10;

/// Current screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiMode {
    Menu,
    ScanPrompt,
    Scanning,
    Report,
    DuplicateDetail,
    Pruning,
    /// Outcome of the last action; any key returns to the menu.
    Message,
}

/// Text shown in `TuiMode::Message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// A scan running on a background thread.
pub struct ScanJob {
    pub path: String,
    pub files_processed: u64,
    pub files_committed: u64,
    pub last_file: Option<String>,
    pub started: Instant,
    pub cancel: ScanCancelToken,
    progress_rx: mpsc::Receiver<ScanProgress>,
    handle: Option<JoinHandle<Result<ScanResult, ScanError>>>,
}

/// A prune running on a background thread.
pub struct PruneJob {
    pub started: Instant,
    handle: Option<JoinHandle<Result<PruneStats, ScanError>>>,
}

/// Files behind one duplicate group.
#[derive(Debug, Clone)]
pub struct DuplicateDetail {
    pub group: DuplicateGroup,
    pub files: Vec<FileRecord>,
    pub scroll: usize,
}

/// Main application state
pub struct App {
    pub running: bool,
    pub mode: TuiMode,
    pub menu_index: usize,
    /// Scan path being typed in `ScanPrompt`
    pub input: String,
    pub db_path: PathBuf,
    pub config: FilehashConfig,
    pub scan: Option<ScanJob>,
    pub prune: Option<PruneJob>,
    pub report: Option<ReportData>,
    pub report_index: usize,
    pub detail: Option<DuplicateDetail>,
    pub message: Option<StatusMessage>,
}

impl App {
    pub fn new(config: FilehashConfig, db_path: PathBuf) -> Self {
        Self {
            running: true,
            mode: TuiMode::Menu,
            menu_index: 0,
            input: String::new(),
            db_path,
            config,
            scan: None,
            prune: None,
            report: None,
            report_index: 0,
            detail: None,
            message: None,
        }
    }

    /// Handle a key press
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            match self.scan.as_ref() {
                Some(job) => job.cancel.cancel(),
                None if self.prune.is_none() => self.running = false,
                None => {}
            }
            return;
        }

        match self.mode {
            TuiMode::Menu => self.handle_menu_key(key),
            TuiMode::ScanPrompt => self.handle_prompt_key(key),
            TuiMode::Scanning => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('c')) {
                    if let Some(job) = &self.scan {
                        job.cancel.cancel();
                    }
                }
            }
            TuiMode::Report => self.handle_report_key(key),
            TuiMode::DuplicateDetail => self.handle_detail_key(key),
            TuiMode::Pruning => {}
            TuiMode::Message => {
                self.message = None;
                self.mode = TuiMode::Menu;
            }
        }
    }

    fn handle_menu_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.menu_index = self.menu_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.menu_index + 1 < MENU_ITEMS.len() {
                    self.menu_index += 1;
                }
            }
            KeyCode::Enter => match self.menu_index {
                MENU_SCAN => {
                    self.input.clear();
                    self.mode = TuiMode::ScanPrompt;
                }
                MENU_REPORT => self.open_report(),
                MENU_PRUNE => self.start_prune(),
                MENU_EXIT => self.running = false,
                _ => {}
            },
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Esc => {
                self.input.clear();
                self.mode = TuiMode::Menu;
            }
            KeyCode::Enter => {
                let raw = self.input.trim();
                let path = if raw.is_empty() { "." } else { raw }.to_string();
                self.start_scan(&path);
            }
            _ => {}
        }
    }

    fn handle_report_key(&mut self, key: KeyEvent) {
        let dup_count = self.report.as_ref().map_or(0, |r| r.duplicates.len());
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.report_index = self.report_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.report_index + 1 < dup_count {
                    self.report_index += 1;
                }
            }
            KeyCode::Enter => self.open_duplicate_detail(),
            KeyCode::Char('q') | KeyCode::Esc => {
                self.report = None;
                self.mode = TuiMode::Menu;
            }
            _ => {}
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        let Some(detail) = self.detail.as_mut() else {
            self.mode = TuiMode::Report;
            return;
        };
        let max_scroll = detail.files.len().saturating_sub(1);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => detail.scroll = detail.scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                detail.scroll = (detail.scroll + 1).min(max_scroll)
            }
            KeyCode::PageUp => detail.scroll = detail.scroll.saturating_sub(PAGE_STEP),
            KeyCode::PageDown => detail.scroll = (detail.scroll + PAGE_STEP).min(max_scroll),
            KeyCode::Home => detail.scroll = 0,
            KeyCode::End => detail.scroll = max_scroll,
            KeyCode::Char('q') | KeyCode::Esc => {
                self.detail = None;
                self.mode = TuiMode::Report;
            }
            _ => {}
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    fn show_message(&mut self, message: StatusMessage) {
        self.message = Some(message);
        self.mode = TuiMode::Message;
    }

    /// Validate `path` and start a background scan.
    pub fn start_scan(&mut self, path: &str) {
        let root = PathBuf::from(path);
        if !root.exists() {
            self.show_message(StatusMessage::error(format!(
                "Error: Path '{}' does not exist!",
                path
            )));
            return;
        }
        if !root.is_dir() {
            self.show_message(StatusMessage::error(format!(
                "Error: Path '{}' is not a directory!",
                path
            )));
            return;
        }

        let (progress_tx, progress_rx) = mpsc::channel();
        let cancel = ScanCancelToken::new();
        let db_path = self.db_path.clone();
        let scan_config = self.config.scan_config();
        let thread_cancel = cancel.clone();

        let spawned = thread::Builder::new()
            .name("filehash-tui-scan".to_string())
            .spawn(move || {
                let db = Database::open(&db_path)?;
                let mut observer = progress_tx;
                Scanner::with_config(&db, scan_config)
                    .with_cancel(thread_cancel)
                    .scan(&root, &mut observer)
            });

        match spawned {
            Ok(handle) => {
                info!(path, "Started scan from TUI");
                self.scan = Some(ScanJob {
                    path: path.to_string(),
                    files_processed: 0,
                    files_committed: 0,
                    last_file: None,
                    started: Instant::now(),
                    cancel,
                    progress_rx,
                    handle: Some(handle),
                });
                self.mode = TuiMode::Scanning;
            }
            Err(e) => self.show_message(StatusMessage::error(format!("Error: {}", e))),
        }
    }

    /// Load the report from a read-only connection.
    pub fn open_report(&mut self) {
        match load_report(&self.db_path) {
            Ok(report) => {
                self.report = Some(report);
                self.report_index = 0;
                self.mode = TuiMode::Report;
            }
            Err(e) => self.show_message(StatusMessage::error(format!(
                "Error generating report: {}",
                e
            ))),
        }
    }

    fn open_duplicate_detail(&mut self) {
        let Some(group) = self
            .report
            .as_ref()
            .and_then(|r| r.duplicates.get(self.report_index))
            .cloned()
        else {
            return;
        };

        let files = Database::open_readonly(&self.db_path)
            .and_then(|db| db.files_by_hash(&group.content_hash));
        match files {
            Ok(files) => {
                self.detail = Some(DuplicateDetail {
                    group,
                    files,
                    scroll: 0,
                });
                self.mode = TuiMode::DuplicateDetail;
            }
            Err(e) => self.show_message(StatusMessage::error(format!(
                "Error fetching details: {}",
                e
            ))),
        }
    }

    /// Start a background prune.
    pub fn start_prune(&mut self) {
        let db_path = self.db_path.clone();
        let batch_size = self.config.batch_size;
        let spawned = thread::Builder::new()
            .name("filehash-tui-prune".to_string())
            .spawn(move || {
                let db = Database::open(&db_path)?;
                Reconciler::new(&db).with_batch_size(batch_size).run(|_| {})
            });

        match spawned {
            Ok(handle) => {
                self.prune = Some(PruneJob {
                    started: Instant::now(),
                    handle: Some(handle),
                });
                self.mode = TuiMode::Pruning;
            }
            Err(e) => self.show_message(StatusMessage::error(format!("Error: {}", e))),
        }
    }

    /// Periodic update: drain scan progress and collect finished jobs.
    pub fn tick(&mut self) {
        self.poll_scan();
        self.poll_prune();
    }

    fn poll_scan(&mut self) {
        let Some(job) = self.scan.as_mut() else {
            return;
        };

        for update in job.progress_rx.try_iter() {
            if update.files_processed > 0 {
                job.files_processed = update.files_processed;
                job.last_file = update.current_file;
            }
            if update.files_committed > 0 {
                job.files_committed = update.files_committed;
            }
        }

        if !job.handle.as_ref().map_or(true, |h| h.is_finished()) {
            return;
        }

        let elapsed = job.started.elapsed();
        let committed = job.files_committed;
        let outcome = job.handle.take().map(|h| h.join());
        self.scan = None;

        let message = match outcome {
            Some(Ok(Ok(result))) => StatusMessage::ok(format!(
                "Scan Complete! Processed {} files in {:.2}s.",
                result.stats.files_hashed,
                elapsed.as_secs_f64()
            )),
            Some(Ok(Err(ScanError::Cancelled))) => StatusMessage::error(format!(
                "Scan cancelled. {} records were saved.",
                committed
            )),
            Some(Ok(Err(e))) => {
                warn!(error = %e, "TUI scan failed");
                StatusMessage::error(format!("Error: {}", e))
            }
            Some(Err(_)) | None => StatusMessage::error("Error: scan thread panicked"),
        };
        self.show_message(message);
    }

    fn poll_prune(&mut self) {
        let Some(job) = self.prune.as_mut() else {
            return;
        };
        if !job.handle.as_ref().map_or(true, |h| h.is_finished()) {
            return;
        }

        let outcome = job.handle.take().map(|h| h.join());
        self.prune = None;

        let message = match outcome {
            Some(Ok(Ok(stats))) => StatusMessage::ok(format!(
                "Cleanup Complete! Removed {} stale records.",
                stats.removed
            )),
            Some(Ok(Err(e))) => StatusMessage::error(format!("Error: {}", e)),
            Some(Err(_)) | None => StatusMessage::error("Error: prune thread panicked"),
        };
        self.show_message(message);
    }

    /// Whether a background job is still running.
    pub fn is_busy(&self) -> bool {
        self.scan.is_some() || self.prune.is_some()
    }

    /// Tick until background jobs finish or `timeout` passes.
    pub fn wait_for_jobs(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
            self.tick();
        }
        true
    }
}

fn load_report(db_path: &Path) -> Result<ReportData, ScanError> {
    match Database::open_readonly(db_path) {
        Ok(db) => db.report(),
        // Nothing scanned yet: show an empty report rather than an error
        Err(ScanError::Database(BackendError::NotFound(_))) => Ok(ReportData::default()),
        Err(e) => Err(e),
    }
}
