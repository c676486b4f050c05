//! filehash command-line entry point
//!
//! Scans a directory into the inventory by default; `--ui`, `--prune`,
//! `--report` and `--hash` select the other front ends.

use anyhow::{Context, Result};
use clap::Parser;
use filehash::config::{default_config_path, load_config, load_default_config};
use filehash::{FilehashConfig, ScanCancelToken, ScanError};
use filehash_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

mod cli;

/// Exit status after an interrupted scan (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "filehash",
    version,
    about = "Inventory files and find duplicate content"
)]
struct Cli {
    /// Directory to scan
    #[arg(default_value = ".")]
    directory: PathBuf,

    /// Print every hashed file and every access error
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Launch the interactive terminal UI
    #[arg(long, conflicts_with_all = ["prune", "report", "hash"])]
    ui: bool,

    /// Remove records whose files no longer exist
    #[arg(long, conflicts_with_all = ["report", "hash"])]
    prune: bool,

    /// Print totals, largest files and duplicate groups
    #[arg(long, conflicts_with = "hash")]
    report: bool,

    /// List stored files with this MD5 digest
    #[arg(long, value_name = "MD5")]
    hash: Option<String>,

    /// Emit JSON instead of tables (with --report / --hash)
    #[arg(long)]
    json: bool,

    /// SQLite inventory path
    #[arg(long, env = "FILEHASH_DB")]
    database: Option<PathBuf>,

    /// Hash worker threads (0 = one per CPU)
    #[arg(long)]
    workers: Option<usize>,

    /// Records per database transaction
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,

    /// Config file (defaults to ~/.filehash/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to the config file and exit
    #[arg(long, conflicts_with_all = ["ui", "prune", "report", "hash"])]
    init_config: bool,
}

fn load_effective_config(cli: &Cli) -> Result<FilehashConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_default_config().context("Failed to load config")?,
    };

    if let Some(path) = &cli.database {
        config.database_path = Some(path.clone());
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = usize::try_from(batch_size).unwrap_or(usize::MAX);
    }
    Ok(config)
}

fn run_scan(cli: &Cli, config: &FilehashConfig, db_path: &std::path::Path) -> Result<ExitCode> {
    let cancel = ScanCancelToken::new();
    cli::signal::install_interrupt_handler(&cancel)?;

    let args = cli::scan::ScanArgs {
        directory: cli.directory.clone(),
        verbose: cli.verbose,
    };

    match cli::scan::run(&args, config, db_path, cancel) {
        Ok(result) => {
            println!(
                "Scan complete. Processed {} files.",
                result.stats.files_hashed
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if matches!(err.downcast_ref::<ScanError>(), Some(ScanError::Cancelled)) => {
            println!("\nScan interrupted by user.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(err) => Err(err),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_effective_config(&cli)?;
    if cli.init_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => default_config_path().context("Failed to locate config directory")?,
        };
        config
            .save(&path)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        println!("Wrote config to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let db_path = config.resolved_database_path();
    info!(database = %db_path.display(), "Using inventory");

    if cli.ui {
        if let Err(err) = cli::tui::run(config, db_path) {
            error!(error = %err, "TUI failed");
            eprintln!("UI Error: {:#}", err);
            return Ok(ExitCode::from(1));
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.prune {
        let stats = cli::prune::run(&db_path, cli.verbose)?;
        println!("Pruned {} stale records from database.", stats.removed);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.report {
        cli::report::run_report(&db_path, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(hash) = &cli.hash {
        cli::report::run_hash(&db_path, hash, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    run_scan(&cli, &config, &db_path)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep stderr quiet in TUI mode so log lines don't corrupt the display
    if let Err(err) = init_logging(LogConfig {
        app_name: "filehash",
        verbose: cli.verbose,
        tui_mode: cli.ui,
    }) {
        eprintln!("Warning: {:#}", err);
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["filehash"]).unwrap();
        assert_eq!(cli.directory, PathBuf::from("."));
        assert!(!cli.verbose && !cli.ui && !cli.prune && !cli.report);
        assert!(cli.hash.is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["filehash", "-v", "--prune", "/data"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.prune);
        assert_eq!(cli.directory, PathBuf::from("/data"));
    }

    #[test]
    fn test_ui_conflicts_with_prune() {
        assert!(Cli::try_parse_from(["filehash", "--ui", "--prune"]).is_err());
    }

    #[test]
    fn test_init_config_writes_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("conf/config.toml");
        let cli = Cli::try_parse_from([
            "filehash",
            "--init-config",
            "--workers",
            "2",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        let code = run(cli).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(load_config(&config_path).unwrap().workers, 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(Cli::try_parse_from(["filehash", "--batch-size", "0"]).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "workers = 3\nbatch_size = 50\n").unwrap();

        let cli = Cli::try_parse_from([
            "filehash",
            "--config",
            config_path.to_str().unwrap(),
            "--batch-size",
            "7",
            "--database",
            "/tmp/x.sqlite",
        ])
        .unwrap();
        let config = load_effective_config(&cli).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/x.sqlite")));
    }
}
