//! Per-run log files and tracing setup.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use unscrobbler::{DeletionLogSink, DRIVER_LOG_TARGET};

use crate::config::ConfigError;

/// Timestamp embedded in a run's log file names.
pub fn run_stamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

pub fn deletion_log_name(stamp: &str, dry_run: bool) -> String {
    let marker = if dry_run { "_dryrun" } else { "" };
    format!("unscrobbler_{stamp}{marker}.log.jsonl")
}

pub fn driver_log_name(stamp: &str) -> String {
    format!("driver_{stamp}.log")
}

/// The log destinations for one run. Without a log directory both are off.
pub struct RunLogFiles {
    pub deletion_sink: DeletionLogSink,
    pub deletion_log_path: Option<PathBuf>,
    pub driver_log: Option<File>,
}

impl RunLogFiles {
    /// Create this run's log files in `log_dir`. Existing files are never
    /// reused.
    pub fn open(log_dir: Option<&Path>, stamp: &str, dry_run: bool) -> Result<Self, ConfigError> {
        let Some(dir) = log_dir else {
            return Ok(Self {
                deletion_sink: DeletionLogSink::disabled(),
                deletion_log_path: None,
                driver_log: None,
            });
        };

        std::fs::create_dir_all(dir).map_err(|source| ConfigError::LogFile {
            path: dir.to_path_buf(),
            reason: source.to_string(),
        })?;

        let driver_log_path = dir.join(driver_log_name(stamp));
        let driver_log = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&driver_log_path)
            .map_err(|source| ConfigError::LogFile {
                path: driver_log_path.clone(),
                reason: source.to_string(),
            })?;

        let deletion_log_path = dir.join(deletion_log_name(stamp, dry_run));
        let deletion_sink = match DeletionLogSink::create_exclusive(&deletion_log_path) {
            Ok(sink) => sink,
            Err(e) => {
                drop(driver_log);
                let _ = std::fs::remove_file(&driver_log_path);
                return Err(ConfigError::LogFile {
                    path: deletion_log_path,
                    reason: e.to_string(),
                });
            }
        };

        Ok(Self {
            deletion_sink,
            deletion_log_path: Some(deletion_log_path),
            driver_log: Some(driver_log),
        })
    }

    /// Report where this run's logs go. Call once tracing is installed.
    pub fn announce(&self) {
        match &self.deletion_log_path {
            Some(path) => tracing::info!("Logging deletions to {}", path.display()),
            None => tracing::info!("No --log-dir given; deletions are not logged to a file."),
        }
    }
}

/// Install the global subscriber: human-readable events on stderr, plus
/// driver diagnostics copied to `driver_log` when one is open.
pub fn init_tracing(log_level: &str, driver_log: Option<File>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let driver_layer = driver_log.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(Targets::new().with_target(DRIVER_LOG_TARGET, Level::TRACE))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(driver_layer)
        .init();
}
