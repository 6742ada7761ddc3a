// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for LiFE
//!
//! Console logging is always available. With the `file-logging` feature, each
//! run also gets a timestamped folder of JSON log files with configurable
//! retention.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Logging initialization result
///
/// Dropping the guard flushes pending file writes.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

fn console_layer(
    format: LogFormat,
    filter: EnvFilter,
) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

/// Initialize console-only logging
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_console_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::new(debug_flags.to_filter_string(&config.level));
    Registry::default()
        .with(console_layer(config.format, filter))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        log_dir: None,
    })
}

/// Initialize logging with file output and console output
///
/// Creates a timestamped folder structure:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       ├── life-engine.log
///       ├── life-config.log
///       └── life.log (combined)
/// ```
///
/// Falls back to [`init_console_logging`] when `config.file_logging` is off.
#[cfg(feature = "file-logging")]
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    if !config.file_logging {
        return init_console_logging(debug_flags, config);
    }

    let timestamp = Utc::now().format(RUN_TIMESTAMP_FORMAT);
    let run_folder = config.log_dir.join(format!("{}{}", RUN_PREFIX, timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_logs(&config.log_dir, config.retention_days, config.retention_runs)?;

    let filter = debug_flags.to_filter_string(&config.level);
    let mut layers = Vec::new();
    let mut file_guards = Vec::new();

    layers.push(console_layer(config.format, EnvFilter::new(&filter)));

    // One file per crate
    for crate_name in crate::KNOWN_CRATES {
        let file_appender = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guards.push(guard);

        let target = crate_name.replace('-', "_");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::new(format!("off,{}=debug", target)))
            .boxed();
        layers.push(file_layer);
    }

    // Combined log file (all crates)
    let combined_appender = rolling::never(&run_folder, "life.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined_appender);
    file_guards.push(combined_guard);

    let combined_layer = tracing_subscriber::fmt::layer()
        .with_writer(combined_non_blocking)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(EnvFilter::new(&filter))
        .boxed();
    layers.push(combined_layer);

    Registry::default()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    if config.file_logging {
        eprintln!("Warning: built without the file-logging feature, logging to console only");
    }
    init_console_logging(debug_flags, config)
}

fn parse_run_timestamp(dir_name: &str) -> Option<DateTime<Utc>> {
    let stamp = dir_name.strip_prefix(RUN_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Clean up old run folders based on retention policy
///
/// Folders older than `retention_days` go first; then the oldest remaining
/// ones until at most `retention_runs` are left. Returns how many were removed.
pub fn cleanup_old_logs(base_log_dir: &Path, retention_days: u64, retention_runs: usize) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let cutoff_date = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(dt) = path.file_name().and_then(|n| n.to_str()).and_then(parse_run_timestamp) {
            runs.push((path, dt));
        }
    }

    // Oldest first
    runs.sort_by_key(|(_, dt)| *dt);

    let expired = runs.iter().filter(|(_, dt)| *dt < cutoff_date).count();
    let over_limit = runs.len().saturating_sub(expired).saturating_sub(retention_runs);
    let to_remove = expired + over_limit;

    let mut removed = 0;
    for (path, _) in runs.iter().take(to_remove) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            ),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_run_timestamp() {
        assert!(parse_run_timestamp("run_20250101_120000").is_some());
        assert!(parse_run_timestamp("run_latest").is_none());
        assert!(parse_run_timestamp("notes").is_none());
    }

    #[test]
    fn test_cleanup_respects_run_limit() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        for hours_ago in 0..5 {
            let stamp = (now - chrono::Duration::hours(hours_ago)).format(RUN_TIMESTAMP_FORMAT);
            std::fs::create_dir(dir.path().join(format!("run_{}", stamp))).unwrap();
        }
        std::fs::create_dir(dir.path().join("keep_me")).unwrap();

        let removed = cleanup_old_logs(dir.path(), 30, 3).unwrap();
        assert_eq!(removed, 2);

        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 4);
        assert!(dir.path().join("keep_me").exists());
    }

    #[test]
    fn test_cleanup_removes_expired_runs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run_20000101_000000")).unwrap();
        let recent = Utc::now().format(RUN_TIMESTAMP_FORMAT);
        std::fs::create_dir(dir.path().join(format!("run_{}", recent))).unwrap();

        let removed = cleanup_old_logs(dir.path(), 30, 10).unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("run_20000101_000000").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent"), 30, 10).unwrap(), 0);
    }
}
