// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with the `file-logging` feature and `LogOutput::File`,
//! a timestamped run folder with one JSON log per crate plus a combined log.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LogOutput, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Keeps file writers alive; logs are flushed when it is dropped
#[derive(Default)]
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("LoggingGuard");
        #[cfg(feature = "file-logging")]
        debug.field("file_guards", &self._file_guards.len());
        debug.field("log_dir", &self.log_dir).finish()
    }
}

impl LoggingGuard {
    /// Run folder of this process, `None` for console-only logging
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Install the global subscriber
///
/// Creates, for file output:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       ├── assoc-gpu-runtime.log
///       ├── assoc-gpu-state.log
///       └── assoc-gpu.log (combined)
/// ```
///
/// # Errors
/// Unknown log level, file output without the `file-logging` feature, an
/// unwritable log directory, or a subscriber already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = filter_directives(debug_flags, config)?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config, EnvFilter::new(&filter))];
    let guard = match config.output {
        LogOutput::File => file_layers(&mut layers, config, &filter)?,
        LogOutput::Stdout | LogOutput::Stderr => LoggingGuard::default(),
    };

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

/// Initialize console logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingConfig::default())
}

/// `EnvFilter` directives for `config.level` plus per-crate debug flags
pub fn filter_directives(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<String> {
    let level = config.tracing_level()?;
    Ok(debug_flags.to_filter_string(&level.to_string().to_lowercase()))
}

fn console_layer(config: &LoggingConfig, filter: EnvFilter) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    match (config.format, config.output) {
        (LogFormat::Json, LogOutput::Stdout) => layer
            .json()
            .with_writer(std::io::stdout)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Json, _) => layer
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, LogOutput::Stdout) => layer
            .with_writer(std::io::stdout)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, _) => layer
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

#[cfg(feature = "file-logging")]
fn file_layers(
    layers: &mut Vec<BoxedLayer>,
    config: &LoggingConfig,
    filter: &str,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let run_folder = config.log_dir.join(run_folder_name(Utc::now()));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_logs(&config.log_dir, config.retention_days, config.retention_runs)?;

    let mut file_guards = Vec::new();

    // One file per crate
    for crate_name in crate::KNOWN_CRATES {
        let appender = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guards.push(guard);

        let target = crate_name.replace('-', "_");
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(EnvFilter::new(format!("off,{}=debug", target)))
                .boxed(),
        );
    }

    // Combined log file (all crates)
    let combined = rolling::never(&run_folder, "assoc-gpu.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined);
    file_guards.push(combined_guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(combined_non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::new(filter))
            .boxed(),
    );

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
fn file_layers(
    _layers: &mut Vec<BoxedLayer>,
    _config: &LoggingConfig,
    _filter: &str,
) -> Result<LoggingGuard> {
    Err(crate::ObservabilityError::FileLoggingUnavailable.into())
}

/// Folder name of a run started at `started`
pub fn run_folder_name(started: DateTime<Utc>) -> String {
    format!("{}{}", RUN_PREFIX, started.format(RUN_TIMESTAMP))
}

/// Delete run folders past the retention policy; returns how many were removed
///
/// Folders older than `retention_days` go first, then the oldest remaining ones
/// until at most `retention_runs` are left. Other directory entries are ignored.
pub fn cleanup_old_logs(base_log_dir: &Path, retention_days: u64, retention_runs: usize) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let started = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_PREFIX))
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, RUN_TIMESTAMP).ok());
        if let Some(started) = started {
            runs.push((path, started.and_utc()));
        }
    }

    // Newest first; everything past the kept window or the cutoff goes
    runs.sort_by_key(|(_, started)| std::cmp::Reverse(*started));

    let mut removed = 0;
    for (index, (path, started)) in runs.iter().enumerate() {
        if *started >= cutoff && index < retention_runs {
            continue;
        }
        match std::fs::remove_dir_all(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Warning: Failed to remove old log directory {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}
