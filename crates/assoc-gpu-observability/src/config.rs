// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ObservabilityError;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Console format
    pub format: LogFormat,

    /// Output destination
    pub output: LogOutput,

    /// Base directory for per-run folders (file output only)
    pub log_dir: PathBuf,

    /// Delete run folders older than this many days
    pub retention_days: u64,

    /// Keep at most this many run folders
    pub retention_runs: usize,
}

impl LoggingConfig {
    /// `level` as a tracing level
    pub fn tracing_level(&self) -> Result<tracing::Level, ObservabilityError> {
        self.level
            .parse::<tracing::Level>()
            .map_err(|_| ObservabilityError::InvalidLevel(self.level.clone()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Console plus a per-run log folder (`file-logging` feature)
    File,
}
