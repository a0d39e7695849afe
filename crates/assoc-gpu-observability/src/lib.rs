// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # assoc-gpu-observability
//!
//! Logging setup shared by every assoc-gpu binary and test harness, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: per-run log folders with JSON files and retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known assoc-gpu crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "assoc-gpu",
    "assoc-gpu-runtime",
    "assoc-gpu-state",
    "assoc-gpu-config",
    "assoc-gpu-observability",
];

/// Errors raised while setting up logging
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("Unknown log level '{0}' (expected trace, debug, info, warn or error)")]
    InvalidLevel(String),

    #[error("File logging requested but the 'file-logging' feature is not enabled")]
    FileLoggingUnavailable,
}
