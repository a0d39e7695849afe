// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-assoc-gpu-state` and `--debug-all`.

use std::collections::HashMap;
use std::env;

use crate::KNOWN_CRATES;

/// Per-crate debug switches
///
/// # Example
/// ```rust
/// use assoc_gpu_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-assoc-gpu-state".to_string()]);
/// assert!(flags.is_enabled("assoc-gpu-state"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Parse `--debug-{crate-name}` and `--debug-all` from command-line arguments
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();

        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }

        flags
    }

    /// Merge an `ASSOC_GPU_DEBUG` value: `all` or comma-separated crate names
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string(), true);
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    /// Get all enabled crates
    pub fn enabled_crates(&self) -> Vec<&String> {
        self.enabled_crates.keys().collect()
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// `EnvFilter` directives: enabled crates at debug, everything else at `default_level`
    ///
    /// Tracing targets are module paths, so crate names are written with
    /// underscores (`assoc_gpu_state=debug`).
    pub fn to_filter_string(&self, default_level: &str) -> String {
        let mut crates: Vec<&String> = self.enabled_crates.keys().collect();
        crates.sort();

        let mut filters: Vec<String> = crates
            .into_iter()
            .map(|name| format!("{}=debug", name.replace('-', "_")))
            .collect();
        filters.push(default_level.to_string());
        filters.join(",")
    }
}

/// Debug flags from the process arguments and `ASSOC_GPU_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var("ASSOC_GPU_DEBUG") {
        flags.merge_env_value(&value);
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  ASSOC_GPU_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  ASSOC_GPU_DEBUG=all                               Enable debug for all crates

Examples:
  --debug-assoc-gpu-state
  --debug-assoc-gpu-state --debug-assoc-gpu-runtime
  ASSOC_GPU_DEBUG=assoc-gpu-state,assoc-gpu-runtime
"#,
        KNOWN_CRATES.join(", ")
    )
}
