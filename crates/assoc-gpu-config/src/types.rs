// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Every struct maps to one section of `assoc_gpu.toml`. All sections and fields
//! are optional; missing ones take the defaults below.
//!
//! ```toml
//! [device]
//! backend = "auto"          # emulated | cuda | auto
//! ordinal = 0
//! emulated_memory_bytes = 268435456
//!
//! [ensemble]
//! neurons_per_item = 50
//! num_items = 4
//! dimension = 16
//! num_steps = 100
//! dt = 0.001
//!
//! [diagnostics]
//! do_print = false
//!
//! [logging]
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssocGpuConfig {
    pub device: DeviceConfig,
    pub ensemble: EnsembleConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Compute device selection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// "emulated", "cuda" or "auto" (CUDA when compiled in and present)
    pub backend: String,
    pub ordinal: usize,
    /// Capacity of the emulated device; unlimited when absent
    pub emulated_memory_bytes: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            ordinal: 0,
            emulated_memory_bytes: None,
        }
    }
}

/// Ensemble geometry and neuron time constants
///
/// Left at zero when the model loader supplies the geometry instead.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub identical_ensembles: bool,
    pub neurons_per_item: usize,
    pub dimension: usize,
    pub num_items: usize,
    pub num_probes: usize,
    pub num_spikes: usize,
    pub num_steps: usize,
    pub dt: f32,
    pub pstc: f32,
    pub tau_ref: f32,
    pub tau_rc: f32,
    pub tau: f32,
    pub radius: f32,
}

impl EnsembleConfig {
    /// True once any geometry field has been set
    pub fn is_specified(&self) -> bool {
        self.neurons_per_item > 0 || self.num_items > 0 || self.dimension > 0 || self.num_steps > 0
    }
}

/// Diagnostic dump settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Write dynamic state every step
    pub do_print: bool,
    /// Include full array contents in state dumps
    pub print_arrays: bool,
    /// Destination of per-step dumps; stderr when absent
    pub output_path: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub log_level: String,
    /// Per-run log folders are created under this directory
    pub log_dir: PathBuf,
    pub file_logging: bool,
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            file_logging: false,
            retention_days: 7,
        }
    }
}
