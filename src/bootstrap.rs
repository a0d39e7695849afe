// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wiring from configuration to a ready-to-initialize state

use std::fs::File;
use std::io::BufWriter;

use assoc_gpu_config::{
    validate_config, AssocGpuConfig, ConfigError, DeviceConfig, EnsembleConfig, LoggingConfig,
};
use assoc_gpu_observability::{LogOutput, LoggingConfig as ObservabilityLogging};
use assoc_gpu_runtime::{BackendType, DeviceContext, GpuDataError};
use assoc_gpu_state::{EnsembleGeometry, SimulationState};
use tracing::info;

/// Errors raised while building a state from configuration
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] GpuDataError),

    #[error("Failed to open diagnostic output: {0}")]
    Io(#[from] std::io::Error),
}

/// Open the device named by the `[device]` section
pub fn device_from_config(config: &DeviceConfig) -> Result<DeviceContext, GpuDataError> {
    let backend: BackendType = config.backend.parse()?;
    let capacity = config
        .emulated_memory_bytes
        .map(usize::try_from)
        .transpose()
        .map_err(|_| {
            GpuDataError::Configuration(format!(
                "emulated_memory_bytes {:?} does not fit in this platform's address space",
                config.emulated_memory_bytes
            ))
        })?;
    DeviceContext::select(backend, config.ordinal, capacity)
}

/// Geometry record from the `[ensemble]` section
pub fn geometry_from_config(config: &EnsembleConfig) -> EnsembleGeometry {
    EnsembleGeometry {
        identical_ensembles: config.identical_ensembles,
        neurons_per_item: config.neurons_per_item,
        dimension: config.dimension,
        num_items: config.num_items,
        num_probes: config.num_probes,
        num_spikes: config.num_spikes,
        num_steps: config.num_steps,
        dt: config.dt,
        pstc: config.pstc,
        tau_ref: config.tau_ref,
        tau_rc: config.tau_rc,
        tau: config.tau,
        radius: config.radius,
    }
}

/// Logging setup from the `[logging]` section
pub fn logging_from_config(config: &LoggingConfig) -> ObservabilityLogging {
    ObservabilityLogging {
        level: config.log_level.to_lowercase(),
        output: if config.file_logging {
            LogOutput::File
        } else {
            LogOutput::Stderr
        },
        log_dir: config.log_dir.clone(),
        retention_days: config.retention_days,
        ..ObservabilityLogging::default()
    }
}

/// Validate `config` and build a `Created` state for its device
///
/// The geometry comes from `[ensemble]` when present; otherwise the caller's
/// model loader fills it in before `initialize`.
pub fn state_from_config(config: &AssocGpuConfig) -> Result<SimulationState, BootstrapError> {
    validate_config(config)?;

    let device = device_from_config(&config.device)?;
    let mut state = SimulationState::new(device);
    if config.ensemble.is_specified() {
        state.set_geometry(geometry_from_config(&config.ensemble))?;
    }
    state.do_print = config.diagnostics.do_print;

    if let Some(path) = &config.diagnostics.output_path {
        let file = File::create(path)?;
        state.attach_diagnostic_output(Box::new(BufWriter::new(file)));
        info!("Diagnostic output written to {}", path.display());
    }

    Ok(state)
}
