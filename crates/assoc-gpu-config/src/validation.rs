// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Collects every problem before failing, so one run reports them all.

use crate::{AssocGpuConfig, ConfigError, ConfigResult, EnsembleConfig};

const BACKENDS: [&str; 5] = ["emulated", "host", "cuda", "gpu", "auto"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks the backend name, emulated capacity, log level and, when an
/// `[ensemble]` section is present, the geometry.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &AssocGpuConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_device(config, &mut errors);
    validate_logging(config, &mut errors);
    if config.ensemble.is_specified() {
        validate_ensemble(&config.ensemble, &mut errors);
    }

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_device(config: &AssocGpuConfig, errors: &mut Vec<ConfigValidationError>) {
    let backend = config.device.backend.to_lowercase();
    if !BACKENDS.contains(&backend.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.backend".to_string(),
            reason: format!(
                "'{}' is not one of emulated, cuda, auto",
                config.device.backend
            ),
        });
    }

    if config.device.emulated_memory_bytes == Some(0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.emulated_memory_bytes".to_string(),
            reason: "must be greater than 0 (omit for unlimited)".to_string(),
        });
    }
}

fn validate_logging(config: &AssocGpuConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.log_level".to_string(),
            reason: format!("'{}' is not one of {}", config.logging.log_level, LOG_LEVELS.join(", ")),
        });
    }
}

fn validate_ensemble(ensemble: &EnsembleConfig, errors: &mut Vec<ConfigValidationError>) {
    let required = [
        ("ensemble.neurons_per_item", ensemble.neurons_per_item),
        ("ensemble.num_items", ensemble.num_items),
        ("ensemble.dimension", ensemble.dimension),
        ("ensemble.num_steps", ensemble.num_steps),
    ];
    for (field, value) in required {
        if value == 0 {
            errors.push(ConfigValidationError::MissingRequired {
                field: field.to_string(),
            });
        }
    }

    if !(ensemble.dt.is_finite() && ensemble.dt > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "ensemble.dt".to_string(),
            reason: "must be a positive number of seconds".to_string(),
        });
    }

    let constants = [
        ("ensemble.pstc", ensemble.pstc),
        ("ensemble.tau_ref", ensemble.tau_ref),
        ("ensemble.tau_rc", ensemble.tau_rc),
        ("ensemble.tau", ensemble.tau),
        ("ensemble.radius", ensemble.radius),
    ];
    for (field, value) in constants {
        if !value.is_finite() || value < 0.0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("must be finite and non-negative, got {}", value),
            });
        }
    }

    if ensemble.num_probes > ensemble.num_items {
        errors.push(ConfigValidationError::InvalidValue {
            field: "ensemble.num_probes".to_string(),
            reason: format!("{} exceeds num_items ({})", ensemble.num_probes, ensemble.num_items),
        });
    }

    match ensemble.neurons_per_item.checked_mul(ensemble.num_items) {
        Some(neurons) if ensemble.num_spikes > neurons => {
            errors.push(ConfigValidationError::InvalidValue {
                field: "ensemble.num_spikes".to_string(),
                reason: format!("{} exceeds the neuron count ({})", ensemble.num_spikes, neurons),
            });
        }
        None => errors.push(ConfigValidationError::InvalidValue {
            field: "ensemble.neurons_per_item".to_string(),
            reason: "neurons_per_item * num_items overflows".to_string(),
        }),
        _ => {}
    }
}
