// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # assoc-gpu Configuration
//!
//! Type-safe configuration for the associative-memory simulator:
//! - TOML file parsing (`assoc_gpu.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use assoc_gpu_config::{load_config, validate_config};
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! validate_config(&config).expect("Invalid config");
//!
//! println!("Backend: {}", config.device.backend);
//! println!("Device: {}", config.device.ordinal);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AssocGpuConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: ConfigError = toml::from_str::<AssocGpuConfig>("[device\nbackend = 1")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
