// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones win:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{AssocGpuConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "assoc_gpu.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `ASSOC_GPU_CONFIG_PATH` environment variable
/// 2. Current working directory: `./assoc_gpu.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("ASSOC_GPU_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by ASSOC_GPU_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            let Some(parent) = current.parent() else {
                break;
            };
            search_paths.push(parent.join(CONFIG_FILE_NAME));
            current = parent;
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet ASSOC_GPU_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// # Arguments
///
/// * `config_path` - Path to the config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<AssocGpuConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: AssocGpuConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `ASSOC_GPU_BACKEND` -> `device.backend`
/// - `ASSOC_GPU_DEVICE` -> `device.ordinal`
/// - `ASSOC_GPU_EMULATED_MEMORY_BYTES` -> `device.emulated_memory_bytes`
/// - `ASSOC_GPU_LOG_LEVEL` -> `logging.log_level`
/// - `ASSOC_GPU_DO_PRINT` -> `diagnostics.do_print`
///
/// Unparseable numeric values are ignored.
pub fn apply_environment_overrides(config: &mut AssocGpuConfig) {
    let vars: HashMap<String, String> = [
        ("ASSOC_GPU_BACKEND", "backend"),
        ("ASSOC_GPU_DEVICE", "device"),
        ("ASSOC_GPU_EMULATED_MEMORY_BYTES", "emulated_memory_bytes"),
        ("ASSOC_GPU_LOG_LEVEL", "log_level"),
        ("ASSOC_GPU_DO_PRINT", "do_print"),
    ]
    .into_iter()
    .filter_map(|(var, key)| env::var(var).ok().map(|value| (key.to_string(), value)))
    .collect();

    apply_cli_overrides(config, &vars);
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - CLI arguments by key (e.g. `{"backend": "cuda", "device": "1"}`)
pub fn apply_cli_overrides(config: &mut AssocGpuConfig, cli_args: &HashMap<String, String>) {
    // Device
    if let Some(value) = cli_args.get("backend") {
        config.device.backend = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("device") {
        if let Ok(ordinal) = value.parse::<usize>() {
            config.device.ordinal = ordinal;
        }
    }
    if let Some(value) = cli_args.get("emulated_memory_bytes") {
        if let Ok(bytes) = value.parse::<u64>() {
            config.device.emulated_memory_bytes = Some(bytes);
        }
    }

    // Diagnostics
    if let Some(value) = cli_args.get("do_print") {
        config.diagnostics.do_print = parse_flag(value);
    }
    if let Some(value) = cli_args.get("print_arrays") {
        config.diagnostics.print_arrays = parse_flag(value);
    }

    // Logging
    if let Some(value) = cli_args.get("log_level") {
        config.logging.log_level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OVERRIDE_VARS: [&str; 5] = [
        "ASSOC_GPU_BACKEND",
        "ASSOC_GPU_DEVICE",
        "ASSOC_GPU_EMULATED_MEMORY_BYTES",
        "ASSOC_GPU_LOG_LEVEL",
        "ASSOC_GPU_DO_PRINT",
    ];

    fn clear_override_vars() {
        for var in OVERRIDE_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("ASSOC_GPU_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("ASSOC_GPU_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("ASSOC_GPU_CONFIG_PATH", "/nonexistent/assoc_gpu.toml");
        let result = find_config_file();
        env::remove_var("ASSOC_GPU_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_override_vars();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[device]").unwrap();
        writeln!(file, "backend = \"emulated\"").unwrap();
        writeln!(file, "emulated_memory_bytes = 4096").unwrap();
        writeln!(file, "[ensemble]").unwrap();
        writeln!(file, "num_items = 4").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.device.backend, "emulated");
        assert_eq!(config.device.emulated_memory_bytes, Some(4096));
        assert_eq!(config.ensemble.num_items, 4);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[device\nordinal = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = AssocGpuConfig::default();

        env::set_var("ASSOC_GPU_BACKEND", "CUDA");
        env::set_var("ASSOC_GPU_DEVICE", "3");
        env::set_var("ASSOC_GPU_EMULATED_MEMORY_BYTES", "not-a-number");
        env::set_var("ASSOC_GPU_DO_PRINT", "yes");

        apply_environment_overrides(&mut config);
        clear_override_vars();

        assert_eq!(config.device.backend, "cuda");
        assert_eq!(config.device.ordinal, 3);
        assert_eq!(config.device.emulated_memory_bytes, None);
        assert!(config.diagnostics.do_print);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AssocGpuConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("device".to_string(), "1".to_string());
        cli_args.insert("log_level".to_string(), "debug".to_string());
        cli_args.insert("print_arrays".to_string(), "true".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.device.ordinal, 1);
        assert_eq!(config.logging.log_level, "debug");
        assert!(config.diagnostics.print_arrays);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_override_vars();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[device]").unwrap();
        writeln!(file, "backend = \"auto\"").unwrap();
        writeln!(file, "ordinal = 0").unwrap();

        env::set_var("ASSOC_GPU_BACKEND", "emulated");
        env::set_var("ASSOC_GPU_DEVICE", "2");

        let mut cli_args = HashMap::new();
        cli_args.insert("device".to_string(), "5".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
        clear_override_vars();

        // CLI wins for the ordinal, env wins for the backend (no CLI override)
        assert_eq!(config.device.ordinal, 5);
        assert_eq!(config.device.backend, "emulated");
    }
}
