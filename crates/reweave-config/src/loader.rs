// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Two-tier loading:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigError, ConfigResult, ReweaveConfig};

const CONFIG_FILE_NAME: &str = "reweave.toml";

/// Find the reweave configuration file.
///
/// Search order:
/// 1. `REWEAVE_CONFIG_PATH` environment variable
/// 2. Current working directory: `./reweave.toml`
/// 3. Parent directories (up to 5 levels, for workspace roots)
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("REWEAVE_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by REWEAVE_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd;
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet REWEAVE_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file with environment overrides applied.
///
/// With `config_path == None` the file is discovered via `find_config_file`.
pub fn load_config(config_path: Option<&Path>) -> ConfigResult<ReweaveConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: ReweaveConfig = toml::from_str(&content)?;
    apply_environment_overrides(&mut config);
    Ok(config)
}

/// Load configuration, falling back to defaults (plus environment
/// overrides) when no file exists.
pub fn load_config_or_default() -> ReweaveConfig {
    match load_config(None) {
        Ok(config) => config,
        Err(_) => {
            let mut config = ReweaveConfig::default();
            apply_environment_overrides(&mut config);
            config
        }
    }
}

/// Apply environment variable overrides to configuration.
///
/// Supported environment variables:
/// - `REWEAVE_CONCURRENCY` -> `engine.concurrency`
/// - `REWEAVE_MAX_PASS_FACTOR` -> `engine.max_pass_factor`
/// - `REWEAVE_PRUNE_ITERATION_CAP` -> `engine.prune_iteration_cap`
/// - `REWEAVE_CYCLE_OP_CEILING` -> `engine.cycle_op_ceiling`
/// - `REWEAVE_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut ReweaveConfig) {
    if let Ok(value) = env::var("REWEAVE_CONCURRENCY") {
        if let Ok(parsed) = value.parse::<usize>() {
            config.engine.concurrency = parsed;
        }
    }
    if let Ok(value) = env::var("REWEAVE_MAX_PASS_FACTOR") {
        if let Ok(parsed) = value.parse::<usize>() {
            config.engine.max_pass_factor = parsed;
        }
    }
    if let Ok(value) = env::var("REWEAVE_PRUNE_ITERATION_CAP") {
        if let Ok(parsed) = value.parse::<usize>() {
            config.engine.prune_iteration_cap = parsed;
        }
    }
    if let Ok(value) = env::var("REWEAVE_CYCLE_OP_CEILING") {
        if let Ok(parsed) = value.parse::<usize>() {
            config.engine.cycle_op_ceiling = parsed;
        }
    }
    if let Ok(value) = env::var("REWEAVE_LOG_LEVEL") {
        config.logging.level = value;
    }
}
