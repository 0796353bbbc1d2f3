// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation: reject values the engine cannot run with
//! before they reach a pass.

use crate::{ConfigError, ConfigResult, ReweaveConfig};

const KNOWN_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a loaded configuration.
pub fn validate_config(config: &ReweaveConfig) -> ConfigResult<()> {
    if config.engine.concurrency == 0 {
        return Err(ConfigError::InvalidValue(
            "engine.concurrency must be >= 1".to_string(),
        ));
    }
    if config.engine.max_pass_factor == 0 {
        return Err(ConfigError::InvalidValue(
            "engine.max_pass_factor must be >= 1".to_string(),
        ));
    }
    if config.engine.prune_iteration_cap == 0 {
        return Err(ConfigError::InvalidValue(
            "engine.prune_iteration_cap must be >= 1".to_string(),
        ));
    }
    if config.engine.cycle_op_ceiling == 0 {
        return Err(ConfigError::InvalidValue(
            "engine.cycle_op_ceiling must be >= 1".to_string(),
        ));
    }
    if !KNOWN_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::InvalidValue(format!(
            "logging.level must be one of {:?}, got '{}'",
            KNOWN_LOG_LEVELS, config.logging.level
        )));
    }
    Ok(())
}
