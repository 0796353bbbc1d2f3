// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Type-safe configuration structures with serde defaults.

use serde::{Deserialize, Serialize};

/// Complete reweave configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReweaveConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Execution-engine limits and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Worker count for intra-layer fan-out when the caller passes none.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Discovery ceiling multiplier (layers per pass is bounded by
    /// `max_pass_factor * node_count + 8`).
    #[serde(default = "default_max_pass_factor")]
    pub max_pass_factor: usize,

    /// Fixed-point rounds allowed to model pruning.
    #[serde(default = "default_prune_iteration_cap")]
    pub prune_iteration_cap: usize,

    /// Operation budget for elementary-circuit enumeration.
    #[serde(default = "default_cycle_op_ceiling")]
    pub cycle_op_ceiling: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_pass_factor: default_max_pass_factor(),
            prune_iteration_cap: default_prune_iteration_cap(),
            cycle_op_ceiling: default_cycle_op_ceiling(),
        }
    }
}

/// Logging defaults applied when `RUST_LOG` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_max_pass_factor() -> usize {
    4
}

fn default_prune_iteration_cap() -> usize {
    16
}

fn default_cycle_op_ceiling() -> usize {
    1_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReweaveConfig::default();
        assert_eq!(config.engine.concurrency, 1);
        assert_eq!(config.engine.max_pass_factor, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ReweaveConfig = toml::from_str("[engine]\nconcurrency = 8\n").unwrap();
        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.engine.prune_iteration_cap, 16);
        assert_eq!(config.logging.level, "info");
    }
}
