// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Reweave Execution Engine
//!
//! Compiles a node/link/weight graph into per-layer tensor operations and
//! drives them over a truncated time window: forward inference, backward
//! gradient propagation, loss aggregation, and shared-weight updates.
//!
//! ## Architecture
//! - Execution order is *discovered* each pass from node lifecycle status;
//!   there is no precomputed topological order.
//! - Certified feedback edges (the cycle detector's registry) are the only
//!   way to satisfy a dependency that is not yet ready.
//! - Layers are strictly ordered; operations within a layer fan out over a
//!   bounded rayon pool and join before any buffer is written.
//! - Every discovery loop carries a hard iteration ceiling; malformed
//!   graphs abort instead of spinning.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backward;
pub mod cycles;
pub mod error_signal;
pub mod forward;
pub mod network;
pub mod plan;
pub mod scheduler;
pub mod weight_update;

pub use cycles::{find_cycles, CyclicPairs};
pub use error_signal::NAN_LOSS_SENTINEL;
pub use network::Network;
pub use plan::{Layer, LayerPlan, OpArg, Operation, PlanCache};

/// Hard limits and defaults for one network's execution, normally sourced
/// from configuration by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Worker count used when the caller does not specify one.
    pub default_concurrency: usize,
    /// Discovery ceiling multiplier: a pass may run at most
    /// `max_pass_factor * node_count + 8` layers before it is declared
    /// deadlocked.
    pub max_pass_factor: usize,
    /// Fixed-point rounds allowed to `prune_model`.
    pub prune_iteration_cap: usize,
    /// Operation budget for elementary-circuit enumeration.
    pub cycle_op_ceiling: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_concurrency: 1,
            max_pass_factor: 4,
            prune_iteration_cap: 16,
            cycle_op_ceiling: 1_000_000,
        }
    }
}

/// Per-call pass options. Cached plans are only valid against an unchanged
/// topology; the caller owns that contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// Record the discovered layer sequence for replay.
    pub cache_plan: bool,
    /// Replay the recorded layer sequence instead of discovering.
    pub use_cached_plan: bool,
    /// Bounded worker count for intra-layer fan-out; `<= 1` runs serially.
    pub concurrency: usize,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            cache_plan: false,
            use_cached_plan: false,
            concurrency: 1,
        }
    }
}

/// What one pass (or window of passes) actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassStats {
    pub layers: usize,
    pub operations: usize,
    pub elapsed_ms: f64,
}
