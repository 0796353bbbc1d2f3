// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Reweave
//!
//! Recurrent dataflow execution engine. A mutable node/link/weight network
//! description is compiled, pass by pass, into layers of tensor operations;
//! forward inference and truncated backward gradient propagation run over a
//! bounded time window; weight gradients aggregate across shared weights
//! and time steps.
//!
//! This umbrella crate re-exports the workspace members:
//! - [`graph`] — data model, strategies, and the authoritative store
//! - [`engine`] — cycle detection, layer scheduling, and pass execution
//! - [`config`] — TOML configuration with environment overrides
//! - [`observability`] — tracing initialization
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reweave::graph::{GraphStore, Link, Node, NodeRole, Weight};
//! use reweave::graph::{ActivationKind, IntegrationKind, SolverKind, WeightInit};
//! use reweave::engine::Network;
//!
//! let mut store = GraphStore::new();
//! store.add_node(Node::new("in", NodeRole::Input, ActivationKind::Identity, IntegrationKind::WeightedSum));
//! store.add_node(Node::new("out", NodeRole::Output, ActivationKind::Sigmoid, IntegrationKind::WeightedSum));
//! store.add_weight(Weight::new("w", WeightInit::Uniform { low: -1.0, high: 1.0 }, SolverKind::Sgd { learning_rate: 0.05 }));
//! store.add_link(Link::new("l", "in", "out", "w"));
//!
//! let mut network = Network::new(store);
//! network.init_nodes(1, 1);
//! network.init_weights();
//! network.find_cycles().unwrap();
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use reweave_config as config;
pub use reweave_engine as engine;
pub use reweave_graph as graph;
pub use reweave_observability as observability;

pub use reweave_engine::{EngineSettings, Network, PassOptions, PassStats};
pub use reweave_graph::{GraphStore, ReweaveError};

/// Re-export for convenience
pub use ndarray;

/// Map a loaded configuration onto engine settings.
pub fn engine_settings_from_config(config: &reweave_config::ReweaveConfig) -> EngineSettings {
    EngineSettings {
        default_concurrency: config.engine.concurrency,
        max_pass_factor: config.engine.max_pass_factor,
        prune_iteration_cap: config.engine.prune_iteration_cap,
        cycle_op_ceiling: config.engine.cycle_op_ceiling,
    }
}
