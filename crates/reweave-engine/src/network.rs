// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Network facade
//!
//! Owns one graph store plus everything derived from it: the feedback-pair
//! registry, cached layer plans, and the bounded worker pool. This is the
//! boundary at which failures are contained — one network's error never
//! aborts a sibling network in a population.

use ndarray::{Array2, Array3, Axis};
use rayon::ThreadPool;
use tracing::debug;

use reweave_graph::error::{Result, ReweaveError};
use reweave_graph::node::NodeStatus;
use reweave_graph::store::GraphStore;
use reweave_graph::strategies::LossKind;

use crate::cycles::{self, CyclicPairs};
use crate::plan::PlanCache;
use crate::{backward, error_signal, forward, weight_update};
use crate::{EngineSettings, PassOptions, PassStats};

/// One executable network instance.
pub struct Network {
    store: GraphStore,
    cyclic: CyclicPairs,
    plans: PlanCache,
    pool: Option<(usize, ThreadPool)>,
    settings: EngineSettings,
}

impl Network {
    /// Wrap a fully built graph (roles, strategies, and initial weights
    /// pre-assigned by the construction layer).
    pub fn new(store: GraphStore) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    pub fn with_settings(store: GraphStore, settings: EngineSettings) -> Self {
        Self {
            store,
            cyclic: CyclicPairs::empty(),
            plans: PlanCache::default(),
            pool: None,
            settings,
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Mutable access to the graph. Topology edits invalidate the feedback
    /// registry and any cached plans; call `clear_cache` (and `find_cycles`)
    /// afterwards.
    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Default pass options drawn from this network's settings.
    pub fn pass_options(&self) -> PassOptions {
        PassOptions {
            concurrency: self.settings.default_concurrency,
            ..PassOptions::default()
        }
    }

    // --- lifecycle -------------------------------------------------------

    pub fn init_nodes(&mut self, batch: usize, memory: usize) {
        self.store.init_nodes(batch, memory);
    }

    pub fn init_weights(&mut self) {
        self.store.init_weights();
    }

    /// Zero all time buffers, keeping topology and weights.
    pub fn reset_time(&mut self) {
        self.store.reset_time();
    }

    /// Fixed-point removal of dangling nodes/links/weights, bounded by the
    /// configured iteration cap. Returns the number of entities removed;
    /// a nonzero result invalidates caches the same way any topology edit
    /// does.
    pub fn prune(&mut self) -> usize {
        let removed = self.store.prune_model(self.settings.prune_iteration_cap);
        if removed > 0 {
            self.clear_cache();
        }
        removed
    }

    /// Drop cached layer plans and the feedback-pair registry.
    pub fn clear_cache(&mut self) {
        self.plans = PlanCache::default();
        self.cyclic = CyclicPairs::empty();
    }

    /// (Re)compute the feedback-pair registry, entirely replacing the
    /// cached set. Must be rerun whenever topology changes.
    pub fn find_cycles(&mut self) -> Result<&CyclicPairs> {
        self.cyclic = cycles::find_cycles(&self.store, self.settings.cycle_op_ceiling)?;
        Ok(&self.cyclic)
    }

    pub fn cyclic_pairs(&self) -> &CyclicPairs {
        &self.cyclic
    }

    // --- passes ----------------------------------------------------------

    /// One forward pass at `time_step`.
    pub fn forward_propagate(
        &mut self,
        time_step: usize,
        opts: &PassOptions,
    ) -> Result<PassStats> {
        self.ensure_pool(opts.concurrency)?;
        let pool = Self::pool_ref(&self.pool, opts.concurrency);
        forward::forward_pass(
            &mut self.store,
            &self.cyclic,
            time_step,
            opts,
            pool,
            &mut self.plans,
            &self.settings,
        )
    }

    /// One backward pass at `time_step`.
    pub fn back_propagate(&mut self, time_step: usize, opts: &PassOptions) -> Result<PassStats> {
        self.ensure_pool(opts.concurrency)?;
        let pool = Self::pool_ref(&self.pool, opts.concurrency);
        backward::backward_pass(
            &mut self.store,
            &self.cyclic,
            time_step,
            opts,
            pool,
            &mut self.plans,
            &self.settings,
        )
    }

    /// Forward propagation through a truncated time window.
    ///
    /// `input_values` is `[steps, batch, inputs]` and `dt` is
    /// `[steps, batch]`, both earliest-step-first. Sample `k` is pinned into
    /// execution slot `steps-1-k` and slots run oldest-first so feedback
    /// reads stay causal.
    pub fn fptt(
        &mut self,
        steps: usize,
        input_values: &Array3<f32>,
        input_node_names: &[String],
        dt: &Array2<f32>,
        opts: &PassOptions,
    ) -> Result<PassStats> {
        let (batch, memory) = self.store.batch_and_memory_sizes()?;
        if steps == 0 || steps > memory {
            return Err(ReweaveError::DimensionMismatch {
                what: "window steps",
                expected: format!("1..={}", memory),
                actual: steps.to_string(),
            });
        }
        let want = (steps, batch, input_node_names.len());
        if input_values.dim() != want {
            return Err(ReweaveError::DimensionMismatch {
                what: "input value tensor",
                expected: format!("{:?}", want),
                actual: format!("{:?}", input_values.dim()),
            });
        }
        if dt.dim() != (steps, batch) {
            return Err(ReweaveError::DimensionMismatch {
                what: "dt tensor",
                expected: format!("{:?}", (steps, batch)),
                actual: format!("{:?}", dt.dim()),
            });
        }
        for name in input_node_names {
            self.store.node(name)?;
        }

        let mut total = PassStats::default();
        for k in 0..steps {
            let slot = steps - 1 - k;
            self.store.reset_statuses_for_forward();

            for node in self.store.nodes_mut() {
                for b in 0..batch {
                    node.dt[[b, slot]] = dt[[k, b]];
                }
            }
            for (i, name) in input_node_names.iter().enumerate() {
                let node = self.store.node_mut(name)?;
                for b in 0..batch {
                    let value = input_values[[k, b, i]];
                    node.output[[b, slot]] = value;
                    node.input[[b, slot]] = value;
                    node.derivative[[b, slot]] = 1.0;
                    node.error[[b, slot]] = 0.0;
                }
                node.status = NodeStatus::Activated;
            }

            let stats = self.forward_propagate(slot, opts)?;
            total.layers += stats.layers;
            total.operations += stats.operations;
            total.elapsed_ms += stats.elapsed_ms;
        }
        debug!(steps, layers = total.layers, "forward window complete");
        Ok(total)
    }

    /// Truncated backpropagation through time: one backward pass per window
    /// position, latest slot first so feedback error flows toward the past.
    pub fn tbptt(&mut self, steps: usize, opts: &PassOptions) -> Result<PassStats> {
        let (_, memory) = self.store.batch_and_memory_sizes()?;
        if steps == 0 || steps > memory {
            return Err(ReweaveError::DimensionMismatch {
                what: "window steps",
                expected: format!("1..={}", memory),
                actual: steps.to_string(),
            });
        }

        let mut total = PassStats::default();
        for slot in 0..steps {
            if slot > 0 {
                self.store.reset_statuses_for_backward();
            }
            let stats = self.back_propagate(slot, opts)?;
            total.layers += stats.layers;
            total.operations += stats.operations;
            total.elapsed_ms += stats.elapsed_ms;
        }
        debug!(steps, layers = total.layers, "backward window complete");
        Ok(total)
    }

    // --- error & update --------------------------------------------------

    /// Composite error through time: accumulate loss and inject output
    /// error over `steps` window positions. Returns the `[steps, batch]`
    /// loss matrix.
    pub fn cett(
        &mut self,
        expected_values: &Array3<f32>,
        output_node_names: &[String],
        steps: usize,
        loss: LossKind,
    ) -> Result<Array2<f32>> {
        error_signal::aggregate_error(&mut self.store, expected_values, output_node_names, steps, loss)
    }

    /// Single-step convenience wrapper over `cett` for the latest slot.
    pub fn calculate_error(
        &mut self,
        expected_values: &Array2<f32>,
        output_node_names: &[String],
        loss: LossKind,
    ) -> Result<Array2<f32>> {
        let expanded = expected_values.clone().insert_axis(Axis(0));
        self.cett(&expanded, output_node_names, 1, loss)
    }

    /// Aggregate gradients across `[0, steps]` and all links per shared
    /// weight, then apply each weight's solver. Returns the number of
    /// weights updated.
    pub fn update_weights(&mut self, steps: usize, filter: Option<&[String]>) -> Result<usize> {
        weight_update::update_weights(&mut self.store, &self.cyclic, steps, filter)
    }

    // --- diagnostics -----------------------------------------------------

    /// Connectivity self-test: pin every weight to 1, flood one forward and
    /// one backward pass, and check that every output produced nonzero
    /// output and every input received nonzero error. Weights, buffers, and
    /// statuses are restored afterwards.
    pub fn check_complete_input_to_output(&mut self) -> Result<bool> {
        let snapshot = self.store.clone();
        let outcome = self.run_connectivity_probe();
        self.store = snapshot;
        outcome
    }

    fn run_connectivity_probe(&mut self) -> Result<bool> {
        if self.store.input_nodes().is_empty() || self.store.output_nodes().is_empty() {
            return Ok(false);
        }
        for weight in self.store.weights_mut() {
            weight.value = 1.0;
        }
        self.store.init_nodes(1, 1);
        self.cyclic = cycles::find_cycles(&self.store, self.settings.cycle_op_ceiling)?;

        let input_names = self.store.input_nodes().to_vec();
        let output_names = self.store.output_nodes().to_vec();

        for node in self.store.nodes_mut() {
            node.dt[[0, 0]] = 1.0;
        }
        for name in &input_names {
            let node = self.store.node_mut(name)?;
            node.output[[0, 0]] = 1.0;
            node.input[[0, 0]] = 1.0;
            node.derivative[[0, 0]] = 1.0;
            node.status = NodeStatus::Activated;
        }

        let probe_opts = PassOptions::default();
        self.forward_propagate(0, &probe_opts)?;

        let mut complete = true;
        for name in &output_names {
            if self.store.node(name)?.output[[0, 0]] == 0.0 {
                complete = false;
            }
        }

        for name in &output_names {
            let node = self.store.node_mut(name)?;
            node.error[[0, 0]] = node.derivative[[0, 0]];
            node.status = NodeStatus::Corrected;
        }
        self.back_propagate(0, &probe_opts)?;

        for name in &input_names {
            if self.store.node(name)?.error[[0, 0]] == 0.0 {
                complete = false;
            }
        }
        Ok(complete)
    }

    // --- worker pool -----------------------------------------------------

    fn ensure_pool(&mut self, concurrency: usize) -> Result<()> {
        if concurrency <= 1 {
            return Ok(());
        }
        if self.pool.as_ref().map(|(size, _)| *size) == Some(concurrency) {
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .build()
            .map_err(|e| ReweaveError::WorkerPool(e.to_string()))?;
        self.pool = Some((concurrency, pool));
        Ok(())
    }

    fn pool_ref(pool: &Option<(usize, ThreadPool)>, concurrency: usize) -> Option<&ThreadPool> {
        if concurrency <= 1 {
            return None;
        }
        pool.as_ref().map(|(_, p)| p)
    }
}
