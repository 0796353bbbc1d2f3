// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Backward Executor
//!
//! Mirror of the forward executor: repeatedly discovers "uncorrected"
//! layers — activated sources whose sinks have finalized error — and writes
//! each node's error for the current slot. Feedback arguments read the
//! downstream error one slot toward the present, so gradient flows from
//! later real time to earlier; the newest window edge contributes zero
//! (truncation).
//!
//! The discovery loop keeps a visited set so repeated cycle-resolution
//! passes cannot revisit a node, and terminates once two consecutive passes
//! correct nothing new.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use ahash::{AHashMap, AHashSet};

use reweave_graph::error::{Result, ReweaveError};
use reweave_graph::node::NodeStatus;
use reweave_graph::store::GraphStore;
use reweave_graph::strategies::ErrorTerm;

use crate::cycles::CyclicPairs;
use crate::plan::{slot_read, Layer, LayerPlan, Operation, PlanCache};
use crate::scheduler::discover_backward_layer;
use crate::{EngineSettings, PassOptions, PassStats};

/// Run one full backward pass at `time_step`.
pub fn backward_pass(
    store: &mut GraphStore,
    cyclic: &CyclicPairs,
    time_step: usize,
    opts: &PassOptions,
    pool: Option<&ThreadPool>,
    cache: &mut PlanCache,
    settings: &EngineSettings,
) -> Result<PassStats> {
    let started = std::time::Instant::now();
    let (_, memory) = store.batch_and_memory_sizes()?;
    if time_step > memory {
        return Err(ReweaveError::DimensionMismatch {
            what: "backward time step",
            expected: format!("<= {}", memory),
            actual: time_step.to_string(),
        });
    }

    let fan_in = store.fan_in_map();
    let mut stats = PassStats::default();

    if opts.use_cached_plan {
        if let Some(plan) = cache.backward.clone() {
            for layer in &plan.layers {
                execute_backward_layer(store, layer, time_step, pool, &fan_in)?;
                stats.layers += 1;
                stats.operations += layer.len();
            }
            stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            return Ok(stats);
        }
        debug!("no cached backward plan; falling back to discovery");
    }

    let ceiling = settings.max_pass_factor * store.node_count() + 8;
    let mut visited: AHashSet<String> = AHashSet::new();
    let mut recorded: Vec<Layer> = Vec::new();
    let mut passes = 0usize;
    let mut stagnant = 0usize;

    loop {
        if passes >= ceiling {
            return Err(ReweaveError::SchedulingDeadlock {
                direction: "backward",
                passes_run: passes,
                ceiling,
            });
        }
        passes += 1;

        let layer = discover_backward_layer(store, cyclic, &visited)?;
        if layer.is_empty() {
            stagnant += 1;
            if stagnant >= 2 {
                break;
            }
            continue;
        }
        stagnant = 0;

        for op in &layer {
            visited.insert(op.sink.clone());
        }
        execute_backward_layer(store, &layer, time_step, pool, &fan_in)?;
        stats.layers += 1;
        stats.operations += layer.len();
        if opts.cache_plan {
            recorded.push(layer);
        }
    }

    if opts.cache_plan {
        cache.backward = Some(LayerPlan { layers: recorded });
    }

    stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if stats.elapsed_ms > 20.0 {
        warn!(
            "slow backward pass: {:.2}ms for {} operations in {} layers",
            stats.elapsed_ms, stats.operations, stats.layers
        );
    }
    Ok(stats)
}

/// Per-operation error vector, collected then applied after the join.
struct OpResult {
    error: Vec<f32>,
}

fn execute_backward_layer(
    store: &mut GraphStore,
    layer: &Layer,
    time_step: usize,
    pool: Option<&ThreadPool>,
    fan_in: &AHashMap<String, usize>,
) -> Result<()> {
    let results: Vec<Result<OpResult>> = {
        let store_ref: &GraphStore = store;
        match pool {
            Some(pool) => pool.install(|| {
                layer
                    .par_iter()
                    .map(|op| compute_backward_op(store_ref, op, time_step, fan_in))
                    .collect()
            }),
            None => layer
                .iter()
                .map(|op| compute_backward_op(store_ref, op, time_step, fan_in))
                .collect(),
        }
    };

    for (op, result) in layer.iter().zip(results) {
        let result = result?;
        let node = store.node_mut(&op.sink)?;
        for b in 0..result.error.len() {
            node.error[[b, time_step]] = result.error[b];
        }
        node.status = NodeStatus::Corrected;
    }
    Ok(())
}

/// Accumulate downstream error contributions for one node at one slot.
///
/// Each argument's contribution is governed by the *downstream* node's
/// integration strategy — the partial of that sink's net input with respect
/// to this node's output — then the sum is scaled by this node's own
/// activation gradient.
fn compute_backward_op(
    store: &GraphStore,
    op: &Operation,
    time_step: usize,
    fan_in: &AHashMap<String, usize>,
) -> Result<OpResult> {
    let node = store.node(&op.sink)?;
    let batch = node.batch_size();

    let mut resolved = Vec::with_capacity(op.args.len());
    for arg in &op.args {
        let downstream = store.node(&arg.source)?;
        let weight = store.weight(&arg.weight)?.value;
        let downstream_fan_in = fan_in.get(&arg.source).copied().unwrap_or(1);
        resolved.push((downstream, weight, arg.offset as isize, downstream_fan_in));
    }

    let mut result = OpResult {
        error: vec![0.0; batch],
    };
    for b in 0..batch {
        let mut accumulated = 0.0f32;
        for (downstream, weight, offset, downstream_fan_in) in &resolved {
            let col = time_step as isize + offset;
            let term = ErrorTerm {
                sink_error: slot_read(&downstream.error, b, col),
                weight: *weight,
                source_output: node.output[[b, time_step]],
                sink_input: slot_read(&downstream.input, b, col),
                fan_in: *downstream_fan_in,
                dt: slot_read(&downstream.dt, b, col),
            };
            accumulated += downstream.integration.error_contribution(&term);
        }
        result.error[b] = accumulated * node.derivative[[b, time_step]];
    }
    Ok(result)
}
