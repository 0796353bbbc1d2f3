// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Forward Executor
//!
//! Executes discovered layers: net input via the sink's integration
//! strategy, then activation and activation-gradient, written into the
//! sink's time slot. Layers are strictly ordered; operations within a layer
//! fan out across a bounded worker pool and are joined before any node
//! buffer is written, so a node's buffers only ever see one writer.

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use ahash::AHashMap;

use reweave_graph::error::{Result, ReweaveError};
use reweave_graph::node::NodeStatus;
use reweave_graph::store::GraphStore;

use crate::cycles::CyclicPairs;
use crate::plan::{slot_read, Layer, LayerPlan, Operation, PlanCache};
use crate::scheduler::discover_forward_layer;
use crate::{EngineSettings, PassOptions, PassStats};

/// Per-operation result, collected across the worker pool and applied
/// serially after the join barrier.
struct OpResult {
    net: Vec<f32>,
    out: Vec<f32>,
    deriv: Vec<f32>,
}

/// Run one full forward pass at `time_step`: discover (or replay) layers
/// until the pass set is empty.
pub fn forward_pass(
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
            what: "forward time step",
            expected: format!("<= {}", memory),
            actual: time_step.to_string(),
        });
    }

    let fan_in = store.fan_in_map();
    let mut stats = PassStats::default();

    if opts.use_cached_plan {
        if let Some(plan) = cache.forward.clone() {
            for layer in &plan.layers {
                execute_forward_layer(store, layer, time_step, pool, &fan_in)?;
                stats.layers += 1;
                stats.operations += layer.len();
            }
            stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            return Ok(stats);
        }
        debug!("no cached forward plan; falling back to discovery");
    }

    let ceiling = settings.max_pass_factor * store.node_count() + 8;
    let mut recorded: Vec<Layer> = Vec::new();
    loop {
        if stats.layers >= ceiling {
            return Err(ReweaveError::SchedulingDeadlock {
                direction: "forward",
                passes_run: stats.layers,
                ceiling,
            });
        }
        let layer = discover_forward_layer(store, cyclic)?;
        if layer.is_empty() {
            break;
        }
        execute_forward_layer(store, &layer, time_step, pool, &fan_in)?;
        stats.layers += 1;
        stats.operations += layer.len();
        if opts.cache_plan {
            recorded.push(layer);
        }
    }

    if opts.cache_plan {
        cache.forward = Some(LayerPlan { layers: recorded });
    }

    stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if stats.elapsed_ms > 20.0 {
        warn!(
            "slow forward pass: {:.2}ms for {} operations in {} layers",
            stats.elapsed_ms, stats.operations, stats.layers
        );
    }
    Ok(stats)
}

/// Fan one layer out, join, then write results back serially.
fn execute_forward_layer(
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
                    .map(|op| compute_forward_op(store_ref, op, time_step, fan_in))
                    .collect()
            }),
            None => layer
                .iter()
                .map(|op| compute_forward_op(store_ref, op, time_step, fan_in))
                .collect(),
        }
    };

    for (op, result) in layer.iter().zip(results) {
        let result = result?;
        let node = store.node_mut(&op.sink)?;
        for b in 0..result.net.len() {
            node.input[[b, time_step]] = result.net[b];
            node.output[[b, time_step]] = result.out[b];
            node.derivative[[b, time_step]] = result.deriv[b];
            // A recomputed slot has no error yet; stale values from a
            // previous window must not leak into the next aggregation.
            node.error[[b, time_step]] = 0.0;
        }
        node.status = NodeStatus::Activated;
    }
    Ok(())
}

/// Compute one sink: integrate weighted source reads, activate, record the
/// activation gradient. Read-only against the store.
fn compute_forward_op(
    store: &GraphStore,
    op: &Operation,
    time_step: usize,
    fan_in: &AHashMap<String, usize>,
) -> Result<OpResult> {
    let sink = store.node(&op.sink)?;
    let batch = sink.batch_size();
    let fan_in = fan_in.get(&op.sink).copied().unwrap_or(op.args.len());

    // Resolve arguments once per operation, not per batch element.
    let mut resolved = Vec::with_capacity(op.args.len());
    for arg in &op.args {
        let source = store.node(&arg.source)?;
        let weight = store.weight(&arg.weight)?.value;
        resolved.push((source, weight, arg.offset as isize));
    }

    let mut result = OpResult {
        net: vec![0.0; batch],
        out: vec![0.0; batch],
        deriv: vec![0.0; batch],
    };
    let mut terms = vec![0.0f32; resolved.len()];

    for b in 0..batch {
        for (i, (source, weight, offset)) in resolved.iter().enumerate() {
            terms[i] = weight * slot_read(&source.output, b, time_step as isize + offset);
        }
        let dt = sink.dt[[b, time_step]];
        let net = op.integration.net_input(&terms, fan_in, dt);
        result.net[b] = net;
        result.out[b] = op.activation.apply(net);
        result.deriv[b] = op.activation.gradient(net);
    }
    Ok(result)
}
