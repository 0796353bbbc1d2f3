// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Weight Gradient Aggregator / Updater
//!
//! Sums gradient contributions per weight — across every completed time
//! step in `[0, steps]` and across every link sharing the weight name —
//! then hands each weight's single aggregated scalar to its solver.
//!
//! Weight values are read-only while contributions are gathered; mutation
//! happens only in the final single-threaded application loop, so shared
//! weights never race.

use ahash::AHashMap;
use tracing::debug;

use reweave_graph::error::Result;
use reweave_graph::node::NodeStatus;
use reweave_graph::store::GraphStore;
use reweave_graph::strategies::WeightGradTerm;

use crate::cycles::CyclicPairs;
use crate::plan::slot_read;

/// Aggregate and apply gradients for every link whose sink is corrected.
/// `filter`, when present, restricts the update to the named weights.
/// Returns the number of weights updated.
pub fn update_weights(
    store: &mut GraphStore,
    cyclic: &CyclicPairs,
    steps: usize,
    filter: Option<&[String]>,
) -> Result<usize> {
    let (batch, memory) = store.batch_and_memory_sizes()?;
    let fan_in = store.fan_in_map();

    let mut gradients: AHashMap<String, f32> = AHashMap::new();

    for link in store.links() {
        if let Some(allowed) = filter {
            if !allowed.iter().any(|n| n == &link.weight) {
                continue;
            }
        }
        // Dangling relations contribute nothing; pruning owns the repair.
        let (Ok(source), Ok(sink)) = (store.node(&link.source), store.node(&link.sink)) else {
            continue;
        };
        if sink.status != NodeStatus::Corrected {
            continue;
        }
        let weight_value = store.weight(&link.weight)?.value;

        // A feedback link's forward read was one slot older; the gradient
        // pairs the sink's error with the same displaced source slot.
        let offset: isize = if cyclic.is_registered(source.id, sink.id) {
            1
        } else {
            0
        };
        let link_fan_in = fan_in.get(&link.sink).copied().unwrap_or(1);

        let mut contribution = 0.0f32;
        for step in 0..=steps.min(memory) {
            let source_col = step as isize + offset;
            for b in 0..batch {
                let term = WeightGradTerm {
                    sink_error: sink.error[[b, step]],
                    source_output: slot_read(&source.output, b, source_col),
                    weight: weight_value,
                    source_input: slot_read(&source.input, b, source_col),
                    sink_input: sink.input[[b, step]],
                    fan_in: link_fan_in,
                    dt: sink.dt[[b, step]],
                };
                contribution += sink.integration.weight_gradient(&term);
            }
        }
        *gradients.entry(link.weight.clone()).or_insert(0.0) += contribution;
    }

    // Deterministic application order; the solver may carry state.
    let mut names: Vec<String> = gradients.keys().cloned().collect();
    names.sort_unstable();

    let mut updated = 0usize;
    for name in names {
        let gradient = gradients[&name];
        let weight = store.weight_mut(&name)?;
        let mut value = weight.value;
        let mut solver = weight.solver;
        solver.apply(&mut value, gradient);
        weight.value = value;
        weight.solver = solver;
        updated += 1;
    }

    debug!(updated, "weight update applied");
    Ok(updated)
}
