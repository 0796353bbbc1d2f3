// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Layer Scheduler
//!
//! Discovers, per pass, the set of nodes whose dependencies are satisfied —
//! without any precomputed topological order. Readiness is read off the
//! nodes' lifecycle statuses, and the feedback-pair registry is the single
//! exception to the "both endpoints ready" rule.
//!
//! Forward discovery builds three candidate sets per sink:
//! (a) plain-ready arguments from activated non-bias sources;
//! (b) bias arguments, appended only to sinks that already appear in (a);
//! (c) delayed arguments from not-yet-ready sources at a +1 slot offset.
//! A sink is admitted only if *every* (c) argument is a registered feedback
//! edge; one unconfirmed argument drops the whole sink from the pass.
//! Partial admission is disallowed — this is what keeps a node from running
//! before its genuine non-feedback dependencies exist. The same rule can
//! defer a legitimately ready node when several independent cycles share it;
//! that behavior is intentional and pinned by tests.
//!
//! Backward discovery mirrors this with the arrows flipped: a source
//! becomes a candidate once some sink of its is corrected while the source
//! itself is still merely activated. Sinks that can never correct
//! (deactivated dead ends) contribute nothing and do not block admission;
//! uncorrected sinks must certify as feedback and are read one slot toward
//! the present.

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use reweave_graph::error::Result;
use reweave_graph::node::{NodeId, NodeRole, NodeStatus};
use reweave_graph::store::GraphStore;

use crate::cycles::CyclicPairs;
use crate::plan::{Layer, OpArg, Operation};

/// Candidate argument lists for one written node, gathered link by link.
#[derive(Default)]
struct Candidate {
    plain: Vec<OpArg>,
    bias: Vec<OpArg>,
    delayed: Vec<(OpArg, NodeId)>,
}

/// Discover the next forward layer: every sink whose dependencies are
/// satisfied under the plain/bias/feedback rules, as one `Operation` each.
/// An empty layer means forward scheduling has terminated.
pub fn discover_forward_layer(store: &GraphStore, cyclic: &CyclicPairs) -> Result<Layer> {
    let mut candidates: AHashMap<String, Candidate> = AHashMap::new();

    for link in store.links() {
        let (Ok(src), Ok(snk)) = (store.node(&link.source), store.node(&link.sink)) else {
            // Dangling relation; the store's pruning owns the repair.
            debug!(link = %link.name, "skipping dangling link in forward discovery");
            continue;
        };
        if snk.status != NodeStatus::Initialized {
            continue;
        }
        if matches!(snk.role, NodeRole::Input | NodeRole::Bias) {
            continue; // never scheduled; inputs are pinned, bias is constant
        }

        let entry = candidates.entry(snk.name.clone()).or_default();
        if src.role == NodeRole::Bias {
            entry.bias.push(OpArg {
                source: link.source.clone(),
                weight: link.weight.clone(),
                offset: 0,
            });
            continue;
        }
        match src.status {
            NodeStatus::Activated => entry.plain.push(OpArg {
                source: link.source.clone(),
                weight: link.weight.clone(),
                offset: 0,
            }),
            // Relaxed readiness: the source may be merely initialized, but
            // only a certified feedback edge may satisfy it, one slot back.
            NodeStatus::Initialized | NodeStatus::Corrected => entry.delayed.push((
                OpArg {
                    source: link.source.clone(),
                    weight: link.weight.clone(),
                    offset: 1,
                },
                src.id,
            )),
            NodeStatus::Deactivated => {}
        }
    }

    let mut layer: Layer = Vec::new();
    for (sink_name, cand) in candidates {
        // Sinks enter the pass through the plain-ready set only.
        if cand.plain.is_empty() {
            continue;
        }
        let snk = store.node(&sink_name)?;
        if cand
            .delayed
            .iter()
            .any(|(_, src_id)| !cyclic.is_registered(*src_id, snk.id))
        {
            debug!(sink = %sink_name, "sink dropped from pass: unconfirmed feedback argument");
            continue;
        }

        let mut args = cand.plain;
        args.extend(cand.bias);
        args.extend(cand.delayed.into_iter().map(|(arg, _)| arg));
        sort_args(&mut args);

        layer.push(Operation {
            sink: sink_name,
            integration: snk.integration,
            activation: snk.activation,
            args,
        });
    }

    sort_layer(&mut layer);
    Ok(layer)
}

/// Discover the next backward ("uncorrected") layer. The returned
/// operations write error into `sink` (the node being corrected); each
/// argument names a downstream node whose finalized error feeds it.
pub fn discover_backward_layer(
    store: &GraphStore,
    cyclic: &CyclicPairs,
    visited: &AHashSet<String>,
) -> Result<Layer> {
    let mut candidates: AHashMap<String, Candidate> = AHashMap::new();

    for link in store.links() {
        let (Ok(src), Ok(snk)) = (store.node(&link.source), store.node(&link.sink)) else {
            debug!(link = %link.name, "skipping dangling link in backward discovery");
            continue;
        };
        if src.status != NodeStatus::Activated {
            continue;
        }
        if src.role == NodeRole::Bias {
            continue; // bias error has no consumer
        }
        if visited.contains(&src.name) {
            continue;
        }

        let entry = candidates.entry(src.name.clone()).or_default();
        match snk.status {
            NodeStatus::Corrected => entry.plain.push(OpArg {
                source: link.sink.clone(),
                weight: link.weight.clone(),
                offset: 0,
            }),
            // Dead end: no error will ever materialize there.
            NodeStatus::Deactivated => {}
            // The sink has not corrected yet; only a certified feedback edge
            // may stand in, read one slot toward the present.
            _ => entry.delayed.push((
                OpArg {
                    source: link.sink.clone(),
                    weight: link.weight.clone(),
                    offset: -1,
                },
                snk.id,
            )),
        }
    }

    let mut layer: Layer = Vec::new();
    for (source_name, cand) in candidates {
        if cand.plain.is_empty() {
            continue;
        }
        let src = store.node(&source_name)?;
        if cand
            .delayed
            .iter()
            .any(|(_, snk_id)| !cyclic.is_registered(src.id, *snk_id))
        {
            debug!(source = %source_name, "source dropped from pass: unconfirmed feedback argument");
            continue;
        }

        let mut args = cand.plain;
        args.extend(cand.delayed.into_iter().map(|(arg, _)| arg));
        sort_args(&mut args);

        layer.push(Operation {
            sink: source_name,
            integration: src.integration,
            activation: src.activation,
            args,
        });
    }

    sort_layer(&mut layer);
    Ok(layer)
}

/// Deterministic argument order: by read node, then weight name.
fn sort_args(args: &mut [OpArg]) {
    args.sort_by(|a, b| {
        (a.source.as_str(), a.weight.as_str()).cmp(&(b.source.as_str(), b.weight.as_str()))
    });
}

/// Group identically-shaped operations together (strategy pair first), then
/// order by name so repeated discoveries are bit-reproducible.
fn sort_layer(layer: &mut Layer) {
    layer.sort_by(|a, b| {
        (a.integration, a.activation, a.sink.as_str()).cmp(&(
            b.integration,
            b.activation,
            b.sink.as_str(),
        ))
    });
}
