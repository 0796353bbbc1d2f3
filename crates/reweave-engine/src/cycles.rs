// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Cycle Detector
//!
//! Finds every edge that closes an elementary circuit and publishes the
//! result as the feedback-pair registry — the scheduler's only sanctioned
//! way to admit a dependency whose source is not yet ready.
//!
//! The graph is projected onto a contiguous dense-id space with bias edges
//! excluded (bias nodes never participate in cycles by construction). A
//! Tarjan SCC pass narrows the search, then a Johnson-style blocked-set
//! enumeration walks the elementary circuits of each component. The whole
//! search is bounded by an operation ceiling so a pathologically dense
//! graph aborts instead of spinning.

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use reweave_graph::error::{Result, ReweaveError};
use reweave_graph::node::{NodeId, NodeRole};
use reweave_graph::store::GraphStore;

/// Registry of certified feedback edges, keyed by stable node ids.
///
/// Pairs are stored with the delayed logical source first; when the sink of
/// a discovered closing edge has role `Recursive` the pair is stored
/// reversed, canonicalizing the recursive endpoint as that source. A
/// membership query therefore accepts either orientation — the registry
/// certifies the edge, the orientation records which endpoint carries the
/// delay.
#[derive(Debug, Clone, Default)]
pub struct CyclicPairs {
    pairs: AHashSet<(NodeId, NodeId)>,
}

impl CyclicPairs {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Exact stored-orientation membership.
    pub fn contains(&self, pair: (NodeId, NodeId)) -> bool {
        self.pairs.contains(&pair)
    }

    /// Whether the edge between `a` and `b` is a certified feedback edge,
    /// regardless of stored orientation.
    pub fn is_registered(&self, a: NodeId, b: NodeId) -> bool {
        self.pairs.contains(&(a, b)) || self.pairs.contains(&(b, a))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NodeId, NodeId)> {
        self.pairs.iter()
    }

    fn insert(&mut self, pair: (NodeId, NodeId)) {
        self.pairs.insert(pair);
    }
}

/// Enumerate feedback edges over the bias-free projection of the graph.
///
/// The returned registry entirely replaces any previously cached set; rerun
/// whenever topology changes.
pub fn find_cycles(store: &GraphStore, op_ceiling: usize) -> Result<CyclicPairs> {
    // Dense projection, name-sorted so dense ids are reproducible.
    let mut dense: Vec<_> = store.nodes().filter(|n| n.role != NodeRole::Bias).collect();
    dense.sort_by(|a, b| a.name.cmp(&b.name));

    let index: AHashMap<&str, usize> = dense
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name.as_str(), i))
        .collect();

    let n = dense.len();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for link in store.links() {
        // Bias endpoints and dangling references simply do not project.
        let (Some(&u), Some(&v)) = (index.get(link.source.as_str()), index.get(link.sink.as_str()))
        else {
            continue;
        };
        if !adj[u].contains(&v) {
            adj[u].push(v);
        }
    }
    for row in adj.iter_mut() {
        row.sort_unstable();
    }

    let scc = strongly_connected_components(&adj);

    let mut search = CircuitSearch {
        adj: &adj,
        allowed: vec![false; n],
        blocked: vec![false; n],
        block_map: vec![Vec::new(); n],
        start: 0,
        ops: 0,
        ceiling: op_ceiling,
        closing: Vec::new(),
    };

    for start in 0..n {
        // Circuits live entirely inside one SCC; restricting to vertices at
        // or above `start` gives each circuit exactly one enumeration, from
        // its least dense id.
        let component = scc[start];
        let members: Vec<usize> = (start..n).filter(|&v| scc[v] == component).collect();
        let has_self_loop = adj[start].contains(&start);
        if members.len() < 2 && !has_self_loop {
            continue;
        }

        search.allowed.iter_mut().for_each(|a| *a = false);
        for &v in &members {
            search.allowed[v] = true;
        }
        search.blocked.iter_mut().for_each(|b| *b = false);
        search.block_map.iter_mut().for_each(|m| m.clear());
        search.start = start;
        search.circuit(start)?;
    }

    let mut pairs = CyclicPairs::empty();
    for (src_dense, snk_dense) in search.closing {
        let src = dense[src_dense];
        let snk = dense[snk_dense];
        let pair = if snk.role == NodeRole::Recursive {
            (snk.id, src.id)
        } else {
            (src.id, snk.id)
        };
        pairs.insert(pair);
    }

    debug!(
        feedback_edges = pairs.len(),
        nodes = n,
        "cycle detection complete"
    );
    Ok(pairs)
}

/// Johnson-style blocked-set circuit enumeration, recording only the edge
/// that closes each elementary circuit.
struct CircuitSearch<'a> {
    adj: &'a [Vec<usize>],
    allowed: Vec<bool>,
    blocked: Vec<bool>,
    block_map: Vec<Vec<usize>>,
    start: usize,
    ops: usize,
    ceiling: usize,
    closing: Vec<(usize, usize)>,
}

impl CircuitSearch<'_> {
    fn unblock(&mut self, v: usize) {
        self.blocked[v] = false;
        let pending = core::mem::take(&mut self.block_map[v]);
        for w in pending {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }

    fn circuit(&mut self, v: usize) -> Result<bool> {
        self.ops += 1;
        if self.ops > self.ceiling {
            return Err(ReweaveError::IterationCeiling {
                what: "cycle enumeration",
                limit: self.ceiling,
            });
        }

        let mut found = false;
        self.blocked[v] = true;

        for i in 0..self.adj[v].len() {
            let w = self.adj[v][i];
            if !self.allowed[w] {
                continue;
            }
            if w == self.start {
                self.closing.push((v, self.start));
                found = true;
            } else if !self.blocked[w] && self.circuit(w)? {
                found = true;
            }
        }

        if found {
            self.unblock(v);
        } else {
            for i in 0..self.adj[v].len() {
                let w = self.adj[v][i];
                if self.allowed[w] && !self.block_map[w].contains(&v) {
                    self.block_map[w].push(v);
                }
            }
        }
        Ok(found)
    }
}

/// Iterative Tarjan; returns a component id per dense vertex.
fn strongly_connected_components(adj: &[Vec<usize>]) -> Vec<usize> {
    let n = adj.len();
    let mut visit_index = vec![usize::MAX; n];
    let mut lowlink = vec![usize::MAX; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut scc_id = vec![usize::MAX; n];
    let mut next_index = 0usize;
    let mut scc_count = 0usize;

    for root in 0..n {
        if visit_index[root] != usize::MAX {
            continue;
        }
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 == 0 {
                visit_index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if frame.1 < adj[v].len() {
                let w = adj[v][frame.1];
                frame.1 += 1;
                if visit_index[w] == usize::MAX {
                    call.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(visit_index[w]);
                }
            } else {
                if lowlink[v] == visit_index[v] {
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        scc_id[w] = scc_count;
                        if w == v {
                            break;
                        }
                    }
                    scc_count += 1;
                }
                call.pop();
                if let Some(parent) = call.last() {
                    let p = parent.0;
                    lowlink[p] = lowlink[p].min(lowlink[v]);
                }
            }
        }
    }
    scc_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_graph::link::Link;
    use reweave_graph::node::Node;
    use reweave_graph::strategies::{ActivationKind, IntegrationKind};
    use reweave_graph::weight::{SolverKind, Weight, WeightInit};

    fn node(name: &str, role: NodeRole) -> Node {
        Node::new(
            name,
            role,
            ActivationKind::Identity,
            IntegrationKind::WeightedSum,
        )
    }

    fn graph(nodes: &[(&str, NodeRole)], edges: &[(&str, &str)]) -> GraphStore {
        let mut store = GraphStore::new();
        for (name, role) in nodes {
            store.add_node(node(name, *role));
        }
        store.add_weight(Weight::new("w", WeightInit::Constant(1.0), SolverKind::Sgd {
            learning_rate: 0.1,
        }));
        for (i, (src, snk)) in edges.iter().enumerate() {
            store.add_link(Link::new(format!("l{}", i), *src, *snk, "w"));
        }
        store
    }

    #[test]
    fn test_acyclic_graph_yields_empty_registry() {
        let store = graph(
            &[
                ("a", NodeRole::Input),
                ("b", NodeRole::Hidden),
                ("c", NodeRole::Output),
            ],
            &[("a", "b"), ("b", "c"), ("a", "c")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_self_loop_reports_exactly_itself() {
        let store = graph(
            &[("a", NodeRole::Hidden)],
            &[("a", "a")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        assert_eq!(pairs.len(), 1);
        let id = store.node("a").unwrap().id;
        assert!(pairs.contains((id, id)));
    }

    #[test]
    fn test_two_cycle_reports_closing_edge() {
        let store = graph(
            &[("a", NodeRole::Hidden), ("b", NodeRole::Hidden)],
            &[("a", "b"), ("b", "a")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        assert_eq!(pairs.len(), 1);
        let a = store.node("a").unwrap().id;
        let b = store.node("b").unwrap().id;
        assert!(pairs.is_registered(a, b));
        assert!(pairs.is_registered(b, a));
    }

    #[test]
    fn test_recursive_sink_is_canonicalized_as_delayed_source() {
        // Circuit enumeration starts at the least name, "a", so the closing
        // edge is (r -> a); with "a" recursive the stored pair flips.
        let store = graph(
            &[("a", NodeRole::Recursive), ("r", NodeRole::Hidden)],
            &[("a", "r"), ("r", "a")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        let a = store.node("a").unwrap().id;
        let r = store.node("r").unwrap().id;
        assert!(pairs.contains((a, r)));
        assert!(!pairs.contains((r, a)));
    }

    #[test]
    fn test_bias_edges_are_excluded() {
        let store = graph(
            &[("a", NodeRole::Hidden), ("bias", NodeRole::Bias)],
            &[("a", "bias"), ("bias", "a")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_two_independent_cycles_through_shared_node() {
        // a -> b -> a and a -> c -> a share vertex a.
        let store = graph(
            &[
                ("a", NodeRole::Hidden),
                ("b", NodeRole::Hidden),
                ("c", NodeRole::Hidden),
            ],
            &[("a", "b"), ("b", "a"), ("a", "c"), ("c", "a")],
        );
        let pairs = find_cycles(&store, 10_000).unwrap();
        let a = store.node("a").unwrap().id;
        let b = store.node("b").unwrap().id;
        let c = store.node("c").unwrap().id;
        assert_eq!(pairs.len(), 2);
        assert!(pairs.is_registered(b, a));
        assert!(pairs.is_registered(c, a));
    }

    #[test]
    fn test_operation_ceiling_aborts_dense_search() {
        // Complete digraph on 8 vertices: factorially many circuits.
        let names: Vec<String> = (0..8).map(|i| format!("n{}", i)).collect();
        let mut store = GraphStore::new();
        for name in &names {
            store.add_node(node(name, NodeRole::Hidden));
        }
        store.add_weight(Weight::new("w", WeightInit::Constant(1.0), SolverKind::Sgd {
            learning_rate: 0.1,
        }));
        let mut k = 0;
        for a in &names {
            for b in &names {
                if a != b {
                    store.add_link(Link::new(format!("l{}", k), a.clone(), b.clone(), "w"));
                    k += 1;
                }
            }
        }
        let err = find_cycles(&store, 500).unwrap_err();
        assert!(matches!(err, ReweaveError::IterationCeiling { .. }));
    }
}
