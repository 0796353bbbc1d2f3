// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Graph Store
//!
//! Authoritative node/link/weight collections with referential-integrity
//! pruning. The store is deliberately dumb about execution: it validates
//! names, hands out ids, keeps the cached input/output lists current, and
//! repairs dangling references by fixed-point pruning. Scheduling and status
//! transitions belong to the engine crate.

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::error::{Result, ReweaveError};
use crate::link::Link;
use crate::node::{Node, NodeId, NodeRole, NodeStatus};
use crate::weight::Weight;

/// Owning container for one network's graph description.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: AHashMap<String, Node>,
    links: AHashMap<String, Link>,
    weights: AHashMap<String, Weight>,

    /// Cached name lists, maintained on add/remove.
    input_nodes: Vec<String>,
    output_nodes: Vec<String>,

    next_node_id: u32,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- additions -------------------------------------------------------

    /// Insert a node. A duplicate name is rejected, logged, and otherwise
    /// ignored (non-fatal); returns whether the node was stored.
    pub fn add_node(&mut self, mut node: Node) -> bool {
        if self.nodes.contains_key(&node.name) {
            warn!("duplicate node name rejected: {}", node.name);
            return false;
        }
        node.id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        match node.role {
            NodeRole::Input => self.input_nodes.push(node.name.clone()),
            NodeRole::Output => self.output_nodes.push(node.name.clone()),
            _ => {}
        }
        self.nodes.insert(node.name.clone(), node);
        true
    }

    /// Insert a link. Duplicate names are rejected and logged, non-fatal.
    /// Endpoints are not validated here; `prune_links` repairs danglers.
    pub fn add_link(&mut self, link: Link) -> bool {
        if self.links.contains_key(&link.name) {
            warn!("duplicate link name rejected: {}", link.name);
            return false;
        }
        self.links.insert(link.name.clone(), link);
        true
    }

    /// Insert a weight. Duplicate names are rejected and logged, non-fatal.
    pub fn add_weight(&mut self, weight: Weight) -> bool {
        if self.weights.contains_key(&weight.name) {
            warn!("duplicate weight name rejected: {}", weight.name);
            return false;
        }
        self.weights.insert(weight.name.clone(), weight);
        true
    }

    // --- removals --------------------------------------------------------

    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        let node = self.nodes.remove(name)?;
        self.input_nodes.retain(|n| n != name);
        self.output_nodes.retain(|n| n != name);
        Some(node)
    }

    pub fn remove_link(&mut self, name: &str) -> Option<Link> {
        self.links.remove(name)
    }

    pub fn remove_weight(&mut self, name: &str) -> Option<Weight> {
        self.weights.remove(name)
    }

    // --- pruning ---------------------------------------------------------

    /// Remove links whose endpoints or weight no longer resolve. Returns the
    /// number removed.
    pub fn prune_links(&mut self) -> usize {
        let nodes = &self.nodes;
        let weights = &self.weights;
        let dangling: Vec<String> = self
            .links
            .values()
            .filter(|l| {
                !nodes.contains_key(&l.source)
                    || !nodes.contains_key(&l.sink)
                    || !weights.contains_key(&l.weight)
            })
            .map(|l| l.name.clone())
            .collect();
        for name in &dangling {
            debug!("pruning dangling link: {}", name);
            self.links.remove(name);
        }
        dangling.len()
    }

    /// Remove nodes referenced by no remaining link. Returns the number
    /// removed.
    pub fn prune_nodes(&mut self) -> usize {
        let mut referenced: Vec<&String> = Vec::with_capacity(self.links.len() * 2);
        for link in self.links.values() {
            referenced.push(&link.source);
            referenced.push(&link.sink);
        }
        let orphaned: Vec<String> = self
            .nodes
            .keys()
            .filter(|name| !referenced.iter().any(|r| r == name))
            .cloned()
            .collect();
        for name in &orphaned {
            debug!("pruning orphaned node: {}", name);
            self.remove_node(name);
        }
        orphaned.len()
    }

    /// Remove weights referenced by no remaining link. Returns the number
    /// removed.
    pub fn prune_weights(&mut self) -> usize {
        let orphaned: Vec<String> = self
            .weights
            .keys()
            .filter(|name| !self.links.values().any(|l| &l.weight == *name))
            .cloned()
            .collect();
        for name in &orphaned {
            debug!("pruning orphaned weight: {}", name);
            self.weights.remove(name);
        }
        orphaned.len()
    }

    /// Fixed-point removal of dangling entities, capped at `max_iters`
    /// rounds. Returns the total number of entities removed.
    pub fn prune_model(&mut self, max_iters: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_iters {
            let removed = self.prune_links() + self.prune_nodes() + self.prune_weights();
            total += removed;
            if removed == 0 {
                break;
            }
        }
        total
    }

    // --- lookups ---------------------------------------------------------

    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| ReweaveError::NodeNotFound(name.to_string()))
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| ReweaveError::NodeNotFound(name.to_string()))
    }

    pub fn weight(&self, name: &str) -> Result<&Weight> {
        self.weights
            .get(name)
            .ok_or_else(|| ReweaveError::WeightNotFound(name.to_string()))
    }

    pub fn weight_mut(&mut self, name: &str) -> Result<&mut Weight> {
        self.weights
            .get_mut(name)
            .ok_or_else(|| ReweaveError::WeightNotFound(name.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn weights(&self) -> impl Iterator<Item = &Weight> {
        self.weights.values()
    }

    pub fn weights_mut(&mut self) -> impl Iterator<Item = &mut Weight> {
        self.weights.values_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }

    /// Cached input node names, in insertion order.
    pub fn input_nodes(&self) -> &[String] {
        &self.input_nodes
    }

    /// Cached output node names, in insertion order.
    pub fn output_nodes(&self) -> &[String] {
        &self.output_nodes
    }

    /// Incoming link count per sink name. The executors resolve this once
    /// per pass rather than per argument.
    pub fn fan_in_map(&self) -> AHashMap<String, usize> {
        let mut map: AHashMap<String, usize> = AHashMap::with_capacity(self.nodes.len());
        for link in self.links.values() {
            *map.entry(link.sink.clone()).or_insert(0) += 1;
        }
        map
    }

    // --- lifecycle -------------------------------------------------------

    /// (Re)allocate every node's buffers to `[batch, memory + 1]` and reset
    /// statuses for a fresh window.
    pub fn init_nodes(&mut self, batch: usize, memory: usize) {
        for node in self.nodes.values_mut() {
            node.init_buffers(batch, memory);
        }
    }

    /// Run every weight's init strategy (also clears solver state).
    pub fn init_weights(&mut self) {
        for weight in self.weights.values_mut() {
            weight.initialize();
        }
    }

    /// Batch and memory dimensions, inferred from any node. All node tensors
    /// in a graph share them by construction.
    pub fn batch_and_memory_sizes(&self) -> Result<(usize, usize)> {
        let node = self
            .nodes
            .values()
            .next()
            .ok_or(ReweaveError::UninitializedGraph)?;
        let window = node.window_len();
        if window == 0 {
            return Err(ReweaveError::UninitializedGraph);
        }
        Ok((node.batch_size(), window - 1))
    }

    /// Reset every node's non-input status for the next window position:
    /// bias back to `Activated`, everything else to `Initialized`. Inputs
    /// are pinned (and activated) by the window driver afterwards.
    pub fn reset_statuses_for_forward(&mut self) {
        for node in self.nodes.values_mut() {
            if node.status == NodeStatus::Deactivated {
                continue;
            }
            node.status = match node.role {
                NodeRole::Bias => NodeStatus::Activated,
                NodeRole::Input => node.status,
                _ => NodeStatus::Initialized,
            };
        }
    }

    /// Between backward window positions: corrected non-output nodes return
    /// to `Activated` so the next slot can correct them again. Outputs keep
    /// the error injected for every slot by the aggregator.
    pub fn reset_statuses_for_backward(&mut self) {
        for node in self.nodes.values_mut() {
            if node.status == NodeStatus::Corrected && node.role != NodeRole::Output {
                node.status = NodeStatus::Activated;
            }
        }
    }

    /// Zero all time buffers without reallocating; statuses reset as in
    /// `init_buffers`.
    pub fn reset_time(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_time();
        }
    }
}
