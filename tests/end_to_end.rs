// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Umbrella-level integration: configuration feeding engine settings, a
//! full training loop over the re-exported surface, and failure containment
//! across sibling networks.

use std::io::Write;

use reweave::engine::Network;
use reweave::graph::node::{Node, NodeRole};
use reweave::graph::strategies::{ActivationKind, IntegrationKind, LossKind};
use reweave::graph::weight::{SolverKind, Weight, WeightInit};
use reweave::graph::{GraphStore, Link};
use reweave::ndarray::{Array2, Array3};
use reweave::{engine_settings_from_config, PassOptions};

fn identity_chain() -> GraphStore {
    let mut store = GraphStore::new();
    store.add_node(Node::new(
        "in",
        NodeRole::Input,
        ActivationKind::Identity,
        IntegrationKind::WeightedSum,
    ));
    store.add_node(Node::new(
        "out",
        NodeRole::Output,
        ActivationKind::Identity,
        IntegrationKind::WeightedSum,
    ));
    store.add_weight(Weight::new("w", WeightInit::Zero, SolverKind::Sgd {
        learning_rate: 0.1,
    }));
    store.add_link(Link::new("l", "in", "out", "w"));
    store
}

fn train_epoch(network: &mut Network, target: f32) -> f32 {
    let values = Array3::from_elem((1, 1, 1), 1.0);
    let dt = Array2::<f32>::ones((1, 1));
    network
        .fptt(1, &values, &["in".to_string()], &dt, &PassOptions::default())
        .unwrap();
    let expected = Array3::from_elem((1, 1, 1), target);
    let losses = network
        .cett(&expected, &["out".to_string()], 1, LossKind::SquaredError)
        .unwrap();
    network.tbptt(1, &PassOptions::default()).unwrap();
    network.update_weights(1, None).unwrap();
    losses[[0, 0]]
}

#[test]
fn test_training_loop_converges_on_identity_target() {
    let mut network = Network::new(identity_chain());
    network.init_nodes(1, 1);
    network.init_weights();
    network.find_cycles().unwrap();

    let mut previous_loss = f32::INFINITY;
    let mut final_loss = f32::INFINITY;
    for _ in 0..25 {
        final_loss = train_epoch(&mut network, 1.0);
        assert!(
            final_loss <= previous_loss,
            "loss increased: {} -> {}",
            previous_loss,
            final_loss
        );
        previous_loss = final_loss;
    }

    assert!(final_loss < 1e-3, "loss did not converge: {}", final_loss);
    let w = network.store().weight("w").unwrap().value;
    assert!((w - 1.0).abs() < 0.01, "weight off target: {}", w);
}

#[test]
fn test_config_file_drives_engine_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reweave.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[engine]").unwrap();
    writeln!(file, "concurrency = 3").unwrap();
    writeln!(file, "max_pass_factor = 7").unwrap();
    writeln!(file, "[logging]").unwrap();
    writeln!(file, "level = \"warn\"").unwrap();
    drop(file);

    let config = reweave::config::load_config(Some(&path)).unwrap();
    reweave::config::validate_config(&config).unwrap();

    let settings = engine_settings_from_config(&config);
    assert_eq!(settings.default_concurrency, 3);
    assert_eq!(settings.max_pass_factor, 7);

    let network = Network::with_settings(identity_chain(), settings);
    assert_eq!(network.settings().default_concurrency, 3);
    assert_eq!(network.pass_options().concurrency, 3);
}

#[test]
fn test_failure_in_one_network_leaves_siblings_running() {
    let mut healthy = Network::new(identity_chain());
    healthy.init_nodes(1, 1);
    healthy.find_cycles().unwrap();

    let mut broken = Network::new(identity_chain());
    broken.init_nodes(1, 1);
    broken.find_cycles().unwrap();

    // A window wider than the broken network's memory is rejected at its
    // boundary...
    let values = Array3::from_elem((4, 1, 1), 1.0);
    let dt = Array2::<f32>::ones((4, 1));
    let result = broken.fptt(4, &values, &["in".to_string()], &dt, &PassOptions::default());
    assert!(result.is_err());

    // ...and the sibling trains to completion regardless.
    let mut loss = f32::INFINITY;
    for _ in 0..25 {
        loss = train_epoch(&mut healthy, 1.0);
    }
    assert!(loss < 1e-3);
}

#[test]
fn test_observability_init_is_reentrant() {
    let _ = reweave::observability::init_tracing_default();
    assert!(!reweave::observability::init_tracing("debug"));
}
