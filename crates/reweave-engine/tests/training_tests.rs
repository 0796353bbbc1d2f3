// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error aggregation and weight updates: shared-weight gradient summation,
//! solver state, NaN containment, and the connectivity self-test.

use ndarray::{Array2, Array3};

use reweave_engine::{Network, PassOptions, NAN_LOSS_SENTINEL};
use reweave_graph::node::{Node, NodeRole, NodeStatus};
use reweave_graph::strategies::{ActivationKind, IntegrationKind, LossKind};
use reweave_graph::weight::{SolverKind, Weight, WeightInit};
use reweave_graph::{GraphStore, Link};

fn node(name: &str, role: NodeRole, activation: ActivationKind) -> Node {
    Node::new(name, role, activation, IntegrationKind::WeightedSum)
}

/// 2 inputs -> 1 hidden -> 1 output, every weight its own name.
fn two_input_store(hidden_activation: ActivationKind) -> GraphStore {
    let mut store = GraphStore::new();
    store.add_node(node("in1", NodeRole::Input, ActivationKind::Identity));
    store.add_node(node("in2", NodeRole::Input, ActivationKind::Identity));
    store.add_node(node("h", NodeRole::Hidden, hidden_activation));
    store.add_node(node("out", NodeRole::Output, ActivationKind::Identity));
    for name in ["w1", "w2", "w3"] {
        store.add_weight(Weight::new(name, WeightInit::Constant(1.0), SolverKind::Sgd {
            learning_rate: 0.1,
        }));
    }
    store.add_link(Link::new("l1", "in1", "h", "w1"));
    store.add_link(Link::new("l2", "in2", "h", "w2"));
    store.add_link(Link::new("l3", "h", "out", "w3"));
    store
}

fn window_of(value: f32, steps: usize, batch: usize, width: usize) -> (Array3<f32>, Array2<f32>) {
    (
        Array3::from_elem((steps, batch, width), value),
        Array2::ones((steps, batch)),
    )
}

#[test]
fn test_two_input_relu_chain_batch_of_four() {
    let mut network = Network::new(two_input_store(ActivationKind::Relu));
    network.init_nodes(4, 1);
    network.find_cycles().unwrap();

    let (values, dt) = window_of(1.0, 1, 4, 2);
    network
        .fptt(
            1,
            &values,
            &["in1".to_string(), "in2".to_string()],
            &dt,
            &PassOptions::default(),
        )
        .unwrap();

    for b in 0..4 {
        assert_eq!(network.store().node("h").unwrap().output[[b, 0]], 2.0);
        assert_eq!(network.store().node("out").unwrap().output[[b, 0]], 2.0);
    }
}

#[test]
fn test_shared_weight_gradient_equals_manual_sum() {
    // Two links share one weight; the applied update must equal the
    // manually summed per-link contributions across [0, steps].
    let mut store = GraphStore::new();
    store.add_node(node("in1", NodeRole::Input, ActivationKind::Identity));
    store.add_node(node("in2", NodeRole::Input, ActivationKind::Identity));
    store.add_node(node("h", NodeRole::Hidden, ActivationKind::Identity));
    store.add_node(node("out", NodeRole::Output, ActivationKind::Identity));
    let learning_rate = 0.01;
    for name in ["w_shared", "w_out"] {
        store.add_weight(Weight::new(name, WeightInit::Constant(1.0), SolverKind::Sgd {
            learning_rate,
        }));
    }
    store.add_link(Link::new("l1", "in1", "h", "w_shared"));
    store.add_link(Link::new("l2", "in2", "h", "w_shared"));
    store.add_link(Link::new("l3", "h", "out", "w_out"));

    let mut network = Network::new(store);
    network.init_nodes(1, 1);
    network.find_cycles().unwrap();

    let mut values = Array3::<f32>::zeros((1, 1, 2));
    values[[0, 0, 0]] = 2.0;
    values[[0, 0, 1]] = 3.0;
    let dt = Array2::<f32>::ones((1, 1));
    network
        .fptt(
            1,
            &values,
            &["in1".to_string(), "in2".to_string()],
            &dt,
            &PassOptions::default(),
        )
        .unwrap();

    // h = 5, out = 5; squared error against 0 injects 2 * 5 at the output.
    let expected = Array3::<f32>::zeros((1, 1, 1));
    network
        .cett(&expected, &["out".to_string()], 1, LossKind::SquaredError)
        .unwrap();
    network.tbptt(1, &PassOptions::default()).unwrap();

    // Manual aggregation over both links sharing w_shared, steps 0..=1
    // (the pad slot holds no error and contributes nothing).
    let h_error = network.store().node("h").unwrap().error[[0, 0]];
    let manual: f32 = h_error * 2.0 + h_error * 3.0;
    assert!((h_error - 10.0).abs() < 1e-5);

    let steps = 1;
    network.update_weights(steps, None).unwrap();
    let updated = network.store().weight("w_shared").unwrap().value;
    assert!(
        (updated - (1.0 - learning_rate * manual)).abs() < 1e-5,
        "got {}, manual sum predicts {}",
        updated,
        1.0 - learning_rate * manual
    );

    // w_out aggregated from the single output link: error(10) * h(5).
    let updated_out = network.store().weight("w_out").unwrap().value;
    assert!((updated_out - (1.0 - learning_rate * 50.0)).abs() < 1e-5);
}

#[test]
fn test_weight_filter_limits_update() {
    let mut network = Network::new(two_input_store(ActivationKind::Identity));
    network.init_nodes(1, 1);
    network.find_cycles().unwrap();

    let (values, dt) = window_of(1.0, 1, 1, 2);
    network
        .fptt(
            1,
            &values,
            &["in1".to_string(), "in2".to_string()],
            &dt,
            &PassOptions::default(),
        )
        .unwrap();
    let expected = Array3::<f32>::zeros((1, 1, 1));
    network
        .cett(&expected, &["out".to_string()], 1, LossKind::SquaredError)
        .unwrap();
    network.tbptt(1, &PassOptions::default()).unwrap();

    let updated = network
        .update_weights(1, Some(&["w3".to_string()]))
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(network.store().weight("w1").unwrap().value, 1.0);
    assert_eq!(network.store().weight("w2").unwrap().value, 1.0);
    assert_ne!(network.store().weight("w3").unwrap().value, 1.0);
}

#[test]
fn test_momentum_velocity_carries_across_updates() {
    let mut store = GraphStore::new();
    store.add_node(node("in", NodeRole::Input, ActivationKind::Identity));
    store.add_node(node("out", NodeRole::Output, ActivationKind::Identity));
    store.add_weight(Weight::new(
        "w",
        WeightInit::Constant(0.0),
        SolverKind::Momentum {
            learning_rate: 0.1,
            momentum: 0.9,
            velocity: 0.0,
        },
    ));
    store.add_link(Link::new("l", "in", "out", "w"));

    let mut network = Network::new(store);
    network.init_nodes(1, 1);
    network.find_cycles().unwrap();

    let mut run_epoch = |network: &mut Network| {
        let (values, dt) = window_of(1.0, 1, 1, 1);
        network
            .fptt(1, &values, &["in".to_string()], &dt, &PassOptions::default())
            .unwrap();
        let expected = Array3::from_elem((1, 1, 1), 1.0);
        network
            .cett(&expected, &["out".to_string()], 1, LossKind::SquaredError)
            .unwrap();
        network.tbptt(1, &PassOptions::default()).unwrap();
        network.update_weights(1, None).unwrap();
    };

    // Gradient at w=0: 2*(0-1)*1 = -2; momentum step: v=0.2, w=0.2.
    run_epoch(&mut network);
    let w1 = network.store().weight("w").unwrap().value;
    assert!((w1 - 0.2).abs() < 1e-5);

    // Second epoch: gradient 2*(0.2-1) = -1.6; v = 0.9*0.2 + 0.16 = 0.34.
    run_epoch(&mut network);
    let w2 = network.store().weight("w").unwrap().value;
    assert!((w2 - 0.54).abs() < 1e-5);

    // init_weights clears both the value and the velocity.
    network.init_weights();
    let weight = network.store().weight("w").unwrap();
    assert_eq!(weight.value, 0.0);
    match weight.solver {
        SolverKind::Momentum { velocity, .. } => assert_eq!(velocity, 0.0),
        _ => unreachable!(),
    }
}

#[test]
fn test_nan_loss_is_replaced_by_sentinel() {
    let mut network = Network::new(two_input_store(ActivationKind::Identity));
    network.init_nodes(1, 1);
    network.find_cycles().unwrap();

    let (values, dt) = window_of(1.0, 1, 1, 2);
    network
        .fptt(
            1,
            &values,
            &["in1".to_string(), "in2".to_string()],
            &dt,
            &PassOptions::default(),
        )
        .unwrap();

    // Poison the output slot; the loss must come back as the finite
    // sentinel so population ranking stays well-ordered.
    network.store_mut().node_mut("out").unwrap().output[[0, 0]] = f32::NAN;
    let expected = Array3::<f32>::zeros((1, 1, 1));
    let losses = network
        .cett(&expected, &["out".to_string()], 1, LossKind::SquaredError)
        .unwrap();

    assert_eq!(losses[[0, 0]], NAN_LOSS_SENTINEL);
    assert!(losses[[0, 0]].is_finite());
}

#[test]
fn test_cett_reverse_indexes_expectation_against_execution() {
    // Distinct targets per step: expectation index 0 (earliest) must land
    // on execution slot steps-1.
    let mut network = Network::new(two_input_store(ActivationKind::Identity));
    network.init_nodes(1, 2);
    network.find_cycles().unwrap();

    let mut values = Array3::<f32>::zeros((2, 1, 2));
    values[[0, 0, 0]] = 1.0; // earliest
    values[[0, 0, 1]] = 1.0;
    values[[1, 0, 0]] = 3.0; // latest
    values[[1, 0, 1]] = 3.0;
    let dt = Array2::<f32>::ones((2, 1));
    network
        .fptt(
            2,
            &values,
            &["in1".to_string(), "in2".to_string()],
            &dt,
            &PassOptions::default(),
        )
        .unwrap();
    // out(slot 1) = 2, out(slot 0) = 6.

    let mut expected = Array3::<f32>::zeros((2, 1, 1));
    expected[[0, 0, 0]] = 2.0; // earliest step matches exactly
    expected[[1, 0, 0]] = 0.0; // latest step misses by 6
    let losses = network
        .cett(&expected, &["out".to_string()], 2, LossKind::SquaredError)
        .unwrap();

    assert_eq!(losses[[0, 0]], 0.0);
    assert_eq!(losses[[1, 0]], 36.0);

    let out = network.store().node("out").unwrap();
    assert_eq!(out.error[[0, 1]], 0.0); // earliest slot: on target
    assert_eq!(out.error[[0, 0]], 12.0); // latest slot: 2 * 6
    assert_eq!(out.status, NodeStatus::Corrected);
}

#[test]
fn test_connectivity_check_passes_minimal_graph_and_restores_weights() {
    let mut store = two_input_store(ActivationKind::Relu);
    store.weight_mut("w1").unwrap().value = 0.37; // arbitrary pre-probe value
    let mut network = Network::new(store);
    network.init_nodes(1, 1);

    assert!(network.check_complete_input_to_output().unwrap());
    // The probe pinned weights to 1 internally but restored state after.
    assert_eq!(network.store().weight("w1").unwrap().value, 0.37);
}

#[test]
fn test_connectivity_check_fails_without_input_to_output_path() {
    // The second output hangs off a hidden node that no input feeds.
    let mut store = two_input_store(ActivationKind::Identity);
    store.add_node(node("island", NodeRole::Hidden, ActivationKind::Identity));
    store.add_node(node("out2", NodeRole::Output, ActivationKind::Identity));
    store.add_weight(Weight::new("w4", WeightInit::Constant(1.0), SolverKind::Sgd {
        learning_rate: 0.1,
    }));
    store.add_link(Link::new("l4", "island", "out2", "w4"));

    let mut network = Network::new(store);
    network.init_nodes(1, 1);
    assert!(!network.check_complete_input_to_output().unwrap());
}

#[test]
fn test_deactivated_subgraph_contributes_nothing() {
    let mut network = Network::new(two_input_store(ActivationKind::Identity));
    network.init_nodes(1, 1);
    network.find_cycles().unwrap();
    network.store_mut().node_mut("in2").unwrap().status = NodeStatus::Deactivated;

    // Pin only in1; the deactivated in2 neither blocks admission nor adds
    // a term, so h sees exactly one contribution.
    let (values, dt) = window_of(1.0, 1, 1, 1);
    network
        .fptt(1, &values, &["in1".to_string()], &dt, &PassOptions::default())
        .unwrap();

    assert_eq!(network.store().node("h").unwrap().output[[0, 0]], 1.0);
    assert_eq!(network.store().node("out").unwrap().output[[0, 0]], 1.0);
}
