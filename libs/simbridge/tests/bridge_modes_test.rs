// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Simulation and compute sides as two threads sharing one mapped region.

mod common;

use std::thread;

use common::*;
use simbridge::core::checkpoint::CheckpointManager;
use simbridge::{
    local_channel, run_compute, BridgeError, BridgeHost, BufferKind, DType, FeedOverrides, OpRegistry,
    Tensor,
};
use tempfile::TempDir;

#[test]
fn test_lock_mode_reads_current_buffers_each_step() {
    let dir = TempDir::new().unwrap();
    write_graph(dir.path(), &load_graph());
    let mut descriptor = descriptor(dir.path(), false);
    descriptor.out_nodes = vec!["energy:0".into(), "count_out:0".into(), "load:0".into()];

    let (tx, rx) = local_channel();
    let mut host = BridgeHost::create(
        tx,
        dir.path().join("region.shm"),
        DType::Float32,
        descriptor,
        config(false, 1),
    )
    .unwrap();
    host.write(BufferKind::Positions, &positions()).unwrap();
    host.write(BufferKind::Neighbors, &neighbor_list()).unwrap();
    host.write(BufferKind::Forces, &forces()).unwrap();

    let compute = thread::spawn(move || run_compute(rx, OpRegistry::standard()));
    host.start().unwrap();

    host.exchange().unwrap();
    assert_eq!(host.read(BufferKind::Forces), forces());
    assert_eq!(host.read(BufferKind::Positions), positions());

    // The simulation moves on between steps.
    let moved = Tensor::from_f32(vec![N, 4], vec![2.0; N * 4]).unwrap();
    let softer = Tensor::from_f32(vec![N, 4], vec![-0.5; N * 4]).unwrap();
    host.write(BufferKind::Positions, &moved).unwrap();
    host.write(BufferKind::Forces, &softer).unwrap();
    host.exchange().unwrap();
    assert_eq!(host.read(BufferKind::Forces), softer);
    assert_eq!(host.read(BufferKind::Positions), moved);
    host.shutdown().unwrap();

    let summary = compute.join().unwrap().unwrap();
    assert_eq!(summary.steps, 2);
    assert_eq!(host.steps(), 2);
    let last = summary.last_result.unwrap();
    assert_eq!(last.len(), 3);
    assert!(last[0].to_f64_vec()[0] != 0.0);
    // 16 * 2.0 + 16 * -0.5; the first step's buffers would give 60 - 16.
    assert_eq!(last[2].to_f64_vec(), vec![24.0]);

    // Steps 0 and 1 on cadence, then the final save at step 2.
    let checkpoints = CheckpointManager::new(dir.path(), &config(false, 1));
    for step in 0..=2 {
        assert!(checkpoints.checkpoint_path(step).exists(), "missing step {}", step);
    }
}

#[test]
fn test_feed_mode_applies_each_feed_and_writes_forces() {
    let dir = TempDir::new().unwrap();
    write_graph(dir.path(), &scaled_forces_graph());

    let (tx, rx) = local_channel();
    let mut host = BridgeHost::create(
        tx,
        dir.path().join("region.shm"),
        DType::Float32,
        descriptor(dir.path(), true),
        config(true, 1000),
    )
    .unwrap();
    let sentinel = Tensor::from_f32(vec![N, 9], vec![7.0; N * 9]).unwrap();
    host.write(BufferKind::Positions, &positions()).unwrap();
    host.write(BufferKind::Neighbors, &neighbor_list()).unwrap();
    host.write(BufferKind::Virial, &sentinel).unwrap();

    let compute = thread::spawn(move || run_compute(rx, OpRegistry::standard()));
    host.start().unwrap();

    for kt in [2.0, 3.0] {
        let overrides = FeedOverrides::from([("kT".to_string(), Tensor::scalar(kt, DType::Float32))]);
        host.exchange_with_feed(overrides).unwrap();

        let expected: Vec<f64> = positions().to_f64_vec().iter().map(|p| p * kt).collect();
        assert_eq!(host.read(BufferKind::Forces).to_f64_vec(), expected);
    }
    // No virial in the graph, so the virial buffer is never written.
    assert_eq!(host.read(BufferKind::Virial), sentinel);

    host.shutdown().unwrap();
    let summary = compute.join().unwrap().unwrap();
    assert_eq!(summary.steps, 2);
}

#[test]
fn test_missing_positions_fails_before_any_turn() {
    let dir = TempDir::new().unwrap();
    let mut def = energy_graph();
    def.nodes.retain(|node| node.name != "positions");
    write_graph(dir.path(), &def);

    let (tx, rx) = local_channel();
    let mut host = BridgeHost::create(
        tx,
        dir.path().join("region.shm"),
        DType::Float32,
        descriptor(dir.path(), false),
        config(false, 1),
    )
    .unwrap();
    host.write(BufferKind::Forces, &forces()).unwrap();

    let compute = thread::spawn(move || run_compute(rx, OpRegistry::standard()));
    let started = host.start();

    let err = compute.join().unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
    assert!(err.to_string().contains("forces, nlist, positions"));
    assert!(matches!(started, Err(BridgeError::ChannelClosed)));
    assert_eq!(host.read(BufferKind::Forces), forces());
    assert!(!dir.path().join(CheckpointManager::INDEX_FILE_NAME).exists());
}

#[test]
fn test_unknown_feed_name_is_execution_error_and_turn_is_released() {
    let dir = TempDir::new().unwrap();
    write_graph(dir.path(), &scaled_forces_graph());

    let (tx, rx) = local_channel();
    let mut host = BridgeHost::create(
        tx,
        dir.path().join("region.shm"),
        DType::Float32,
        descriptor(dir.path(), true),
        config(true, 1000),
    )
    .unwrap();

    let compute = thread::spawn(move || run_compute(rx, OpRegistry::standard()));
    host.start().unwrap();

    let overrides = FeedOverrides::from([("temperature".to_string(), Tensor::scalar(1.0, DType::Float32))]);
    // The compute side marks the item done before failing, so this join returns.
    host.exchange_with_feed(overrides).unwrap();

    let err = compute.join().unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Execution { step: 0, .. }));
}
