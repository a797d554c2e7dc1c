// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Feed-mode session over the iceoryx2 control channel.

mod common;

use std::thread;

use common::*;
use serial_test::serial;
use simbridge::core::simbridge_home::new_run_id;
use simbridge::{
    run_compute, BridgeHost, BufferKind, DType, FeedOverrides, Iceoryx2ControlReceiver,
    Iceoryx2ControlSender, Iceoryx2Node, OpRegistry, Tensor,
};
use tempfile::TempDir;

#[test]
#[serial]
#[ignore = "needs iceoryx2 shared memory (/dev/shm) on the test host"]
fn test_feed_session_over_iceoryx2() {
    let dir = TempDir::new().unwrap();
    write_graph(dir.path(), &scaled_forces_graph());
    let service = format!("simbridge-test/{}", new_run_id());

    // iceoryx2 ports stay on the thread that created them.
    let compute_service = service.clone();
    let compute = thread::spawn(move || {
        let node = Iceoryx2Node::new().unwrap();
        let receiver = Iceoryx2ControlReceiver::open(&node, &compute_service).unwrap();
        run_compute(receiver, OpRegistry::standard())
    });

    let node = Iceoryx2Node::new().unwrap();
    let sender = Iceoryx2ControlSender::open(&node, &service).unwrap();
    let mut host = BridgeHost::create(
        sender,
        dir.path().join("region.shm"),
        DType::Float32,
        descriptor(dir.path(), true),
        config(true, 1000),
    )
    .unwrap();
    host.write(BufferKind::Positions, &positions()).unwrap();
    host.start().unwrap();

    for kt in [0.5, 4.0] {
        let overrides = FeedOverrides::from([("kT".to_string(), Tensor::scalar(kt, DType::Float32))]);
        host.exchange_with_feed(overrides).unwrap();
        let expected: Vec<f64> = positions().to_f64_vec().iter().map(|p| p * kt).collect();
        assert_eq!(host.read(BufferKind::Forces).to_f64_vec(), expected);
    }
    host.shutdown().unwrap();

    let summary = compute.join().unwrap().unwrap();
    assert_eq!(summary.steps, 2);
}
