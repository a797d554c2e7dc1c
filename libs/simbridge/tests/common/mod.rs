// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared fixtures: model directories, graphs and buffer contents.

#![allow(dead_code)]

use std::path::Path;

use simbridge::core::graph::ops::{
    OP_ADD, OP_ASSIGN_ADD, OP_CONST, OP_LENNARD_JONES, OP_MUL, OP_PLACEHOLDER, OP_REDUCE_SUM, OP_VARIABLE,
};
use simbridge::core::graph::{GraphDef, NodeDef};
use simbridge::{BridgeConfig, DType, GraphDescriptor, Tensor};

pub const N: usize = 4;
pub const NN: usize = 2;

pub fn descriptor(dir: &Path, output_forces: bool) -> GraphDescriptor {
    GraphDescriptor {
        model_directory: dir.to_path_buf(),
        n: N,
        nn: NN,
        dtype: DType::Float32,
        positions: "positions:0".into(),
        nlist: "nlist:0".into(),
        forces: "forces:0".into(),
        virial: None,
        output_forces,
        out_nodes: Vec::new(),
    }
}

pub fn config(use_feed: bool, save_period: u64) -> BridgeConfig {
    BridgeConfig {
        save_period,
        use_feed,
        ..BridgeConfig::default()
    }
}

/// The three required inputs as float32 placeholders.
pub fn inputs() -> GraphDef {
    let mut def = GraphDef::new();
    for name in ["positions", "nlist", "forces"] {
        def.push(NodeDef::new(name, OP_PLACEHOLDER).with_attr("dtype", "float32"));
    }
    def
}

/// Read-only graph: Lennard-Jones energy plus a step counter variable.
pub fn energy_graph() -> GraphDef {
    let mut def = inputs();
    def.push(NodeDef::new("pair", OP_LENNARD_JONES).with_inputs(["nlist:0"]))
        .push(NodeDef::new("energy", OP_REDUCE_SUM).with_inputs(["pair:0"]));
    with_counter(def)
}

/// `energy_graph` plus `load = sum(positions + forces)`, which reads the
/// two buffers the energy never touches.
pub fn load_graph() -> GraphDef {
    let mut def = energy_graph();
    def.push(NodeDef::new("shifted", OP_ADD).with_inputs(["positions:0", "forces:0"]))
        .push(NodeDef::new("load", OP_REDUCE_SUM).with_inputs(["shifted:0"]));
    def
}

/// Force-writing graph: `forces = positions * kT`, with `kT` fed per step.
pub fn scaled_forces_graph() -> GraphDef {
    let mut def = GraphDef::new();
    def.push(NodeDef::new("positions", OP_PLACEHOLDER).with_attr("dtype", "float32"))
        .push(NodeDef::new("nlist", OP_PLACEHOLDER).with_attr("dtype", "float32"))
        .push(NodeDef::new("kT", OP_PLACEHOLDER).with_attr("dtype", "float32"))
        .push(NodeDef::new("forces", OP_MUL).with_inputs(["positions:0", "kT:0"]));
    def
}

/// Adds `count += 0.25` (float32) evaluated through the `count_out` output.
pub fn with_counter(mut def: GraphDef) -> GraphDef {
    def.push(
        NodeDef::new("count", OP_VARIABLE)
            .with_attr("dtype", "float32")
            .with_attr("init", 0.1),
    )
    .push(NodeDef::new("delta", OP_CONST).with_attr("dtype", "float32").with_attr("value", 0.25))
    .push(NodeDef::new("count_out", OP_ASSIGN_ADD).with_inputs(["count", "delta"]));
    def
}

pub fn write_graph(dir: &Path, def: &GraphDef) {
    def.save(&dir.join(GraphDescriptor::GRAPH_FILE_NAME)).unwrap();
}

pub fn positions() -> Tensor {
    Tensor::from_f32(vec![N, 4], (0..N * 4).map(|i| i as f32 * 0.5).collect()).unwrap()
}

/// One neighbor per particle at distance 1.5 along x; the second slot is empty.
pub fn neighbor_list() -> Tensor {
    let mut rows = vec![0.0f32; N * NN * 4];
    for i in 0..N {
        rows[i * NN * 4] = 1.5;
    }
    Tensor::from_f32(vec![N, NN, 4], rows).unwrap()
}

pub fn forces() -> Tensor {
    Tensor::from_f32(vec![N, 4], vec![-1.0; N * 4]).unwrap()
}
