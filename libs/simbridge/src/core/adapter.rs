// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Rewires a serialized graph onto the shared buffers.
//!
//! Buffer reads become `BufferInput` nodes substituted for the graph's
//! declared input tensors. When the graph produces forces, `BufferOutput`
//! nodes write them (and the virial, if declared) back. All bridge-owned
//! nodes live under the `bridge/` prefix; nothing else in the imported
//! graph is touched.

use std::collections::HashMap;

use serde_json::json;

use crate::core::buffers::{BufferKind, BufferSet};
use crate::core::descriptor::GraphDescriptor;
use crate::core::dtype::DType;
use crate::core::error::{BridgeError, Result};
use crate::core::graph::def::node_name;
use crate::core::graph::ops::{OP_BUFFER_INPUT, OP_BUFFER_OUTPUT, OP_CAST};
use crate::core::graph::{ComputeGraph, Dataflow, GraphDef, NodeDef, OpRegistry, TensorHandle};

/// Prefix of every node the adapter adds.
pub const BRIDGE_SCOPE: &str = "bridge";

const MISSING_TENSORS: &str = "graph must contain the following tensors: forces, nlist, positions";

/// A graph ready for the execution loop.
pub struct AdaptedGraph {
    pub graph: Dataflow,
    /// Evaluated every step, in order.
    pub outputs: Vec<TensorHandle>,
    pub output_names: Vec<String>,
    pub writes_forces: bool,
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for AdaptedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptedGraph")
            .field("nodes", &self.graph.node_count())
            .field("outputs", &self.output_names)
            .field("writes_forces", &self.writes_forces)
            .field("warnings", &self.warnings)
            .finish()
    }
}

pub struct GraphAdapter<'a> {
    descriptor: &'a GraphDescriptor,
    buffers: &'a BufferSet,
    registry: OpRegistry,
}

impl<'a> GraphAdapter<'a> {
    pub fn new(descriptor: &'a GraphDescriptor, buffers: &'a BufferSet, registry: OpRegistry) -> Self {
        Self {
            descriptor,
            buffers,
            registry,
        }
    }

    /// Load `graph.json` from the model directory and adapt it.
    pub fn adapt(&self) -> Result<AdaptedGraph> {
        // Without the buffer operators nothing can be bound.
        self.registry.require(OP_BUFFER_INPUT)?;
        self.registry.require(OP_BUFFER_OUTPUT)?;

        let path = self.descriptor.graph_path();
        let def = GraphDef::load(&path)?;
        tracing::info!("Loaded graph {} ({} nodes)", path.display(), def.nodes.len());
        self.adapt_def(&def)
    }

    pub fn adapt_def(&self, def: &GraphDef) -> Result<AdaptedGraph> {
        self.registry.require(OP_BUFFER_INPUT)?;
        self.registry.require(OP_BUFFER_OUTPUT)?;

        let d = self.descriptor;
        for required in [&d.forces, &d.nlist, &d.positions] {
            if def.node(node_name(required)).is_none() {
                return Err(BridgeError::Configuration(format!(
                    "{} (no '{}')",
                    MISSING_TENSORS, required
                )));
            }
        }

        let mut graph = Dataflow::new(self.registry.clone());
        let native = self.buffers.region().layout().dtype;

        let mut input_map = HashMap::new();
        let positions = self.buffer_input(&mut graph, BufferKind::Positions, native)?;
        input_map.insert(d.positions.clone(), positions);
        let nlist = self.buffer_input(&mut graph, BufferKind::Neighbors, native)?;
        input_map.insert(d.nlist.clone(), nlist);
        if !d.output_forces {
            let forces = self.buffer_input(&mut graph, BufferKind::Forces, native)?;
            input_map.insert(d.forces.clone(), forces);
        }

        graph.import(def, &input_map)?;

        let mut outputs = Vec::new();
        let mut output_names = Vec::new();
        let mut warnings = Vec::new();

        if d.output_forces {
            tracing::info!("This graph can modify forces");
            let forces = self.write_back(&mut graph, BufferKind::Forces, &d.forces, native)?;
            outputs.push(forces);
            output_names.push(d.forces.clone());

            match &d.virial {
                Some(virial_name) => {
                    let virial = self.write_back(&mut graph, BufferKind::Virial, virial_name, native)?;
                    outputs.push(virial);
                    output_names.push(virial_name.clone());
                }
                None => {
                    let warning = "No virial computed in graph. Pressure may be inaccurate!";
                    tracing::warn!("{}", warning);
                    warnings.push(warning.to_string());
                }
            }
        } else {
            tracing::info!("This graph will not modify forces");
        }

        for name in &d.out_nodes {
            let handle = graph.bind(name).ok_or_else(|| {
                BridgeError::Configuration(format!("output tensor '{}' is not in the graph", name))
            })?;
            outputs.push(handle);
            output_names.push(name.clone());
        }

        Ok(AdaptedGraph {
            graph,
            outputs,
            output_names,
            writes_forces: d.output_forces,
            warnings,
        })
    }

    /// `BufferInput` over `kind`, cast to the graph dtype when it differs.
    fn buffer_input(&self, graph: &mut Dataflow, kind: BufferKind, native: DType) -> Result<TensorHandle> {
        let view = self.buffers.view(kind).clone();
        let name = format!("{}/{}-input", BRIDGE_SCOPE, kind.name());
        tracing::info!(
            "Initializing {} buffer input at {:#x} with shape {:?}",
            kind,
            view.descriptor().address,
            view.shape()
        );
        let handle = graph.add_node(
            NodeDef::new(name.as_str(), OP_BUFFER_INPUT)
                .with_attr("buffer", kind.name())
                .with_attr("shape", json!(view.shape()))
                .with_attr("dtype", native.as_str()),
        )?;
        graph.bind_buffer(handle, view)?;

        if native == self.descriptor.dtype {
            return Ok(handle);
        }
        cast(graph, &name, self.descriptor.dtype)
    }

    /// Cast `source` to the buffer dtype and append a `BufferOutput` for it.
    fn write_back(
        &self,
        graph: &mut Dataflow,
        kind: BufferKind,
        source: &str,
        native: DType,
    ) -> Result<TensorHandle> {
        if graph.bind(source).is_none() {
            return Err(BridgeError::Configuration(format!(
                "{} (no '{}' to write back)",
                MISSING_TENSORS, source
            )));
        }
        let view = self.buffers.view(kind).clone();
        let capacity = view.element_count();
        let cast_name = format!("{}/{}-cast", BRIDGE_SCOPE, kind.name());
        graph.add_node(
            NodeDef::new(cast_name.as_str(), OP_CAST)
                .with_inputs([source])
                .with_attr("dtype", native.as_str()),
        )?;

        let descriptor = view.descriptor().clone();
        let handle = graph.add_node(
            NodeDef::new(format!("{}/{}-output", BRIDGE_SCOPE, kind.name()), OP_BUFFER_OUTPUT)
                .with_inputs([cast_name])
                .with_attr("buffer", kind.name())
                .with_attr("capacity", capacity),
        )?;
        graph.bind_buffer(handle, view)?;
        tracing::info!(
            "Initializing {} write-back: {:#x} to {:#x} ({} elements)",
            kind,
            descriptor.address,
            descriptor.end_address(),
            capacity
        );
        Ok(handle)
    }
}

fn cast(graph: &mut Dataflow, source: &str, target: DType) -> Result<TensorHandle> {
    graph.add_node(
        NodeDef::new(format!("{}/cast", source), OP_CAST)
            .with_inputs([source])
            .with_attr("dtype", target.as_str()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffers::{RegionLayout, SharedRegion};
    use crate::core::graph::ops::{OP_LENNARD_JONES, OP_PLACEHOLDER, OP_REDUCE_SUM};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn descriptor(dir: &TempDir, output_forces: bool, dtype: DType) -> GraphDescriptor {
        GraphDescriptor {
            model_directory: dir.path().to_path_buf(),
            n: 2,
            nn: 1,
            dtype,
            positions: "positions:0".into(),
            nlist: "nlist:0".into(),
            forces: "forces:0".into(),
            virial: None,
            output_forces,
            out_nodes: vec!["energy:0".into()],
        }
    }

    fn lj_graph(dtype: DType) -> GraphDef {
        let mut def = GraphDef::new();
        def.push(NodeDef::new("positions", OP_PLACEHOLDER).with_attr("dtype", dtype.as_str()))
            .push(NodeDef::new("nlist", OP_PLACEHOLDER).with_attr("dtype", dtype.as_str()))
            .push(NodeDef::new("forces", OP_LENNARD_JONES).with_inputs(["nlist:0"]))
            .push(NodeDef::new("energy", OP_REDUCE_SUM).with_inputs(["forces:0"]));
        def
    }

    fn buffers(dir: &TempDir, native: DType) -> BufferSet {
        let region = SharedRegion::create(dir.path().join("r.shm"), RegionLayout::new(2, 1, native)).unwrap();
        BufferSet::attach(Arc::new(region), 2, 1).unwrap()
    }

    #[test]
    fn test_output_forces_appends_write_back_first() {
        let dir = TempDir::new().unwrap();
        let d = descriptor(&dir, true, DType::Float32);
        let set = buffers(&dir, DType::Float32);
        let adapted = GraphAdapter::new(&d, &set, OpRegistry::standard())
            .adapt_def(&lj_graph(DType::Float32))
            .unwrap();

        assert_eq!(adapted.output_names, vec!["forces:0", "energy:0"]);
        assert_eq!(adapted.warnings.len(), 1);
        assert!(adapted.writes_forces);
    }

    #[test]
    fn test_dtype_mismatch_inserts_casts() {
        let dir = TempDir::new().unwrap();
        let d = descriptor(&dir, true, DType::Float64);
        let set = buffers(&dir, DType::Float32);
        let mut adapted = GraphAdapter::new(&d, &set, OpRegistry::standard())
            .adapt_def(&lj_graph(DType::Float64))
            .unwrap();

        let cast = adapted.graph.bind("bridge/nlist-input/cast").unwrap();
        assert_eq!(adapted.graph.bind("nlist"), Some(cast));

        let outputs = adapted.outputs.clone();
        let values = adapted.graph.run(&outputs, &HashMap::new()).unwrap();
        // Written back in the buffer's precision, energy in the graph's.
        assert_eq!(values[0].dtype(), DType::Float32);
        assert_eq!(values[1].dtype(), DType::Float64);
    }

    #[test]
    fn test_missing_positions_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let d = descriptor(&dir, true, DType::Float32);
        let set = buffers(&dir, DType::Float32);
        let mut def = lj_graph(DType::Float32);
        def.nodes.retain(|n| n.name != "positions");

        let err = GraphAdapter::new(&d, &set, OpRegistry::standard())
            .adapt_def(&def)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_missing_buffer_ops_is_load_error() {
        let dir = TempDir::new().unwrap();
        let d = descriptor(&dir, true, DType::Float32);
        let set = buffers(&dir, DType::Float32);
        let err = GraphAdapter::new(&d, &set, OpRegistry::builtin())
            .adapt_def(&lj_graph(DType::Float32))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Load(_)));
    }
}
