// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Petgraph-backed data-flow graph.
//!
//! Nodes are only ever appended after all of their inputs, so node index
//! order is a topological order and evaluation is a single forward pass.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::def::{node_name, GraphDef, NodeDef};
use super::ops::{KernelContext, OpKernel, OpRegistry, OP_BUFFER_INPUT, OP_BUFFER_OUTPUT};
use super::{ComputeGraph, TensorHandle};
use crate::core::buffers::BufferView;
use crate::core::error::{BridgeError, Result};
use crate::core::tensor::Tensor;

struct GraphNode {
    def: NodeDef,
    kernel: Arc<dyn OpKernel>,
    inputs: Vec<NodeIndex>,
}

pub struct Dataflow {
    graph: DiGraph<GraphNode, ()>,
    by_name: HashMap<String, NodeIndex>,
    /// Imported names that were substituted by `input_map`.
    aliases: HashMap<String, NodeIndex>,
    variables: BTreeMap<String, Tensor>,
    buffers: BTreeMap<String, BufferView>,
    registry: OpRegistry,
}

impl Dataflow {
    pub fn new(registry: OpRegistry) -> Self {
        Self {
            graph: DiGraph::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            variables: BTreeMap::new(),
            buffers: BTreeMap::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Append one node. Its inputs must already be in the graph.
    pub fn add_node(&mut self, def: NodeDef) -> Result<TensorHandle> {
        let inputs = def
            .inputs
            .iter()
            .map(|input| {
                self.resolve(input).ok_or_else(|| {
                    BridgeError::Configuration(format!(
                        "{} reads unknown tensor '{}'",
                        def.name, input
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.insert(def, inputs)
    }

    fn insert(&mut self, def: NodeDef, inputs: Vec<NodeIndex>) -> Result<TensorHandle> {
        if self.by_name.contains_key(&def.name) || self.aliases.contains_key(&def.name) {
            return Err(BridgeError::Configuration(format!(
                "duplicate node name '{}'",
                def.name
            )));
        }
        let kernel = self.registry.require(&def.op)?;
        kernel.validate(&def)?;
        if let Some(initial) = kernel.initial_state(&def)? {
            self.variables.insert(def.name.clone(), initial);
        }

        let name = def.name.clone();
        let index = self.graph.add_node(GraphNode {
            def,
            kernel,
            inputs: inputs.clone(),
        });
        for input in inputs {
            self.graph.add_edge(input, index, ());
        }
        self.by_name.insert(name, index);
        Ok(TensorHandle(index))
    }

    fn resolve(&self, tensor_name: &str) -> Option<NodeIndex> {
        let name = node_name(tensor_name);
        self.aliases
            .get(name)
            .or_else(|| self.by_name.get(name))
            .copied()
    }

    /// Import `def`, substituting each tensor named in `input_map` with the
    /// given handle. The rest of the graph is imported unchanged.
    ///
    /// Every `input_map` key must name a node of `def`.
    pub fn import(&mut self, def: &GraphDef, input_map: &HashMap<String, TensorHandle>) -> Result<()> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, node) in def.nodes.iter().enumerate() {
            if positions.insert(node.name.as_str(), i).is_some() {
                return Err(BridgeError::Configuration(format!(
                    "graph defines node '{}' twice",
                    node.name
                )));
            }
        }

        let mut substituted: HashMap<&str, NodeIndex> = HashMap::new();
        for (key, handle) in input_map {
            let name = node_name(key);
            if !positions.contains_key(name) {
                return Err(BridgeError::Configuration(format!(
                    "graph must contain the following tensors: forces, nlist, positions (no '{}')",
                    key
                )));
            }
            if self.graph.node_weight(handle.0).is_none() {
                return Err(BridgeError::Configuration(format!(
                    "input map entry '{}' points outside this graph",
                    key
                )));
            }
            substituted.insert(name, handle.0);
        }

        // Order the remaining nodes so every input is imported first.
        let mut order_graph: DiGraph<usize, ()> = DiGraph::new();
        let slots: Vec<NodeIndex> = (0..def.nodes.len()).map(|i| order_graph.add_node(i)).collect();
        for (i, node) in def.nodes.iter().enumerate() {
            if substituted.contains_key(node.name.as_str()) {
                continue;
            }
            for input in &node.inputs {
                let input_name = node_name(input);
                if substituted.contains_key(input_name) {
                    continue;
                }
                let source = positions.get(input_name).ok_or_else(|| {
                    BridgeError::Configuration(format!(
                        "{} reads unknown tensor '{}'",
                        node.name, input
                    ))
                })?;
                order_graph.add_edge(slots[*source], slots[i], ());
            }
        }
        let order = toposort(&order_graph, None).map_err(|cycle| {
            let at = &def.nodes[order_graph[cycle.node_id()]].name;
            BridgeError::Configuration(format!("graph has a cycle through '{}'", at))
        })?;

        let mut imported: HashMap<&str, NodeIndex> = substituted.clone();
        for slot in order {
            let node = &def.nodes[order_graph[slot]];
            if substituted.contains_key(node.name.as_str()) {
                continue;
            }
            let inputs = node
                .inputs
                .iter()
                .map(|input| imported[node_name(input)])
                .collect();
            let handle = self.insert(node.clone(), inputs)?;
            imported.insert(node.name.as_str(), handle.0);
        }

        for (name, index) in substituted {
            self.aliases.insert(name.to_string(), index);
        }
        tracing::debug!(
            "Imported {} nodes ({} substituted)",
            def.nodes.len() - input_map.len(),
            input_map.len()
        );
        Ok(())
    }

    /// Attach a buffer view to a `BufferInput` or `BufferOutput` node.
    pub fn bind_buffer(&mut self, handle: TensorHandle, view: BufferView) -> Result<()> {
        let node = self
            .graph
            .node_weight(handle.0)
            .ok_or_else(|| BridgeError::Graph("bind_buffer on unknown node".into()))?;
        if node.def.op != OP_BUFFER_INPUT && node.def.op != OP_BUFFER_OUTPUT {
            return Err(BridgeError::Configuration(format!(
                "{} ({}) cannot be bound to a buffer",
                node.def.name, node.def.op
            )));
        }
        self.buffers.insert(node.def.name.clone(), view);
        Ok(())
    }

    pub fn node_def(&self, handle: TensorHandle) -> Option<&NodeDef> {
        self.graph.node_weight(handle.0).map(|n| &n.def)
    }

    pub fn name(&self, handle: TensorHandle) -> Option<&str> {
        self.node_def(handle).map(|d| d.name.as_str())
    }

    /// Handles of every node running `op`, in insertion order.
    pub fn nodes_with_op(&self, op: &str) -> Vec<TensorHandle> {
        self.graph
            .node_indices()
            .filter(|&i| self.graph[i].def.op == op)
            .map(TensorHandle)
            .collect()
    }

    /// Indices `outputs` depend on, stopping at fed nodes.
    fn needed(&self, outputs: &[TensorHandle], fed: &HashMap<TensorHandle, Tensor>) -> HashSet<NodeIndex> {
        let mut needed = HashSet::new();
        let mut stack: Vec<NodeIndex> = outputs.iter().map(|h| h.0).collect();
        while let Some(index) = stack.pop() {
            if !needed.insert(index) {
                continue;
            }
            if fed.contains_key(&TensorHandle(index)) {
                continue;
            }
            stack.extend(self.graph[index].inputs.iter().copied());
        }
        needed
    }
}

impl ComputeGraph for Dataflow {
    fn bind(&self, name: &str) -> Option<TensorHandle> {
        self.resolve(name).map(TensorHandle)
    }

    fn run(
        &mut self,
        outputs: &[TensorHandle],
        overrides: &HashMap<TensorHandle, Tensor>,
    ) -> Result<Vec<Tensor>> {
        for handle in outputs.iter().chain(overrides.keys()) {
            if self.graph.node_weight(handle.0).is_none() {
                return Err(BridgeError::Graph(format!("unknown tensor handle {:?}", handle)));
            }
        }
        for (handle, value) in overrides {
            let node = &self.graph[handle.0];
            if let Some(shape) = node.kernel.declared_shape(&node.def) {
                if shape != value.shape() {
                    return Err(BridgeError::Graph(format!(
                        "value fed to {} has shape {:?}, expected {:?}",
                        node.def.name,
                        value.shape(),
                        shape
                    )));
                }
            }
        }

        let needed = self.needed(outputs, overrides);
        let mut order: Vec<NodeIndex> = needed.into_iter().collect();
        order.sort_unstable();

        let mut values: HashMap<NodeIndex, Tensor> = HashMap::with_capacity(order.len());
        for index in order {
            if let Some(fed) = overrides.get(&TensorHandle(index)) {
                values.insert(index, fed.clone());
                continue;
            }
            let node = &self.graph[index];
            let inputs: Vec<Tensor> = node.inputs.iter().map(|i| values[i].clone()).collect();
            let mut ctx = KernelContext {
                node: &node.def,
                variables: &mut self.variables,
                buffers: &self.buffers,
            };
            let value = node.kernel.compute(&mut ctx, &inputs)?;
            values.insert(index, value);
        }

        // Mapped values must not outlive the turn.
        Ok(outputs.iter().map(|h| values[&h.0].clone().detached()).collect())
    }

    fn variable_count(&self) -> usize {
        self.variables.len()
    }

    fn snapshot_variables(&self) -> BTreeMap<String, Tensor> {
        self.variables.clone()
    }

    fn restore_variables(&mut self, values: BTreeMap<String, Tensor>) -> Result<()> {
        for (name, value) in &values {
            let current = self.variables.get(name).ok_or_else(|| {
                BridgeError::Checkpoint(format!("checkpoint has unknown variable '{}'", name))
            })?;
            if current.shape() != value.shape() || current.dtype() != value.dtype() {
                return Err(BridgeError::Checkpoint(format!(
                    "checkpoint variable '{}' is {:?} {}, graph has {:?} {}",
                    name,
                    value.shape(),
                    value.dtype(),
                    current.shape(),
                    current.dtype()
                )));
            }
        }
        self.variables.extend(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtype::DType;
    use crate::core::graph::ops::{OP_ADD, OP_CONST, OP_PLACEHOLDER, OP_VARIABLE};

    fn placeholder(name: &str) -> NodeDef {
        NodeDef::new(name, OP_PLACEHOLDER)
            .with_attr("dtype", "float32")
            .with_attr("shape", serde_json::json!([2]))
    }

    fn sum_graph() -> GraphDef {
        let mut def = GraphDef::new();
        // Deliberately out of order.
        def.push(NodeDef::new("sum", OP_ADD).with_inputs(["x:0", "y"]))
            .push(placeholder("x"))
            .push(placeholder("y"));
        def
    }

    #[test]
    fn test_import_sorts_and_runs_with_feeds() {
        let mut flow = Dataflow::new(OpRegistry::builtin());
        flow.import(&sum_graph(), &HashMap::new()).unwrap();

        let x = flow.bind("x:0").unwrap();
        let y = flow.bind("y").unwrap();
        let sum = flow.bind("sum").unwrap();
        let feeds = HashMap::from([
            (x, Tensor::from_f32(vec![2], vec![1.0, 2.0]).unwrap()),
            (y, Tensor::from_f32(vec![2], vec![10.0, 20.0]).unwrap()),
        ]);
        let out = flow.run(&[sum], &feeds).unwrap();
        assert_eq!(out[0].to_f64_vec(), vec![11.0, 22.0]);
    }

    #[test]
    fn test_input_map_substitutes_and_aliases() {
        let mut flow = Dataflow::new(OpRegistry::builtin());
        let two = flow
            .add_node(
                NodeDef::new("bridge/x", OP_CONST)
                    .with_attr("dtype", "float32")
                    .with_attr("shape", serde_json::json!([2]))
                    .with_attr("value", 2.0),
            )
            .unwrap();
        flow.import(&sum_graph(), &HashMap::from([("x:0".to_string(), two)]))
            .unwrap();

        assert_eq!(flow.bind("x"), Some(two));
        let y = flow.bind("y").unwrap();
        let sum = flow.bind("sum").unwrap();
        let feeds = HashMap::from([(y, Tensor::from_f32(vec![2], vec![1.0, 1.0]).unwrap())]);
        assert_eq!(flow.run(&[sum], &feeds).unwrap()[0].to_f64_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_missing_input_map_key_is_configuration_error() {
        let mut flow = Dataflow::new(OpRegistry::builtin());
        let c = flow
            .add_node(NodeDef::new("c", OP_CONST).with_attr("dtype", "float32"))
            .unwrap();
        let err = flow
            .import(&sum_graph(), &HashMap::from([("positions".to_string(), c)]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let mut def = GraphDef::new();
        def.push(NodeDef::new("a", "Neg").with_inputs(["b"]))
            .push(NodeDef::new("b", "Neg").with_inputs(["a"]));
        let mut flow = Dataflow::new(OpRegistry::builtin());
        assert!(matches!(
            flow.import(&def, &HashMap::new()),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_op_is_load_error() {
        let mut def = GraphDef::new();
        def.push(NodeDef::new("q", "QuantumFoam"));
        let mut flow = Dataflow::new(OpRegistry::builtin());
        assert!(matches!(
            flow.import(&def, &HashMap::new()),
            Err(BridgeError::Load(_))
        ));
    }

    #[test]
    fn test_fed_shape_must_match_declared_shape() {
        let mut flow = Dataflow::new(OpRegistry::builtin());
        flow.import(&sum_graph(), &HashMap::new()).unwrap();
        let x = flow.bind("x").unwrap();
        let feeds = HashMap::from([(x, Tensor::from_f32(vec![3], vec![0.0; 3]).unwrap())]);
        assert!(flow.run(&[x], &feeds).is_err());
    }

    #[test]
    fn test_restore_variables_checks_shape() {
        let mut def = GraphDef::new();
        def.push(
            NodeDef::new("w", OP_VARIABLE)
                .with_attr("dtype", "float64")
                .with_attr("shape", serde_json::json!([2]))
                .with_attr("init", 1.0),
        );
        let mut flow = Dataflow::new(OpRegistry::builtin());
        flow.import(&def, &HashMap::new()).unwrap();
        assert_eq!(flow.variable_count(), 1);

        let wrong = BTreeMap::from([("w".to_string(), Tensor::zeros(vec![3], DType::Float64))]);
        assert!(matches!(
            flow.restore_variables(wrong),
            Err(BridgeError::Checkpoint(_))
        ));

        let right = BTreeMap::from([(
            "w".to_string(),
            Tensor::from_f64(vec![2], vec![5.0, 6.0]).unwrap(),
        )]);
        flow.restore_variables(right.clone()).unwrap();
        assert_eq!(flow.snapshot_variables(), right);
    }
}
