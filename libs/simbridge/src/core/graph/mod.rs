// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph runtime behind the [`ComputeGraph`] capability interface.
//!
//! The execution loop and checkpoint manager only ever talk to
//! `ComputeGraph`; [`Dataflow`] is the runtime this crate ships.

mod dataflow;
pub mod def;
pub mod ops;

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::NodeIndex;

pub use dataflow::Dataflow;
pub use def::{GraphDef, NodeDef};
pub use ops::{KernelContext, OpKernel, OpRegistry};

use crate::core::error::Result;
use crate::core::tensor::Tensor;

/// Opaque reference to one tensor of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorHandle(pub(crate) NodeIndex);

pub trait ComputeGraph {
    /// Resolve a tensor name (`name` or `name:0`).
    fn bind(&self, name: &str) -> Option<TensorHandle>;

    /// Evaluate `outputs`, using `overrides` in place of computed values.
    fn run(
        &mut self,
        outputs: &[TensorHandle],
        overrides: &HashMap<TensorHandle, Tensor>,
    ) -> Result<Vec<Tensor>>;

    /// Number of trainable/stateful values.
    fn variable_count(&self) -> usize;

    fn snapshot_variables(&self) -> BTreeMap<String, Tensor>;

    fn restore_variables(&mut self, values: BTreeMap<String, Tensor>) -> Result<()>;
}
