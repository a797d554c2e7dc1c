// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Operator kernels and the registry that resolves op names to them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use super::def::{node_name, NodeDef};
use crate::core::buffers::BufferView;
use crate::core::dtype::{coerce, DType};
use crate::core::error::{BridgeError, Result};
use crate::core::tensor::{Tensor, Values};

pub const OP_PLACEHOLDER: &str = "Placeholder";
pub const OP_CONST: &str = "Const";
pub const OP_VARIABLE: &str = "Variable";
pub const OP_ASSIGN_ADD: &str = "AssignAdd";
pub const OP_IDENTITY: &str = "Identity";
pub const OP_CAST: &str = "Cast";
pub const OP_ADD: &str = "Add";
pub const OP_SUB: &str = "Sub";
pub const OP_MUL: &str = "Mul";
pub const OP_NEG: &str = "Neg";
pub const OP_REDUCE_SUM: &str = "ReduceSum";
pub const OP_LENNARD_JONES: &str = "LennardJones";
pub const OP_LENNARD_JONES_VIRIAL: &str = "LennardJonesVirial";
pub const OP_SCALAR_SUMMARY: &str = "ScalarSummary";
pub const OP_MERGE_SUMMARY: &str = "MergeSummary";
pub const OP_BUFFER_INPUT: &str = "BufferInput";
pub const OP_BUFFER_OUTPUT: &str = "BufferOutput";

/// What a kernel sees while computing one node.
pub struct KernelContext<'a> {
    pub node: &'a NodeDef,
    /// Variable values keyed by node name.
    pub variables: &'a mut BTreeMap<String, Tensor>,
    /// Bound buffer views keyed by node name.
    pub buffers: &'a BTreeMap<String, BufferView>,
}

impl KernelContext<'_> {
    fn buffer(&self) -> Result<&BufferView> {
        self.buffers.get(&self.node.name).ok_or_else(|| {
            BridgeError::Graph(format!("{} has no bound buffer", self.node.name))
        })
    }
}

pub trait OpKernel: Send + Sync {
    /// Exact input count, or `None` for one or more.
    fn input_count(&self) -> Option<usize>;

    /// Check attrs and arity at import time.
    fn validate(&self, node: &NodeDef) -> Result<()> {
        check_arity(node, self.input_count())
    }

    /// Initial value for stateful ops.
    fn initial_state(&self, _node: &NodeDef) -> Result<Option<Tensor>> {
        Ok(None)
    }

    /// Shape a value fed to this node must have, if it declares one.
    fn declared_shape(&self, _node: &NodeDef) -> Option<Vec<usize>> {
        None
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor>;
}

fn check_arity(node: &NodeDef, expected: Option<usize>) -> Result<()> {
    let got = node.inputs.len();
    let ok = match expected {
        Some(n) => got == n,
        None => got >= 1,
    };
    if ok {
        return Ok(());
    }
    let wanted = expected.map_or_else(|| "at least 1".to_string(), |n| n.to_string());
    Err(BridgeError::Configuration(format!(
        "{} ({}) takes {} inputs, got {}",
        node.name, node.op, wanted, got
    )))
}

fn attr_dtype(node: &NodeDef, key: &str) -> Result<DType> {
    let value = node.attr(key).ok_or_else(|| {
        BridgeError::Configuration(format!("{} ({}) needs a '{}' attr", node.name, node.op, key))
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        BridgeError::Configuration(format!("{} has invalid '{}' attr: {}", node.name, key, e))
    })
}

/// A number or a flat list of numbers.
fn attr_values(node: &NodeDef, key: &str) -> Result<Option<Vec<f64>>> {
    let invalid = || BridgeError::Configuration(format!("{} has invalid '{}' attr", node.name, key));
    match node.attr(key) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(vec![n.as_f64().ok_or_else(invalid)?])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_f64().ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

/// Build a tensor of `shape` from a value attr. A single value fills the shape.
fn tensor_from_attrs(node: &NodeDef, key: &str, default: f64) -> Result<Tensor> {
    let dtype = attr_dtype(node, "dtype")?;
    let shape = node.attr_shape("shape").unwrap_or_default();
    let len: usize = shape.iter().product();
    let values = attr_values(node, key)?.unwrap_or_else(|| vec![default]);
    let values = if values.len() == 1 && len != 1 {
        vec![values[0]; len]
    } else {
        values
    };
    Tensor::from_f64_as(shape, values, dtype)
        .map_err(|e| BridgeError::Configuration(format!("{}: {}", node.name, e)))
}

/// Elementwise binary op with scalar broadcast, computed in f64.
fn elementwise(node: &NodeDef, a: &Tensor, b: &Tensor, f: impl Fn(f64, f64) -> f64) -> Result<Tensor> {
    if a.dtype() != b.dtype() {
        return Err(BridgeError::Graph(format!(
            "{} ({}) needs matching dtypes, got {} and {}",
            node.name,
            node.op,
            a.dtype(),
            b.dtype()
        )));
    }
    let (x, y) = (a.values(), b.values());
    let (shape, values): (Vec<usize>, Vec<f64>) = if a.shape() == b.shape() {
        (a.shape().to_vec(), a.iter_f64().zip(b.iter_f64()).map(|(p, q)| f(p, q)).collect())
    } else if b.is_scalar_like() {
        (a.shape().to_vec(), a.iter_f64().map(|p| f(p, y.get(0))).collect())
    } else if a.is_scalar_like() {
        (b.shape().to_vec(), b.iter_f64().map(|q| f(x.get(0), q)).collect())
    } else {
        return Err(BridgeError::Graph(format!(
            "{} ({}) cannot combine shapes {:?} and {:?}",
            node.name,
            node.op,
            a.shape(),
            b.shape()
        )));
    };
    Tensor::from_f64_as(shape, values, a.dtype())
}

struct Placeholder;

impl OpKernel for Placeholder {
    fn input_count(&self) -> Option<usize> {
        Some(0)
    }

    fn declared_shape(&self, node: &NodeDef) -> Option<Vec<usize>> {
        node.attr_shape("shape")
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, _inputs: &[Tensor]) -> Result<Tensor> {
        Err(BridgeError::Graph(format!(
            "placeholder {} was evaluated without a value",
            ctx.node.name
        )))
    }
}

struct Const;

impl OpKernel for Const {
    fn input_count(&self) -> Option<usize> {
        Some(0)
    }

    fn validate(&self, node: &NodeDef) -> Result<()> {
        check_arity(node, Some(0))?;
        tensor_from_attrs(node, "value", 0.0).map(|_| ())
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, _inputs: &[Tensor]) -> Result<Tensor> {
        tensor_from_attrs(ctx.node, "value", 0.0)
    }
}

struct Variable;

impl OpKernel for Variable {
    fn input_count(&self) -> Option<usize> {
        Some(0)
    }

    fn initial_state(&self, node: &NodeDef) -> Result<Option<Tensor>> {
        tensor_from_attrs(node, "init", 0.0).map(Some)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, _inputs: &[Tensor]) -> Result<Tensor> {
        ctx.variables
            .get(&ctx.node.name)
            .cloned()
            .ok_or_else(|| BridgeError::Graph(format!("variable {} has no value", ctx.node.name)))
    }
}

/// `var += delta`; input 0 names the variable. Yields the updated value.
struct AssignAdd;

impl OpKernel for AssignAdd {
    fn input_count(&self) -> Option<usize> {
        Some(2)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let target = node_name(&ctx.node.inputs[0]).to_string();
        let current = ctx.variables.get(&target).ok_or_else(|| {
            BridgeError::Graph(format!("{} targets {}, which is not a variable", ctx.node.name, target))
        })?;
        let updated = elementwise(ctx.node, current, &inputs[1], |a, b| a + b)?;
        if updated.shape() != current.shape() {
            return Err(BridgeError::Graph(format!(
                "{} would change the shape of {}",
                ctx.node.name, target
            )));
        }
        ctx.variables.insert(target, updated.clone());
        Ok(updated)
    }
}

struct Identity;

impl OpKernel for Identity {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, _ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        Ok(inputs[0].clone())
    }
}

struct Cast;

impl OpKernel for Cast {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(&self, node: &NodeDef) -> Result<()> {
        check_arity(node, Some(1))?;
        attr_dtype(node, "dtype").map(|_| ())
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        Ok(coerce(&inputs[0], attr_dtype(ctx.node, "dtype")?))
    }
}

struct Binary(fn(f64, f64) -> f64);

impl OpKernel for Binary {
    fn input_count(&self) -> Option<usize> {
        Some(2)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        elementwise(ctx.node, &inputs[0], &inputs[1], self.0)
    }
}

struct Neg;

impl OpKernel for Neg {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, _ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let x = &inputs[0];
        Tensor::from_f64_as(
            x.shape().to_vec(),
            x.iter_f64().map(|v| -v).collect(),
            x.dtype(),
        )
    }
}

struct ReduceSum;

impl OpKernel for ReduceSum {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, _ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let x = &inputs[0];
        Ok(Tensor::scalar(x.iter_f64().sum(), x.dtype()))
    }
}

/// Lennard-Jones parameters plus the neighbor list as `(N, NN, rows)`.
/// Each neighbor row is `(dx, dy, dz, w)`: the displacement to the neighbor;
/// an all-zero displacement marks an empty slot. Rows are read in place.
struct PairTerms<'a> {
    epsilon: f64,
    sigma: f64,
    n: usize,
    nn: usize,
    rows: Values<'a>,
}

impl<'a> PairTerms<'a> {
    fn from_inputs(node: &NodeDef, nlist: &'a Tensor) -> Result<Self> {
        let shape = nlist.shape();
        if shape.len() != 3 || shape[2] != 4 {
            return Err(BridgeError::Graph(format!(
                "{} expects a neighbor list of shape [N, NN, 4], got {:?}",
                node.name, shape
            )));
        }
        Ok(Self {
            epsilon: node.attr_f64("epsilon").unwrap_or(1.0),
            sigma: node.attr_f64("sigma").unwrap_or(1.0),
            n: shape[0],
            nn: shape[1],
            rows: nlist.values(),
        })
    }

    /// Calls `f(i, r, energy, f_over_r)` for every occupied slot, where the
    /// pair force on `i` is `f_over_r * r`.
    fn for_each_pair(&self, mut f: impl FnMut(usize, [f64; 3], f64, f64)) {
        let s6 = self.sigma.powi(6);
        let s12 = s6 * s6;
        for i in 0..self.n {
            for j in 0..self.nn {
                let base = (i * self.nn + j) * 4;
                let r = [self.rows.get(base), self.rows.get(base + 1), self.rows.get(base + 2)];
                let r2 = r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
                if r2 == 0.0 {
                    continue;
                }
                let inv_r6 = 1.0 / (r2 * r2 * r2);
                let energy = 4.0 * self.epsilon * (s12 * inv_r6 * inv_r6 - s6 * inv_r6);
                // dU/dr / r
                let du_dr_over_r =
                    4.0 * self.epsilon * (-12.0 * s12 * inv_r6 * inv_r6 + 6.0 * s6 * inv_r6) / r2;
                f(i, r, energy, du_dr_over_r);
            }
        }
    }
}

/// Per-particle `(fx, fy, fz, energy)`, energy split evenly across the pair.
struct LennardJones;

impl OpKernel for LennardJones {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let terms = PairTerms::from_inputs(ctx.node, &inputs[0])?;
        let mut out = vec![0.0; terms.n * 4];
        terms.for_each_pair(|i, r, energy, f_over_r| {
            for axis in 0..3 {
                out[i * 4 + axis] += f_over_r * r[axis];
            }
            out[i * 4 + 3] += 0.5 * energy;
        });
        Tensor::from_f64_as(vec![terms.n, 4], out, inputs[0].dtype())
    }
}

/// Per-particle 3×3 virial, row-major.
struct LennardJonesVirial;

impl OpKernel for LennardJonesVirial {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let terms = PairTerms::from_inputs(ctx.node, &inputs[0])?;
        let mut out = vec![0.0; terms.n * 9];
        terms.for_each_pair(|i, r, _energy, f_over_r| {
            for a in 0..3 {
                for b in 0..3 {
                    out[i * 9 + a * 3 + b] -= 0.5 * r[a] * f_over_r * r[b];
                }
            }
        });
        Tensor::from_f64_as(vec![terms.n, 9], out, inputs[0].dtype())
    }
}

/// Tags a single value for summary output. Passes it through.
struct ScalarSummary;

impl OpKernel for ScalarSummary {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        if !inputs[0].is_scalar_like() {
            return Err(BridgeError::Graph(format!(
                "{} summarizes a tensor of shape {:?}, expected a single value",
                ctx.node.name,
                inputs[0].shape()
            )));
        }
        Ok(Tensor::scalar(inputs[0].values().get(0), DType::Float64))
    }
}

/// Collects summary values, in input order, into one float64 vector.
struct MergeSummary;

impl OpKernel for MergeSummary {
    fn input_count(&self) -> Option<usize> {
        None
    }

    fn compute(&self, _ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let values: Vec<f64> = inputs.iter().flat_map(|t| t.iter_f64()).collect();
        Tensor::from_f64(vec![values.len()], values)
    }
}

/// Stands in for a graph input, viewing the bound buffer in place.
struct BufferInput;

impl OpKernel for BufferInput {
    fn input_count(&self) -> Option<usize> {
        Some(0)
    }

    fn declared_shape(&self, node: &NodeDef) -> Option<Vec<usize>> {
        node.attr_shape("shape")
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, _inputs: &[Tensor]) -> Result<Tensor> {
        let view = ctx.buffer()?;
        if let Some(shape) = ctx.node.attr_shape("shape") {
            if shape != view.shape() {
                return Err(BridgeError::Graph(format!(
                    "{} declares shape {:?} but its buffer is {:?}",
                    ctx.node.name,
                    shape,
                    view.shape()
                )));
            }
        }
        Ok(view.tensor())
    }
}

/// Writes its input into the bound buffer, up to `capacity` elements.
struct BufferOutput;

impl OpKernel for BufferOutput {
    fn input_count(&self) -> Option<usize> {
        Some(1)
    }

    fn validate(&self, node: &NodeDef) -> Result<()> {
        check_arity(node, Some(1))?;
        match node.attr("capacity").and_then(Value::as_u64) {
            Some(_) => Ok(()),
            None => Err(BridgeError::Configuration(format!(
                "{} needs an integer 'capacity' attr",
                node.name
            ))),
        }
    }

    fn compute(&self, ctx: &mut KernelContext<'_>, inputs: &[Tensor]) -> Result<Tensor> {
        let capacity = ctx
            .node
            .attr("capacity")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize;
        ctx.buffer()?.write(&inputs[0], capacity)?;
        Ok(inputs[0].clone())
    }
}

/// Op name → kernel.
#[derive(Clone)]
pub struct OpRegistry {
    kernels: HashMap<String, Arc<dyn OpKernel>>,
}

impl OpRegistry {
    pub fn empty() -> Self {
        Self {
            kernels: HashMap::new(),
        }
    }

    /// Everything except the shared buffer operators.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(OP_PLACEHOLDER, Placeholder);
        registry.register(OP_CONST, Const);
        registry.register(OP_VARIABLE, Variable);
        registry.register(OP_ASSIGN_ADD, AssignAdd);
        registry.register(OP_IDENTITY, Identity);
        registry.register(OP_CAST, Cast);
        registry.register(OP_ADD, Binary(|a, b| a + b));
        registry.register(OP_SUB, Binary(|a, b| a - b));
        registry.register(OP_MUL, Binary(|a, b| a * b));
        registry.register(OP_NEG, Neg);
        registry.register(OP_REDUCE_SUM, ReduceSum);
        registry.register(OP_LENNARD_JONES, LennardJones);
        registry.register(OP_LENNARD_JONES_VIRIAL, LennardJonesVirial);
        registry.register(OP_SCALAR_SUMMARY, ScalarSummary);
        registry.register(OP_MERGE_SUMMARY, MergeSummary);
        registry
    }

    /// Builtins plus `BufferInput` and `BufferOutput`.
    pub fn standard() -> Self {
        let mut registry = Self::builtin();
        registry.register(OP_BUFFER_INPUT, BufferInput);
        registry.register(OP_BUFFER_OUTPUT, BufferOutput);
        registry
    }

    pub fn register(&mut self, op: &str, kernel: impl OpKernel + 'static) {
        self.kernels.insert(op.to_string(), Arc::new(kernel));
    }

    pub fn contains(&self, op: &str) -> bool {
        self.kernels.contains_key(op)
    }

    pub fn get(&self, op: &str) -> Option<Arc<dyn OpKernel>> {
        self.kernels.get(op).cloned()
    }

    /// Fails with `Load` when no kernel is registered for `op`.
    pub fn require(&self, op: &str) -> Result<Arc<dyn OpKernel>> {
        self.get(op).ok_or_else(|| {
            BridgeError::Load(format!("no kernel registered for op '{}'", op))
        })
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ops: Vec<&str> = self.kernels.keys().map(String::as_str).collect();
        ops.sort_unstable();
        f.debug_struct("OpRegistry").field("ops", &ops).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(registry: &OpRegistry, node: &NodeDef, inputs: &[Tensor]) -> Result<Tensor> {
        let kernel = registry.require(&node.op)?;
        kernel.validate(node)?;
        let mut variables = BTreeMap::new();
        let buffers = BTreeMap::new();
        let mut ctx = KernelContext {
            node,
            variables: &mut variables,
            buffers: &buffers,
        };
        kernel.compute(&mut ctx, inputs)
    }

    #[test]
    fn test_builtin_lacks_buffer_ops() {
        let builtin = OpRegistry::builtin();
        assert!(matches!(builtin.require(OP_BUFFER_INPUT), Err(BridgeError::Load(_))));
        assert!(OpRegistry::standard().contains(OP_BUFFER_OUTPUT));
    }

    #[test]
    fn test_mul_broadcasts_scalar() {
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("m", OP_MUL).with_inputs(["a", "b"]);
        let a = Tensor::from_f32(vec![2], vec![1.0, 2.0]).unwrap();
        let b = Tensor::scalar(3.0, DType::Float32);
        let out = run(&registry, &node, &[a, b]).unwrap();
        assert_eq!(out.to_f64_vec(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_add_rejects_mixed_dtypes() {
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("s", OP_ADD).with_inputs(["a", "b"]);
        let a = Tensor::scalar(1.0, DType::Float32);
        let b = Tensor::scalar(1.0, DType::Float64);
        assert!(run(&registry, &node, &[a, b]).is_err());
    }

    #[test]
    fn test_const_fills_shape() {
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("c", OP_CONST)
            .with_attr("dtype", "float64")
            .with_attr("shape", serde_json::json!([2, 2]))
            .with_attr("value", 0.5);
        let out = run(&registry, &node, &[]).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.to_f64_vec(), vec![0.5; 4]);
    }

    #[test]
    fn test_lennard_jones_at_minimum_has_no_force() {
        // r = 2^(1/6) sigma is the potential minimum.
        let r_min = 2f64.powf(1.0 / 6.0);
        let nlist = Tensor::from_f64(
            vec![1, 2, 4],
            vec![r_min, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("lj", OP_LENNARD_JONES).with_inputs(["nlist"]);
        let out = run(&registry, &node, &[nlist]).unwrap().to_f64_vec();
        assert!(out[0].abs() < 1e-9);
        // Half of the -epsilon well depth.
        assert!((out[3] + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_lennard_jones_repels_close_neighbor() {
        let nlist = Tensor::from_f32(vec![1, 1, 4], vec![0.9, 0.0, 0.0, 1.0]).unwrap();
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("lj", OP_LENNARD_JONES).with_inputs(["nlist"]);
        let out = run(&registry, &node, &[nlist]).unwrap();
        assert_eq!(out.dtype(), DType::Float32);
        // Neighbor sits at +x; a repulsive force pushes i towards -x.
        assert!(out.to_f64_vec()[0] < 0.0);
    }

    #[test]
    fn test_buffer_input_views_region() {
        use crate::core::buffers::{BufferKind, RegionLayout, SharedRegion};

        let dir = tempfile::TempDir::new().unwrap();
        let region = SharedRegion::create(dir.path().join("r.shm"), RegionLayout::new(2, 1, DType::Float32)).unwrap();
        let view = BufferView::new(Arc::new(region), BufferKind::Positions);
        let node = NodeDef::new("positions", OP_BUFFER_INPUT);

        let kernel = OpRegistry::standard().require(OP_BUFFER_INPUT).unwrap();
        let mut variables = BTreeMap::new();
        let buffers = BTreeMap::from([("positions".to_string(), view)]);
        let mut ctx = KernelContext {
            node: &node,
            variables: &mut variables,
            buffers: &buffers,
        };
        let out = kernel.compute(&mut ctx, &[]).unwrap();
        assert!(out.is_mapped());
        assert_eq!(out.shape(), &[2, 4]);
    }

    #[test]
    fn test_arity_checked() {
        let registry = OpRegistry::builtin();
        let node = NodeDef::new("n", OP_NEG);
        assert!(matches!(
            registry.require(OP_NEG).unwrap().validate(&node),
            Err(BridgeError::Configuration(_))
        ));
    }
}
