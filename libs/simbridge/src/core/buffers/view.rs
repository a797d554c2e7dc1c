// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::layout::BufferKind;
use super::region::SharedRegion;
use crate::core::dtype::{coerce, DType};
use crate::core::error::{BridgeError, Result};
use crate::core::tensor::{Tensor, Values};

/// Base address, element shape and element dtype of one buffer, resolved
/// in the local mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub address: usize,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl BufferDescriptor {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// One past the last byte of the buffer.
    pub fn end_address(&self) -> usize {
        self.address + self.element_count() * self.dtype.size_of()
    }
}

impl std::fmt::Display for BufferDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:#x}..{:#x} {:?} {}",
            self.address,
            self.end_address(),
            self.shape,
            self.dtype
        )
    }
}

/// Non-owning, fixed-shape view of one buffer in a [`SharedRegion`].
#[derive(Debug, Clone)]
pub struct BufferView {
    region: Arc<SharedRegion>,
    kind: BufferKind,
    descriptor: BufferDescriptor,
}

impl BufferView {
    pub fn new(region: Arc<SharedRegion>, kind: BufferKind) -> Self {
        let layout = region.layout();
        let descriptor = BufferDescriptor {
            address: region.buffer_address(kind),
            shape: layout.shape(kind),
            dtype: layout.dtype,
        };
        Self {
            region,
            kind,
            descriptor,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn dtype(&self) -> DType {
        self.descriptor.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.descriptor.shape
    }

    pub fn element_count(&self) -> usize {
        self.descriptor.element_count()
    }

    /// The buffer's elements, borrowed straight from the mapping.
    ///
    /// Only valid while the caller holds the turn.
    pub(crate) fn values(&self) -> Values<'_> {
        let len = self.element_count();
        let ptr = self.region.buffer_ptr(self.kind);
        // SAFETY: `ptr` is 64-byte aligned inside the mapping and the layout
        // reserves `len` elements of `dtype` there. The returned slice borrows
        // `self`, whose `Arc` keeps the mapping alive.
        unsafe {
            match self.descriptor.dtype {
                DType::Float32 => Values::Float32(std::slice::from_raw_parts(ptr.cast::<f32>(), len)),
                DType::Float64 => Values::Float64(std::slice::from_raw_parts(ptr.cast::<f64>(), len)),
            }
        }
    }

    /// A tensor reading this buffer in place, for use within one turn.
    pub fn tensor(&self) -> Tensor {
        Tensor::mapped(self.clone())
    }

    /// Copy the current contents out as an owning tensor of the declared
    /// shape. For the host reading results back between turns.
    pub fn read(&self) -> Tensor {
        self.tensor().detached()
    }

    /// Write `tensor` into the start of the buffer, converted to the
    /// buffer's native dtype.
    ///
    /// Fails if `capacity` exceeds the buffer or `tensor` has more than
    /// `capacity` elements. Only valid while the caller holds the turn.
    pub fn write(&self, tensor: &Tensor, capacity: usize) -> Result<()> {
        let available = self.element_count();
        if capacity > available {
            return Err(BridgeError::Buffer(format!(
                "{} write capacity {} exceeds buffer size {}",
                self.kind, capacity, available
            )));
        }
        if tensor.len() > capacity {
            return Err(BridgeError::Buffer(format!(
                "{} write of {} elements exceeds capacity {}",
                self.kind,
                tensor.len(),
                capacity
            )));
        }

        let native = coerce(tensor, self.descriptor.dtype);
        let ptr = self.region.buffer_ptr(self.kind);
        // SAFETY: bounds checked above against the buffer's element count;
        // the destination is aligned for its dtype and lives in the mapping.
        unsafe {
            match native.values() {
                Values::Float32(values) => {
                    std::ptr::copy_nonoverlapping(values.as_ptr(), ptr.cast::<f32>(), values.len())
                }
                Values::Float64(values) => {
                    std::ptr::copy_nonoverlapping(values.as_ptr(), ptr.cast::<f64>(), values.len())
                }
            }
        }
        Ok(())
    }
}

/// Views of all four buffers of one region.
#[derive(Debug, Clone)]
pub struct BufferSet {
    region: Arc<SharedRegion>,
    positions: BufferView,
    neighbors: BufferView,
    forces: BufferView,
    virial: BufferView,
}

impl BufferSet {
    /// Build views over `region`, checking its extents against the
    /// particle count `n` and neighbor capacity `nn` the graph expects.
    pub fn attach(region: Arc<SharedRegion>, n: usize, nn: usize) -> Result<Self> {
        let layout = region.layout();
        if layout.n != n || layout.nn != nn {
            return Err(BridgeError::Configuration(format!(
                "buffer extents N={} NN={} do not match graph descriptor N={} NN={}",
                layout.n, layout.nn, n, nn
            )));
        }

        let set = Self {
            positions: BufferView::new(Arc::clone(&region), BufferKind::Positions),
            neighbors: BufferView::new(Arc::clone(&region), BufferKind::Neighbors),
            forces: BufferView::new(Arc::clone(&region), BufferKind::Forces),
            virial: BufferView::new(Arc::clone(&region), BufferKind::Virial),
            region,
        };
        for view in set.views() {
            tracing::info!("Attached {} buffer at {}", view.kind(), view.descriptor());
        }
        Ok(set)
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    pub fn view(&self, kind: BufferKind) -> &BufferView {
        match kind {
            BufferKind::Positions => &self.positions,
            BufferKind::Neighbors => &self.neighbors,
            BufferKind::Forces => &self.forces,
            BufferKind::Virial => &self.virial,
        }
    }

    pub fn views(&self) -> [&BufferView; 4] {
        [&self.positions, &self.neighbors, &self.forces, &self.virial]
    }

    /// One-line summary of every buffer address, for fatal error logs.
    pub fn describe(&self) -> String {
        self.views()
            .iter()
            .map(|v| format!("{}={:#x}", v.kind(), v.descriptor().address))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
