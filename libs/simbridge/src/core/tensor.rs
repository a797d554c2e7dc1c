// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Dense tensors exchanged between buffers, feeds and the graph runtime.
//!
//! A tensor either owns its elements or views a shared buffer in place. A
//! mapped tensor is only meaningful for the turn it was taken in; anything
//! kept past the turn goes through [`Tensor::detached`].

use serde::{Deserialize, Serialize};

use crate::core::buffers::BufferView;
use crate::core::dtype::DType;
use crate::core::error::{BridgeError, Result};

/// Typed element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorData {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Float32(_) => DType::Float32,
            TensorData::Float64(_) => DType::Float64,
        }
    }

    fn values(&self) -> Values<'_> {
        match self {
            TensorData::Float32(v) => Values::Float32(v),
            TensorData::Float64(v) => Values::Float64(v),
        }
    }
}

/// Borrowed elements of a tensor, owned or mapped alike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Values<'a> {
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

impl Values<'_> {
    pub fn len(&self) -> usize {
        match self {
            Values::Float32(v) => v.len(),
            Values::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` widened to f64. Panics past the end, like slice indexing.
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Values::Float32(v) => f64::from(v[i]),
            Values::Float64(v) => v[i],
        }
    }

    pub fn to_owned_data(&self) -> TensorData {
        match self {
            Values::Float32(v) => TensorData::Float32(v.to_vec()),
            Values::Float64(v) => TensorData::Float64(v.to_vec()),
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    Owned(TensorData),
    Mapped(BufferView),
}

/// A shaped, typed, row-major array. A scalar has an empty shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    storage: Storage,
}

/// Wire form of a tensor; decoding goes through the same shape check as
/// [`Tensor::new`].
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = BridgeError;

    fn try_from(raw: RawTensor) -> Result<Self> {
        Tensor::new(raw.shape, raw.data)
    }
}

#[derive(Serialize)]
struct RawTensorRef<'a> {
    shape: &'a [usize],
    data: Values<'a>,
}

impl Serialize for Tensor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawTensorRef {
            shape: &self.shape,
            data: self.values(),
        }
        .serialize(serializer)
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.values() == other.values()
    }
}

impl Tensor {
    /// Build a tensor, checking that `shape` covers exactly `data.len()` elements.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(BridgeError::Graph(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self::from_data(shape, data))
    }

    /// Caller guarantees `shape` matches `data`.
    pub(crate) fn from_data(shape: Vec<usize>, data: TensorData) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self {
            shape,
            storage: Storage::Owned(data),
        }
    }

    /// View a shared buffer in place, shaped like the buffer.
    pub(crate) fn mapped(view: BufferView) -> Self {
        Self {
            shape: view.shape().to_vec(),
            storage: Storage::Mapped(view),
        }
    }

    pub fn from_f32(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorData::Float32(values))
    }

    pub fn from_f64(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        Self::new(shape, TensorData::Float64(values))
    }

    /// Build from f64 values rounded to `dtype`.
    pub fn from_f64_as(shape: Vec<usize>, values: Vec<f64>, dtype: DType) -> Result<Self> {
        let data = match dtype {
            DType::Float64 => TensorData::Float64(values),
            DType::Float32 => TensorData::Float32(values.into_iter().map(|v| v as f32).collect()),
        };
        Self::new(shape, data)
    }

    pub fn scalar(value: f64, dtype: DType) -> Self {
        let data = match dtype {
            DType::Float64 => TensorData::Float64(vec![value]),
            DType::Float32 => TensorData::Float32(vec![value as f32]),
        };
        Self::from_data(Vec::new(), data)
    }

    pub fn zeros(shape: Vec<usize>, dtype: DType) -> Self {
        let len = shape.iter().product();
        let data = match dtype {
            DType::Float32 => TensorData::Float32(vec![0.0; len]),
            DType::Float64 => TensorData::Float64(vec![0.0; len]),
        };
        Self::from_data(shape, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> Values<'_> {
        match &self.storage {
            Storage::Owned(data) => data.values(),
            Storage::Mapped(view) => view.values(),
        }
    }

    /// Whether this tensor reads a shared buffer in place.
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// An owning tensor with the same contents. Copies only mapped tensors.
    pub fn detached(self) -> Self {
        match self.storage {
            Storage::Owned(_) => self,
            Storage::Mapped(view) => Self::from_data(self.shape, view.values().to_owned_data()),
        }
    }

    pub fn dtype(&self) -> DType {
        match &self.storage {
            Storage::Owned(data) => data.dtype(),
            Storage::Mapped(view) => view.dtype(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar_like(&self) -> bool {
        self.len() == 1
    }

    /// Elements widened to f64, without collecting.
    pub fn iter_f64(&self) -> impl Iterator<Item = f64> + '_ {
        let values = self.values();
        (0..values.len()).map(move |i| values.get(i))
    }

    /// Widen every element to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter_f64().collect()
    }

    /// Same data, new shape with the same element count.
    pub fn reshaped(&self, shape: Vec<usize>) -> Result<Self> {
        Self::new(shape, self.values().to_owned_data())
    }
}
