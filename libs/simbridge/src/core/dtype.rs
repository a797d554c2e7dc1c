// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Element types and the single conversion point between them.

use serde::{Deserialize, Serialize};

use crate::core::tensor::{Tensor, TensorData, Values};

/// Element type of a tensor or shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::Float32 => std::mem::size_of::<f32>(),
            DType::Float64 => std::mem::size_of::<f64>(),
        }
    }

    /// Stable code stored in the shared region header.
    pub fn code(self) -> u32 {
        match self {
            DType::Float32 => 1,
            DType::Float64 => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(DType::Float32),
            2 => Some(DType::Float64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert `tensor` to `target`, element by element.
///
/// Every dtype boundary in the bridge goes through here: buffer reads into a
/// graph of another precision, graph outputs written back to a buffer, feed
/// values, and the `Cast` operator. Values are converted numerically; bytes
/// are never reinterpreted.
pub fn coerce(tensor: &Tensor, target: DType) -> Tensor {
    if tensor.dtype() == target {
        return tensor.clone();
    }
    let data = match (tensor.values(), target) {
        (Values::Float32(values), DType::Float64) => {
            TensorData::Float64(values.iter().map(|&v| f64::from(v)).collect())
        }
        (Values::Float64(values), DType::Float32) => {
            TensorData::Float32(values.iter().map(|&v| v as f32).collect())
        }
        (values, _) => values.to_owned_data(),
    };
    Tensor::from_data(tensor.shape().to_vec(), data)
}
