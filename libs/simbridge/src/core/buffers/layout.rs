// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::dtype::DType;

/// Bytes reserved at the start of the region for the header.
pub const HEADER_SIZE: usize = 64;

const BUFFER_ALIGN: usize = 64;

/// The four per-particle buffers, in region order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    Positions,
    Neighbors,
    Forces,
    Virial,
}

impl BufferKind {
    pub const ALL: [BufferKind; 4] = [
        BufferKind::Positions,
        BufferKind::Neighbors,
        BufferKind::Forces,
        BufferKind::Virial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Positions => "positions",
            BufferKind::Neighbors => "nlist",
            BufferKind::Forces => "forces",
            BufferKind::Virial => "virial",
        }
    }

    /// Element shape for `n` particles with `nn` neighbor slots each.
    pub fn shape(self, n: usize, nn: usize) -> Vec<usize> {
        match self {
            BufferKind::Positions | BufferKind::Forces => vec![n, 4],
            BufferKind::Neighbors => vec![n, nn, 4],
            // 3×3 stress contribution per particle, flattened.
            BufferKind::Virial => vec![n, 9],
        }
    }
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Extents and element type of a region. Stored in the header so the
/// compute side can check them against its graph descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLayout {
    pub n: usize,
    pub nn: usize,
    pub dtype: DType,
}

impl RegionLayout {
    pub fn new(n: usize, nn: usize, dtype: DType) -> Self {
        Self { n, nn, dtype }
    }

    pub fn shape(&self, kind: BufferKind) -> Vec<usize> {
        kind.shape(self.n, self.nn)
    }

    pub fn element_count(&self, kind: BufferKind) -> usize {
        self.shape(kind).iter().product()
    }

    pub fn byte_len(&self, kind: BufferKind) -> usize {
        self.element_count(kind) * self.dtype.size_of()
    }

    /// Byte offset of `kind` from the start of the region.
    pub fn offset(&self, kind: BufferKind) -> usize {
        let mut offset = HEADER_SIZE;
        for candidate in BufferKind::ALL {
            if candidate == kind {
                return offset;
            }
            offset = align_up(offset + self.byte_len(candidate), BUFFER_ALIGN);
        }
        offset
    }

    /// Total region size in bytes.
    pub fn total_len(&self) -> usize {
        let last = BufferKind::Virial;
        align_up(self.offset(last) + self.byte_len(last), BUFFER_ALIGN)
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}
