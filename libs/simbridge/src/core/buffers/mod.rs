// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared buffer region: fixed-extent memory the simulation owns and the
//! compute process views in place.
//!
//! One file-backed `MAP_SHARED` region holds a small header (magic, layout
//! and the rendezvous word) followed by the four per-particle buffers:
//!
//! ```text
//! [header 64B][positions N×4][neighbors N×NN×4][forces N×4][virial N×9]
//! ```
//!
//! Every buffer starts on a 64-byte boundary. Extents are fixed for the life
//! of the region, so a view can never address memory outside its buffer.

mod layout;
mod region;
mod view;

pub use layout::{BufferKind, RegionLayout, HEADER_SIZE};
pub use region::SharedRegion;
pub use view::{BufferDescriptor, BufferSet, BufferView};
