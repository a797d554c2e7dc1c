// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Out-of-process compute bridge for stepping simulations.
//!
//! The simulation side ([`BridgeHost`]) and the compute side
//! ([`run_compute`]) share one memory-mapped region holding the position,
//! neighbor-list, force and virial buffers plus a rendezvous word, and talk
//! over a small control channel (in-process or iceoryx2).

#![allow(clippy::type_complexity)] // Complex types are clear in context

pub mod core;
pub mod iceoryx2;

pub use crate::core::{
    init_logging, local_channel, run_compute, set_log_file, BridgeConfig, BridgeError, BridgeHost, BridgeManager,
    BufferKind, ComputeGraph, ComputeProcess, ComputeProcessConfig, ControlMessage, ControlReceiver,
    ControlSender, DType, FeedOverrides, GraphDescriptor, OpRegistry, Result, RunSummary, Tensor,
};
pub use crate::iceoryx2::{Iceoryx2ControlReceiver, Iceoryx2ControlSender, Iceoryx2Node};
