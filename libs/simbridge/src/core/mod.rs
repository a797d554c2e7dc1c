// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod adapter;
pub mod bridge;
pub mod buffers;
pub mod channel;
pub mod checkpoint;
pub mod config;
pub mod descriptor;
pub mod dtype;
pub mod error;
pub mod execution;
pub mod graph;
pub mod host;
pub mod logging;
pub mod rendezvous;
pub mod simbridge_home;
pub mod subprocess;
pub mod tensor;
pub mod turns;

pub use adapter::{AdaptedGraph, GraphAdapter, BRIDGE_SCOPE};
pub use bridge::{run_compute, BridgeManager};
pub use buffers::{BufferDescriptor, BufferKind, BufferSet, BufferView, RegionLayout, SharedRegion};
pub use channel::{local_channel, ControlReceiver, ControlSender, LocalControlReceiver, LocalControlSender};
pub use checkpoint::CheckpointManager;
pub use config::BridgeConfig;
pub use descriptor::{ControlMessage, FeedOverrides, GraphDescriptor, StartupMessage};
pub use dtype::{coerce, DType};
pub use error::*;
pub use execution::{BridgeState, ExecutionLoop, RunSummary};
pub use graph::{ComputeGraph, Dataflow, GraphDef, NodeDef, OpKernel, OpRegistry, TensorHandle};
pub use host::BridgeHost;
pub use logging::{init_logging, set_log_file};
pub use rendezvous::{HostTurnLock, Rendezvous, TurnLock};
pub use simbridge_home::*;
pub use subprocess::{ComputeProcess, ComputeProcessConfig, RUNTIME_BINARY};
pub use tensor::{Tensor, TensorData, Values};
pub use turns::{FeedTurns, LockTurns, Turn, TurnSource};
