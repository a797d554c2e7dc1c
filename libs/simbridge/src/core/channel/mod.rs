// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control channel: a task queue with completion tracking.
//!
//! The simulation side `send`s items and `join`s until each one was marked
//! done; the compute side `recv`s them and calls `task_done` once it has
//! finished with each. `Close` is the end-of-queue marker: receivers turn
//! it (or a vanished sender) into `Ok(None)`, and it is never marked done.

mod local;

pub use local::{local_channel, LocalControlReceiver, LocalControlSender};

use crate::core::descriptor::ControlMessage;
use crate::core::error::Result;

/// Compute side of the control channel.
pub trait ControlReceiver {
    /// Block for the next item. `Ok(None)` once the channel is closed.
    fn recv(&mut self) -> Result<Option<ControlMessage>>;

    /// Mark the oldest received, not yet completed item as done.
    fn task_done(&mut self) -> Result<()>;
}

/// Simulation side of the control channel.
pub trait ControlSender {
    fn send(&mut self, message: ControlMessage) -> Result<()>;

    /// Block until every sent item has been marked done.
    fn join(&mut self) -> Result<()>;

    /// Enqueue the end-of-queue marker.
    fn close(&mut self) -> Result<()>;

    /// Block until the end-of-queue marker reached the receiver. Only
    /// meaningful when the receiver is still reading (feed-driven mode).
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
