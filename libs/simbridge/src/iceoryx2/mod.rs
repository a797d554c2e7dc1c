// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! iceoryx2-based control channel between the simulation and compute processes.

mod channel;
mod node;

pub use channel::{Iceoryx2ControlReceiver, Iceoryx2ControlSender};
pub use node::{control_service_names, ChannelServices, Iceoryx2Node, Iceoryx2Service};
