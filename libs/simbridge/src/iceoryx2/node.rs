// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node and services backing one control channel.
//!
//! A channel is a pair of pub/sub services under the run's base name:
//! `{service}/control` (simulation → compute, encoded messages) and
//! `{service}/ack` (compute → simulation, `Received`/`Done`). Each side
//! publishes on one and subscribes to the other.

use std::sync::Arc;

use iceoryx2::node::Node;
use iceoryx2::port::publisher::Publisher;
use iceoryx2::port::subscriber::Subscriber;
use iceoryx2::prelude::*;
use parking_lot::Mutex;
use simbridge_ipc_types::ControlPayload;

use crate::core::error::{BridgeError, Result};

pub(crate) type ControlPublisher = Publisher<ipc::Service, ControlPayload, ()>;
pub(crate) type ControlSubscriber = Subscriber<ipc::Service, ControlPayload, ()>;

/// Control and ack service names for a run's base service name.
pub fn control_service_names(service: &str) -> (String, String) {
    (format!("{}/control", service), format!("{}/ack", service))
}

/// Process-wide iceoryx2 node. Both directions of every channel the
/// process opens go through it.
#[derive(Clone)]
pub struct Iceoryx2Node {
    inner: Arc<Mutex<Node<ipc::Service>>>,
}

impl Iceoryx2Node {
    pub fn new() -> Result<Self> {
        let node = NodeBuilder::new()
            .create::<ipc::Service>()
            .map_err(|e| BridgeError::Ipc(format!("Failed to create iceoryx2 node: {:?}", e)))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(node)),
        })
    }

    /// Open one `ControlPayload` service, creating it if the peer has not.
    /// Either side may start first.
    pub fn open_or_create_service(&self, service_name: &str) -> Result<Iceoryx2Service> {
        let node = self.inner.lock();
        let name: ServiceName = service_name.try_into().map_err(|e| {
            BridgeError::Configuration(format!("Invalid service name '{}': {:?}", service_name, e))
        })?;

        let service = node
            .service_builder(&name)
            .publish_subscribe::<ControlPayload>()
            .open_or_create()
            .map_err(|e| {
                BridgeError::Ipc(format!(
                    "Failed to open/create service '{}': {:?}",
                    service_name, e
                ))
            })?;

        Ok(Iceoryx2Service {
            name: service_name.to_string(),
            inner: service,
        })
    }

    /// Open both services of the channel named `service`.
    pub fn open_channel(&self, service: &str) -> Result<ChannelServices> {
        let (control, ack) = control_service_names(service);
        Ok(ChannelServices {
            control: self.open_or_create_service(&control)?,
            ack: self.open_or_create_service(&ack)?,
        })
    }
}

/// One publish-subscribe service carrying [`ControlPayload`]s.
pub struct Iceoryx2Service {
    name: String,
    inner: iceoryx2::service::port_factory::publish_subscribe::PortFactory<
        ipc::Service,
        ControlPayload,
        (),
    >,
}

impl Iceoryx2Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_publisher(&self) -> Result<ControlPublisher> {
        self.inner.publisher_builder().create().map_err(|e| {
            BridgeError::Ipc(format!("Failed to create publisher on '{}': {:?}", self.name, e))
        })
    }

    pub fn create_subscriber(&self) -> Result<ControlSubscriber> {
        self.inner.subscriber_builder().create().map_err(|e| {
            BridgeError::Ipc(format!("Failed to create subscriber on '{}': {:?}", self.name, e))
        })
    }
}

/// The control and ack services of one channel.
pub struct ChannelServices {
    pub control: Iceoryx2Service,
    pub ack: Iceoryx2Service,
}

impl ChannelServices {
    /// Simulation side: publish messages, subscribe to acks.
    pub fn sender_ports(&self) -> Result<(ControlPublisher, ControlSubscriber)> {
        Ok((self.control.create_publisher()?, self.ack.create_subscriber()?))
    }

    /// Compute side: subscribe to messages, publish acks.
    pub fn receiver_ports(&self) -> Result<(ControlSubscriber, ControlPublisher)> {
        Ok((self.control.create_subscriber()?, self.ack.create_publisher()?))
    }
}
