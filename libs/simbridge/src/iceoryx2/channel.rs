// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Task-queue semantics over two iceoryx2 pub/sub services.
//!
//! `{service}/control` carries encoded [`ControlMessage`]s from the
//! simulation side; `{service}/ack` carries `Received`/`Done` acks back.
//! Messages are numbered from 1. The sender republishes a message until it
//! is acknowledged, and the receiver drops duplicates by sequence number
//! and re-acks them, so each message is delivered to `recv` exactly once
//! even when samples are lost to a full subscriber buffer.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use iceoryx2::port::publisher::Publisher;
use iceoryx2::port::subscriber::Subscriber;
use iceoryx2::prelude::*;
use simbridge_ipc_types::{ControlPayload, PayloadKind, MAX_CONTROL_PAYLOAD_SIZE};

use super::node::Iceoryx2Node;
use crate::core::channel::{ControlReceiver, ControlSender};
use crate::core::descriptor::ControlMessage;
use crate::core::error::{BridgeError, Result};

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Resend period for a message nobody has acknowledged yet.
const RESEND_INTERVAL: Duration = Duration::from_millis(50);

/// Resend period for a received message whose `Done` has not arrived.
/// Long, since the compute side may just be busy with it.
const DONE_RESEND_INTERVAL: Duration = Duration::from_secs(1);

/// How long `flush` keeps republishing the end-of-queue marker.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn publish(
    publisher: &Publisher<ipc::Service, ControlPayload, ()>,
    payload: ControlPayload,
) -> Result<()> {
    let sample = publisher
        .loan_uninit()
        .map_err(|e| BridgeError::Ipc(format!("Failed to loan sample: {:?}", e)))?;
    let sample = sample.write_payload(payload);
    sample
        .send()
        .map_err(|e| BridgeError::Ipc(format!("Failed to send sample: {:?}", e)))?;
    Ok(())
}

struct InFlight {
    bytes: Vec<u8>,
    received: bool,
    needs_done: bool,
    last_sent: Instant,
}

/// Simulation side of the iceoryx2 control channel.
pub struct Iceoryx2ControlSender {
    publisher: Publisher<ipc::Service, ControlPayload, ()>,
    ack_subscriber: Subscriber<ipc::Service, ControlPayload, ()>,
    next_seq: u64,
    in_flight: BTreeMap<u64, InFlight>,
    closed: bool,
}

impl Iceoryx2ControlSender {
    pub fn open(node: &Iceoryx2Node, service: &str) -> Result<Self> {
        let (publisher, ack_subscriber) = node.open_channel(service)?.sender_ports()?;
        tracing::info!("Opened control channel sender on '{}'", service);
        Ok(Self {
            publisher,
            ack_subscriber,
            next_seq: 1,
            in_flight: BTreeMap::new(),
            closed: false,
        })
    }

    fn enqueue(&mut self, message: &ControlMessage, needs_done: bool) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(message).map_err(|e| {
            BridgeError::Serialization(format!("Failed to encode {} message: {}", message.kind(), e))
        })?;
        let seq = self.next_seq;
        let payload = ControlPayload::message(seq, &bytes).map_err(|e| {
            BridgeError::Ipc(format!(
                "{} message is {} bytes, limit is {}",
                message.kind(),
                e.len,
                MAX_CONTROL_PAYLOAD_SIZE
            ))
        })?;
        publish(&self.publisher, payload)?;
        self.next_seq += 1;
        self.in_flight.insert(
            seq,
            InFlight {
                bytes,
                received: false,
                needs_done,
                last_sent: Instant::now(),
            },
        );
        tracing::trace!("Sent {} message seq={}", message.kind(), seq);
        Ok(())
    }

    fn pump_acks(&mut self) -> Result<()> {
        while let Some(sample) = self
            .ack_subscriber
            .receive()
            .map_err(|e| BridgeError::Ipc(format!("Failed to receive ack: {:?}", e)))?
        {
            let ack = sample.payload();
            match ack.kind() {
                Some(PayloadKind::Received) => {
                    let finished = match self.in_flight.get_mut(&ack.seq) {
                        Some(entry) => {
                            entry.received = true;
                            !entry.needs_done
                        }
                        None => false,
                    };
                    if finished {
                        self.in_flight.remove(&ack.seq);
                    }
                }
                Some(PayloadKind::Done) => {
                    self.in_flight.remove(&ack.seq);
                }
                other => tracing::warn!("Ignoring unexpected ack {:?} seq={}", other, ack.seq),
            }
        }
        Ok(())
    }

    fn resend_due(&mut self) -> Result<()> {
        let now = Instant::now();
        for (seq, entry) in self.in_flight.iter_mut() {
            let interval = if entry.received {
                DONE_RESEND_INTERVAL
            } else {
                RESEND_INTERVAL
            };
            if now.duration_since(entry.last_sent) < interval {
                continue;
            }
            let payload = ControlPayload::message(*seq, &entry.bytes)
                .map_err(|e| BridgeError::Ipc(format!("Resend of {} bytes failed", e.len)))?;
            publish(&self.publisher, payload)?;
            entry.last_sent = now;
            tracing::trace!("Resent control message seq={}", seq);
        }
        Ok(())
    }
}

impl ControlSender for Iceoryx2ControlSender {
    fn send(&mut self, message: ControlMessage) -> Result<()> {
        if matches!(message, ControlMessage::Close) {
            return self.close();
        }
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }
        self.enqueue(&message, true)
    }

    fn join(&mut self) -> Result<()> {
        loop {
            self.pump_acks()?;
            if !self.in_flight.values().any(|entry| entry.needs_done) {
                return Ok(());
            }
            self.resend_due()?;
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.enqueue(&ControlMessage::Close, false)
    }

    fn flush(&mut self) -> Result<()> {
        let started = Instant::now();
        loop {
            self.pump_acks()?;
            if self.in_flight.is_empty() {
                return Ok(());
            }
            if started.elapsed() > FLUSH_TIMEOUT {
                return Err(BridgeError::Ipc(format!(
                    "{} control messages still unacknowledged after {:?}",
                    self.in_flight.len(),
                    FLUSH_TIMEOUT
                )));
            }
            self.resend_due()?;
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Compute side of the iceoryx2 control channel.
pub struct Iceoryx2ControlReceiver {
    subscriber: Subscriber<ipc::Service, ControlPayload, ()>,
    ack_publisher: Publisher<ipc::Service, ControlPayload, ()>,
    /// Highest sequence number handed out by `recv`.
    delivered: u64,
    pending: BTreeMap<u64, ControlMessage>,
    unfinished: VecDeque<u64>,
    closed: bool,
}

impl Iceoryx2ControlReceiver {
    pub fn open(node: &Iceoryx2Node, service: &str) -> Result<Self> {
        let (subscriber, ack_publisher) = node.open_channel(service)?.receiver_ports()?;
        tracing::info!("Opened control channel receiver on '{}'", service);
        Ok(Self {
            subscriber,
            ack_publisher,
            delivered: 0,
            pending: BTreeMap::new(),
            unfinished: VecDeque::new(),
            closed: false,
        })
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(sample) = self
            .subscriber
            .receive()
            .map_err(|e| BridgeError::Ipc(format!("Failed to receive control sample: {:?}", e)))?
        {
            let payload = sample.payload();
            if payload.kind() != Some(PayloadKind::Message) {
                tracing::warn!("Ignoring non-message control sample {:?}", payload);
                continue;
            }
            let seq = payload.seq;

            if seq <= self.delivered || self.pending.contains_key(&seq) {
                let already_done = seq <= self.delivered && !self.unfinished.contains(&seq);
                let ack = if already_done {
                    ControlPayload::done(seq)
                } else {
                    ControlPayload::received(seq)
                };
                publish(&self.ack_publisher, ack)?;
                continue;
            }

            let message: ControlMessage = rmp_serde::from_slice(payload.data()).map_err(|e| {
                BridgeError::Serialization(format!("Failed to decode control message {}: {}", seq, e))
            })?;
            self.pending.insert(seq, message);
            publish(&self.ack_publisher, ControlPayload::received(seq))?;
        }
        Ok(())
    }
}

impl ControlReceiver for Iceoryx2ControlReceiver {
    fn recv(&mut self) -> Result<Option<ControlMessage>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            self.drain()?;
            let next = self.delivered + 1;
            if let Some(message) = self.pending.remove(&next) {
                self.delivered = next;
                if matches!(message, ControlMessage::Close) {
                    tracing::debug!("Control channel closed at seq={}", next);
                    self.closed = true;
                    return Ok(None);
                }
                self.unfinished.push_back(next);
                return Ok(Some(message));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn task_done(&mut self) -> Result<()> {
        let seq = self.unfinished.pop_front().ok_or_else(|| {
            BridgeError::Ipc("task_done() called more times than items were received".into())
        })?;
        publish(&self.ack_publisher, ControlPayload::done(seq))
    }
}

