// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wire-compatible payload types for the simbridge control channel.
//!
//! Both the simulation host and the compute runtime link this crate so the
//! `#[repr(C)]` layout published through iceoryx2 is identical on each side.

use iceoryx2::prelude::*;

/// Maximum number of encoded message bytes carried by one [`ControlPayload`].
pub const MAX_CONTROL_PAYLOAD_SIZE: usize = 64 * 1024;

/// What a [`ControlPayload`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PayloadKind {
    /// An encoded control message (host → compute).
    Message = 1,
    /// The receiver has seen the message with this sequence number.
    Received = 2,
    /// The receiver has finished processing the message (queue `task_done`).
    Done = 3,
}

impl PayloadKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Message),
            2 => Some(Self::Received),
            3 => Some(Self::Done),
            _ => None,
        }
    }
}

/// Returned when an encoded message does not fit in [`MAX_CONTROL_PAYLOAD_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadTooLarge {
    pub len: usize,
}

/// Fixed-size sample published on the control and ack services.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct ControlPayload {
    kind: u32,
    len: u32,
    /// Monotonic per-sender sequence number, starting at 1.
    pub seq: u64,
    data: [u8; MAX_CONTROL_PAYLOAD_SIZE],
}

// SAFETY: `#[repr(C)]`, only plain integers and a byte array, no pointers or
// process-local handles.
unsafe impl ZeroCopySend for ControlPayload {}

impl ControlPayload {
    /// Wrap encoded message bytes.
    pub fn message(seq: u64, bytes: &[u8]) -> Result<Self, PayloadTooLarge> {
        if bytes.len() > MAX_CONTROL_PAYLOAD_SIZE {
            return Err(PayloadTooLarge { len: bytes.len() });
        }
        let mut payload = Self::empty(PayloadKind::Message, seq);
        payload.data[..bytes.len()].copy_from_slice(bytes);
        payload.len = bytes.len() as u32;
        Ok(payload)
    }

    pub fn received(seq: u64) -> Self {
        Self::empty(PayloadKind::Received, seq)
    }

    pub fn done(seq: u64) -> Self {
        Self::empty(PayloadKind::Done, seq)
    }

    fn empty(kind: PayloadKind, seq: u64) -> Self {
        Self {
            kind: kind as u32,
            len: 0,
            seq,
            data: [0u8; MAX_CONTROL_PAYLOAD_SIZE],
        }
    }

    /// `None` if the sample was written by an incompatible peer.
    pub fn kind(&self) -> Option<PayloadKind> {
        PayloadKind::from_u32(self.kind)
    }

    /// Encoded message bytes (empty for acks).
    pub fn data(&self) -> &[u8] {
        let len = (self.len as usize).min(MAX_CONTROL_PAYLOAD_SIZE);
        &self.data[..len]
    }
}

impl std::fmt::Debug for ControlPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPayload")
            .field("kind", &self.kind())
            .field("seq", &self.seq)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_payload_keeps_bytes() {
        let payload = ControlPayload::message(7, b"hello").unwrap();
        assert_eq!(payload.kind(), Some(PayloadKind::Message));
        assert_eq!(payload.seq, 7);
        assert_eq!(payload.data(), b"hello");
    }

    #[test]
    fn test_oversized_message_rejected() {
        let bytes = vec![0u8; MAX_CONTROL_PAYLOAD_SIZE + 1];
        let err = ControlPayload::message(1, &bytes).unwrap_err();
        assert_eq!(err.len, MAX_CONTROL_PAYLOAD_SIZE + 1);
    }

    #[test]
    fn test_acks_carry_no_data() {
        assert_eq!(ControlPayload::received(3).kind(), Some(PayloadKind::Received));
        assert!(ControlPayload::done(3).data().is_empty());
    }
}
