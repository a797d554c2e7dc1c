// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process control channel over crossbeam.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use super::{ControlReceiver, ControlSender};
use crate::core::descriptor::ControlMessage;
use crate::core::error::{BridgeError, Result};

#[derive(Default)]
struct Completion {
    outstanding: usize,
    receiver_alive: bool,
}

struct Shared {
    completion: Mutex<Completion>,
    changed: Condvar,
}

/// Create a connected sender/receiver pair.
pub fn local_channel() -> (LocalControlSender, LocalControlReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let shared = Arc::new(Shared {
        completion: Mutex::new(Completion {
            outstanding: 0,
            receiver_alive: true,
        }),
        changed: Condvar::new(),
    });
    (
        LocalControlSender {
            tx,
            shared: Arc::clone(&shared),
            closed: false,
        },
        LocalControlReceiver {
            rx,
            shared,
            unfinished: 0,
            closed: false,
        },
    )
}

pub struct LocalControlSender {
    tx: Sender<ControlMessage>,
    shared: Arc<Shared>,
    closed: bool,
}

impl ControlSender for LocalControlSender {
    fn send(&mut self, message: ControlMessage) -> Result<()> {
        if matches!(message, ControlMessage::Close) {
            return self.close();
        }
        if self.closed {
            return Err(BridgeError::ChannelClosed);
        }

        self.shared.completion.lock().outstanding += 1;
        if self.tx.send(message).is_err() {
            self.shared.completion.lock().outstanding -= 1;
            return Err(BridgeError::ChannelClosed);
        }
        Ok(())
    }

    fn join(&mut self) -> Result<()> {
        let mut completion = self.shared.completion.lock();
        while completion.outstanding > 0 {
            if !completion.receiver_alive {
                return Err(BridgeError::ChannelClosed);
            }
            self.shared.changed.wait(&mut completion);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // A receiver that already went away has nothing left to stop.
        let _ = self.tx.send(ControlMessage::Close);
        Ok(())
    }
}

pub struct LocalControlReceiver {
    rx: Receiver<ControlMessage>,
    shared: Arc<Shared>,
    unfinished: usize,
    closed: bool,
}

impl ControlReceiver for LocalControlReceiver {
    fn recv(&mut self) -> Result<Option<ControlMessage>> {
        if self.closed {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(ControlMessage::Close) | Err(_) => {
                self.closed = true;
                Ok(None)
            }
            Ok(message) => {
                self.unfinished += 1;
                Ok(Some(message))
            }
        }
    }

    fn task_done(&mut self) -> Result<()> {
        if self.unfinished == 0 {
            return Err(BridgeError::Ipc(
                "task_done() called more times than items were received".into(),
            ));
        }
        self.unfinished -= 1;

        let mut completion = self.shared.completion.lock();
        completion.outstanding = completion.outstanding.saturating_sub(1);
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl Drop for LocalControlReceiver {
    fn drop(&mut self) {
        self.shared.completion.lock().receiver_alive = false;
        self.shared.changed.notify_all();
    }
}
