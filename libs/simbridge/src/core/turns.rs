// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! One "wait for my turn" abstraction over both synchronization modes, so
//! the execution loop does not care which one is in use.

use crate::core::channel::ControlReceiver;
use crate::core::descriptor::{ControlMessage, FeedOverrides};
use crate::core::error::{BridgeError, Result};
use crate::core::rendezvous::Rendezvous;

#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Run one step, with these overrides (empty in lock-driven mode).
    Proceed(FeedOverrides),
    Shutdown,
}

pub trait TurnSource {
    fn wait_for_turn(&mut self) -> Result<Turn>;

    /// Release the turn taken by the last `Proceed`.
    fn complete_turn(&mut self) -> Result<()>;

    fn mode(&self) -> &'static str;
}

/// Lock-driven mode: turns come from the rendezvous word.
pub struct LockTurns<R: Rendezvous> {
    lock: R,
}

impl<R: Rendezvous> LockTurns<R> {
    pub fn new(lock: R) -> Self {
        Self { lock }
    }

    pub fn into_inner(self) -> R {
        self.lock
    }
}

impl<R: Rendezvous> TurnSource for LockTurns<R> {
    fn wait_for_turn(&mut self) -> Result<Turn> {
        if self.lock.start()? {
            Ok(Turn::Proceed(FeedOverrides::new()))
        } else {
            Ok(Turn::Shutdown)
        }
    }

    fn complete_turn(&mut self) -> Result<()> {
        self.lock.end()
    }

    fn mode(&self) -> &'static str {
        "lock"
    }
}

/// Feed-driven mode: each feed message is a turn; closure ends the run.
pub struct FeedTurns<C: ControlReceiver> {
    channel: C,
}

impl<C: ControlReceiver> FeedTurns<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }
}

impl<C: ControlReceiver> TurnSource for FeedTurns<C> {
    fn wait_for_turn(&mut self) -> Result<Turn> {
        match self.channel.recv()? {
            None => Ok(Turn::Shutdown),
            Some(ControlMessage::Feed(overrides)) => Ok(Turn::Proceed(overrides)),
            Some(other) => {
                // Complete it so the sender's join() does not hang on it.
                self.channel.task_done()?;
                Err(BridgeError::Ipc(format!(
                    "unexpected {} message while running",
                    other.kind()
                )))
            }
        }
    }

    fn complete_turn(&mut self) -> Result<()> {
        self.channel.task_done()
    }

    fn mode(&self) -> &'static str {
        "feed"
    }
}
