// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Strict ping-pong turn lock over one word of the shared region header.
//!
//! ```text
//!   HOST ──(host wrote inputs)──▶ COMPUTE ──(compute end())──▶ DONE
//!    ▲                                                          │
//!    └────────────────(host observed DONE)──────────────────────┘
//!
//!   HOST ──(host signal_shutdown())──▶ SHUTDOWN   (terminal)
//! ```
//!
//! Whoever the word names owns the four buffers. Transitions publish with
//! `Release` and are observed with `Acquire`, so buffer writes made while
//! holding the turn are visible to the other side once it takes over.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::buffers::SharedRegion;
use crate::core::error::{BridgeError, Result};

pub const STATE_HOST: u32 = 0;
pub const STATE_COMPUTE: u32 = 1;
pub const STATE_DONE: u32 = 2;
pub const STATE_SHUTDOWN: u32 = 3;

const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 256;
const SLEEP_INTERVAL: Duration = Duration::from_micros(50);

/// Compute-side view of the turn-taking primitive.
pub trait Rendezvous {
    /// Block until a turn is available. Returns `false` once the simulation
    /// side has shut down, and keeps returning `false` without blocking.
    fn start(&mut self) -> Result<bool>;

    /// Hand the turn back. Must follow every `start()` that returned `true`.
    fn end(&mut self) -> Result<()>;
}

/// Spin, then yield, then sleep. No timeout.
fn wait_until(word: &AtomicU32, mut ready: impl FnMut(u32) -> bool) -> u32 {
    let mut attempts: u32 = 0;
    loop {
        let state = word.load(Ordering::Acquire);
        if ready(state) {
            return state;
        }
        if attempts < SPIN_LIMIT {
            std::hint::spin_loop();
        } else if attempts < YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(SLEEP_INTERVAL);
        }
        attempts = attempts.saturating_add(1);
    }
}

/// Compute side of the rendezvous.
pub struct TurnLock {
    region: Arc<SharedRegion>,
    holding: bool,
    shut_down: bool,
}

impl TurnLock {
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self {
            region,
            holding: false,
            shut_down: false,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }
}

impl Rendezvous for TurnLock {
    fn start(&mut self) -> Result<bool> {
        if self.shut_down {
            return Ok(false);
        }
        if self.holding {
            return Err(BridgeError::Rendezvous(
                "start() called while already holding the turn".into(),
            ));
        }

        let state = wait_until(self.region.rendezvous_word(), |s| {
            s == STATE_COMPUTE || s == STATE_SHUTDOWN
        });
        if state == STATE_SHUTDOWN {
            tracing::debug!("Rendezvous observed shutdown");
            self.shut_down = true;
            return Ok(false);
        }
        self.holding = true;
        Ok(true)
    }

    fn end(&mut self) -> Result<()> {
        if !self.holding {
            return Err(BridgeError::Rendezvous(
                "end() called without holding the turn".into(),
            ));
        }
        self.holding = false;
        self.region
            .rendezvous_word()
            .compare_exchange(STATE_COMPUTE, STATE_DONE, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|found| {
                BridgeError::Rendezvous(format!(
                    "turn word changed while compute held it (found {})",
                    found
                ))
            })?;
        Ok(())
    }
}

/// Simulation side of the rendezvous. Starts out holding the turn.
pub struct HostTurnLock {
    region: Arc<SharedRegion>,
}

impl HostTurnLock {
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self { region }
    }

    /// Give the turn to the compute side and block until it hands it back.
    pub fn hand_off_and_wait(&self) -> Result<()> {
        let word = self.region.rendezvous_word();
        word.compare_exchange(STATE_HOST, STATE_COMPUTE, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|found| {
                BridgeError::Rendezvous(format!(
                    "hand-off requires the host to hold the turn (found {})",
                    found
                ))
            })?;
        wait_until(word, |s| s == STATE_DONE);
        word.store(STATE_HOST, Ordering::Release);
        Ok(())
    }

    /// Tell the compute side no more turns are coming.
    pub fn signal_shutdown(&self) -> Result<()> {
        self.region
            .rendezvous_word()
            .compare_exchange(STATE_HOST, STATE_SHUTDOWN, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|found| {
                BridgeError::Rendezvous(format!(
                    "shutdown requires the host to hold the turn (found {})",
                    found
                ))
            })?;
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.region.rendezvous_word().load(Ordering::Acquire) == STATE_SHUTDOWN
    }
}
