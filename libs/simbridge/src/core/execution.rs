// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-step driver of the compute side.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::checkpoint::CheckpointManager;
use crate::core::config::BridgeConfig;
use crate::core::descriptor::FeedOverrides;
use crate::core::error::{BridgeError, Result};
use crate::core::graph::{ComputeGraph, TensorHandle};
use crate::core::tensor::Tensor;
use crate::core::turns::{Turn, TurnSource};

/// Lifecycle of the compute side.
///
/// `Initializing → Ready → Running → Draining → Terminated`. Any fatal error
/// also ends in `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Initializing,
    Ready,
    Running,
    Draining,
    Terminated,
}

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Completed steps.
    pub steps: u64,
    /// Time spent evaluating steps, excluding turn and channel waits.
    pub update_time: Duration,
    pub last_result: Option<Vec<Tensor>>,
}

pub struct ExecutionLoop<G: ComputeGraph> {
    graph: G,
    outputs: Vec<TensorHandle>,
    output_names: Vec<String>,
    checkpoints: CheckpointManager,
    save_period: u64,
    debug: bool,
    profile: bool,
    step: u64,
    state: BridgeState,
    update_time: Duration,
    last_result: Option<Vec<Tensor>>,
    buffer_addresses: String,
}

impl<G: ComputeGraph> ExecutionLoop<G> {
    pub fn new(
        graph: G,
        outputs: Vec<TensorHandle>,
        output_names: Vec<String>,
        checkpoints: CheckpointManager,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            graph,
            outputs,
            output_names,
            checkpoints,
            save_period: config.save_period.max(1),
            debug: config.debug,
            profile: config.profile,
            step: 0,
            state: BridgeState::Ready,
            update_time: Duration::ZERO,
            last_result: None,
            buffer_addresses: String::new(),
        }
    }

    /// Buffer addresses to include in fatal error logs.
    pub fn with_buffer_addresses(mut self, addresses: impl Into<String>) -> Self {
        self.buffer_addresses = addresses.into();
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Take turns until shutdown, then do the final save.
    ///
    /// Every turn taken is completed before any error from its step is
    /// returned, so the simulation side is never left waiting.
    pub fn run<T: TurnSource>(&mut self, turns: &mut T) -> Result<RunSummary> {
        self.state = BridgeState::Running;
        tracing::info!("Entering {}-driven update loop", turns.mode());

        loop {
            let overrides = match turns.wait_for_turn() {
                Ok(Turn::Proceed(overrides)) => overrides,
                Ok(Turn::Shutdown) => break,
                Err(e) => return Err(self.fail(e)),
            };

            let outcome = self.step_once(&overrides);
            let released = turns.complete_turn();
            if let Err(e) = outcome {
                if let Err(release) = released {
                    tracing::error!("Releasing the turn also failed: {}", release);
                }
                return Err(self.fail(e));
            }
            if let Err(e) = released {
                return Err(self.fail(e));
            }
        }

        self.state = BridgeState::Draining;
        tracing::info!(
            "Received exit. Leaving update loop. Update time (excluding communication) is {:?}",
            self.update_time
        );
        if let Err(e) = self
            .checkpoints
            .save(&self.graph, self.step, self.last_result.as_deref())
        {
            return Err(self.fail(e));
        }
        self.state = BridgeState::Terminated;

        Ok(RunSummary {
            steps: self.step,
            update_time: self.update_time,
            last_result: self.last_result.clone(),
        })
    }

    fn step_once(&mut self, overrides: &FeedOverrides) -> Result<()> {
        let step = self.step;
        let _span = self
            .profile
            .then(|| tracing::info_span!("step", step).entered());
        let started = Instant::now();
        let outcome = self.evaluate(overrides);
        let elapsed = started.elapsed();
        self.update_time += elapsed;
        if self.profile {
            tracing::info!("step {} took {:?}", step, elapsed);
        }
        outcome
    }

    fn evaluate(&mut self, overrides: &FeedOverrides) -> Result<()> {
        let step = self.step;
        let mut feeds = HashMap::with_capacity(overrides.len());
        for (name, value) in overrides {
            let handle = self.graph.bind(name).ok_or_else(|| BridgeError::Execution {
                step,
                message: format!("fed tensor '{}' is not in the graph", name),
            })?;
            feeds.insert(handle, value.clone());
        }

        let result = self
            .graph
            .run(&self.outputs, &feeds)
            .map_err(|e| BridgeError::Execution {
                step,
                message: e.to_string(),
            })?;

        if self.debug {
            for (name, value) in self.output_names.iter().zip(&result) {
                tracing::debug!("step {} {}: {:?} {}", step, name, value.shape(), value.dtype());
            }
        }

        if step % self.save_period == 0 {
            self.checkpoints.save(&self.graph, step, Some(result.as_slice()))?;
        }
        self.step += 1;
        self.last_result = Some(result);
        Ok(())
    }

    fn fail(&mut self, error: BridgeError) -> BridgeError {
        self.state = BridgeState::Terminated;
        tracing::error!(
            "Fatal error at step {}: {} (buffers: {})",
            self.step,
            error,
            if self.buffer_addresses.is_empty() {
                "none"
            } else {
                self.buffer_addresses.as_str()
            }
        );
        error
    }
}
