// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Simulation side of the bridge.
//!
//! The host owns the shared region. Per step it writes positions, the
//! neighbor list and (when the graph only reads them) forces, hands the turn
//! to the compute side, and reads forces and virial back once the turn
//! returns.

use std::path::Path;
use std::sync::Arc;

use crate::core::buffers::{BufferKind, BufferSet, RegionLayout, SharedRegion};
use crate::core::channel::ControlSender;
use crate::core::config::BridgeConfig;
use crate::core::descriptor::{ControlMessage, FeedOverrides, GraphDescriptor, StartupMessage};
use crate::core::dtype::DType;
use crate::core::error::{BridgeError, Result};
use crate::core::rendezvous::HostTurnLock;
use crate::core::tensor::Tensor;

pub struct BridgeHost<S: ControlSender> {
    sender: S,
    descriptor: GraphDescriptor,
    config: BridgeConfig,
    buffers: BufferSet,
    lock: HostTurnLock,
    started: bool,
    shut_down: bool,
    steps: u64,
}

impl<S: ControlSender> BridgeHost<S> {
    /// Create the shared region at `region_path`, sized for the descriptor's
    /// extents and stored in the simulation's `native` precision.
    pub fn create(
        sender: S,
        region_path: impl AsRef<Path>,
        native: DType,
        descriptor: GraphDescriptor,
        config: BridgeConfig,
    ) -> Result<Self> {
        descriptor.validate()?;
        config.validate()?;

        let layout = RegionLayout::new(descriptor.n, descriptor.nn, native);
        let region = Arc::new(SharedRegion::create(region_path, layout)?);
        let buffers = BufferSet::attach(Arc::clone(&region), descriptor.n, descriptor.nn)?;
        let lock = HostTurnLock::new(region);

        Ok(Self {
            sender,
            descriptor,
            config,
            buffers,
            lock,
            started: false,
            shut_down: false,
            steps: 0,
        })
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        self.buffers.region()
    }

    pub fn descriptor(&self) -> &GraphDescriptor {
        &self.descriptor
    }

    /// Completed exchanges.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Send the startup message and block until the compute side is ready.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(BridgeError::Configuration("bridge host already started".into()));
        }
        let startup = StartupMessage {
            descriptor: self.descriptor.clone(),
            region: self.region().path().to_path_buf(),
            config: self.config.clone(),
        };
        self.sender.send(ControlMessage::Startup(startup))?;
        self.sender.join()?;
        self.started = true;
        tracing::info!(
            "Compute side ready ({} mode)",
            if self.config.use_feed { "feed" } else { "lock" }
        );
        Ok(())
    }

    /// Write a simulation-owned buffer. Only valid while the host holds the
    /// turn, which is always the case between exchanges.
    pub fn write(&self, kind: BufferKind, tensor: &Tensor) -> Result<()> {
        let view = self.buffers.view(kind);
        view.write(tensor, view.element_count())
    }

    pub fn read(&self, kind: BufferKind) -> Tensor {
        self.buffers.view(kind).read()
    }

    /// Run one compute step on the current buffer contents.
    pub fn exchange(&mut self) -> Result<()> {
        if self.config.use_feed {
            return self.exchange_with_feed(FeedOverrides::new());
        }
        self.ensure_running()?;
        self.lock.hand_off_and_wait()?;
        self.steps += 1;
        Ok(())
    }

    /// Run one compute step with per-step tensor overrides. Feed mode only.
    pub fn exchange_with_feed(&mut self, overrides: FeedOverrides) -> Result<()> {
        if !self.config.use_feed {
            return Err(BridgeError::Configuration(
                "per-step feeds need use_feed; the lock-driven bridge reads no feeds".into(),
            ));
        }
        self.ensure_running()?;
        self.sender.send(ControlMessage::Feed(overrides))?;
        self.sender.join()?;
        self.steps += 1;
        Ok(())
    }

    /// Tell the compute side to do its final save and exit. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.sender.close()?;
        if self.started {
            if self.config.use_feed {
                self.sender.flush()?;
            } else {
                self.lock.signal_shutdown()?;
            }
        }
        tracing::info!("Bridge host shut down after {} steps", self.steps);
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.started {
            return Err(BridgeError::Configuration("bridge host not started".into()));
        }
        if self.shut_down {
            return Err(BridgeError::ChannelClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::{local_channel, ControlReceiver};
    use tempfile::TempDir;

    fn descriptor(dir: &TempDir) -> GraphDescriptor {
        GraphDescriptor {
            model_directory: dir.path().to_path_buf(),
            n: 2,
            nn: 1,
            dtype: DType::Float32,
            positions: "positions:0".into(),
            nlist: "nlist:0".into(),
            forces: "forces:0".into(),
            virial: None,
            output_forces: true,
            out_nodes: Vec::new(),
        }
    }

    #[test]
    fn test_create_sizes_region_for_descriptor() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = local_channel();
        let host = BridgeHost::create(
            tx,
            dir.path().join("r.shm"),
            DType::Float64,
            descriptor(&dir),
            BridgeConfig::default(),
        )
        .unwrap();
        let layout = host.region().layout();
        assert_eq!((layout.n, layout.nn, layout.dtype), (2, 1, DType::Float64));
        assert_eq!(host.read(BufferKind::Forces).shape(), &[2, 4]);
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = local_channel();
        let host = BridgeHost::create(
            tx,
            dir.path().join("r.shm"),
            DType::Float32,
            descriptor(&dir),
            BridgeConfig::default(),
        )
        .unwrap();
        let positions = Tensor::from_f64(vec![2, 4], (0..8).map(f64::from).collect()).unwrap();
        host.write(BufferKind::Positions, &positions).unwrap();
        assert_eq!(
            host.read(BufferKind::Positions).to_f64_vec(),
            positions.to_f64_vec()
        );
    }

    #[test]
    fn test_exchange_requires_start_and_feed_requires_feed_mode() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = local_channel();
        let mut host = BridgeHost::create(
            tx,
            dir.path().join("r.shm"),
            DType::Float32,
            descriptor(&dir),
            BridgeConfig::default(),
        )
        .unwrap();
        assert!(matches!(host.exchange(), Err(BridgeError::Configuration(_))));

        let ack = std::thread::spawn(move || {
            let first = rx.recv().unwrap();
            rx.task_done().unwrap();
            (first, rx)
        });
        host.start().unwrap();
        let (first, _rx) = ack.join().unwrap();
        assert!(matches!(first, Some(ControlMessage::Startup(_))));

        let err = host.exchange_with_feed(FeedOverrides::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = local_channel();
        let mut host = BridgeHost::create(
            tx,
            dir.path().join("r.shm"),
            DType::Float32,
            descriptor(&dir),
            BridgeConfig::default(),
        )
        .unwrap();
        host.shutdown().unwrap();
        host.shutdown().unwrap();
        assert!(matches!(host.exchange(), Err(BridgeError::Configuration(_))));
    }
}
