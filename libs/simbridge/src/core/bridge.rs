// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Compute-side entry point.
//!
//! `run_compute` takes the startup message off the control channel, attaches
//! the shared region, adapts and restores the graph, marks the startup item
//! done, then runs the execution loop in the configured mode until the
//! simulation side ends it.

use std::path::Path;
use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

use crate::core::adapter::GraphAdapter;
use crate::core::buffers::{BufferSet, SharedRegion};
use crate::core::channel::ControlReceiver;
use crate::core::checkpoint::CheckpointManager;
use crate::core::config::BridgeConfig;
use crate::core::descriptor::{ControlMessage, GraphDescriptor, StartupMessage};
use crate::core::error::{BridgeError, Result};
use crate::core::execution::{BridgeState, ExecutionLoop, RunSummary};
use crate::core::graph::{Dataflow, OpRegistry};
use crate::core::logging::set_log_file;
use crate::core::rendezvous::TurnLock;
use crate::core::turns::{FeedTurns, LockTurns, TurnSource};

/// A fully initialized compute side, ready to take turns.
pub struct BridgeManager {
    descriptor: GraphDescriptor,
    config: BridgeConfig,
    buffers: BufferSet,
    execution: ExecutionLoop<Dataflow>,
    warnings: Vec<String>,
    restored_step: Option<u64>,
}

impl BridgeManager {
    /// Attach the buffers, adapt the graph, restore the newest checkpoint and
    /// attach summaries. Any failure here is fatal and happens before the
    /// first turn.
    pub fn initialize(startup: &StartupMessage, registry: OpRegistry) -> Result<Self> {
        let buffers = Self::attach(startup)?;
        Self::with_buffers(startup, buffers, registry)
    }

    /// Validate the startup message and map the buffers it names.
    pub fn attach(startup: &StartupMessage) -> Result<BufferSet> {
        startup.descriptor.validate()?;
        startup.config.validate()?;

        let region = Arc::new(SharedRegion::open(&startup.region)?);
        tracing::info!(
            "Attached region {} at {:#x} ({} bytes, {})",
            region.path().display(),
            region.base_address(),
            region.len(),
            region.layout().dtype
        );
        BufferSet::attach(region, startup.descriptor.n, startup.descriptor.nn)
    }

    /// Adapt and restore the graph over already attached buffers.
    pub fn with_buffers(startup: &StartupMessage, buffers: BufferSet, registry: OpRegistry) -> Result<Self> {
        let descriptor = startup.descriptor.clone();
        let config = startup.config.clone();

        let adapted = GraphAdapter::new(&descriptor, &buffers, registry).adapt()?;
        let mut graph = adapted.graph;
        let mut outputs = adapted.outputs;
        let mut output_names = adapted.output_names;

        let mut checkpoints = CheckpointManager::new(&descriptor.model_directory, &config);
        let restored_step = checkpoints.restore_latest(&mut graph)?;
        checkpoints.attach_summaries(&mut graph, &mut outputs, &mut output_names)?;

        let execution = ExecutionLoop::new(graph, outputs, output_names, checkpoints, &config)
            .with_buffer_addresses(buffers.describe());

        Ok(Self {
            descriptor,
            config,
            buffers,
            execution,
            warnings: adapted.warnings,
            restored_step,
        })
    }

    pub fn descriptor(&self) -> &GraphDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Warnings raised while adapting the graph.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Step recorded in the checkpoint restored at startup, if any.
    pub fn restored_step(&self) -> Option<u64> {
        self.restored_step
    }

    pub fn state(&self) -> BridgeState {
        self.execution.state()
    }

    pub fn run<T: TurnSource>(&mut self, turns: &mut T) -> Result<RunSummary> {
        self.execution.run(turns)
    }
}

/// Run the compute side to completion over `receiver`.
///
/// The startup item is only marked done once initialization succeeded, so a
/// host joining on it never sees a half-initialized bridge as ready.
pub fn run_compute<R: ControlReceiver>(mut receiver: R, registry: OpRegistry) -> Result<RunSummary> {
    let startup = match receiver.recv() {
        Ok(Some(ControlMessage::Startup(startup))) => startup,
        Ok(Some(other)) => {
            let error = BridgeError::Configuration(format!(
                "expected a startup message, got {}",
                other.kind()
            ));
            return Err(startup_failed(None, None, error));
        }
        Ok(None) => return Err(startup_failed(None, None, BridgeError::ChannelClosed)),
        Err(e) => return Err(startup_failed(None, None, e)),
    };

    let _guard = startup_logging(&startup.config)
        .map_err(|e| startup_failed(Some(&startup.region), None, e))?;
    tracing::info!(
        "Starting compute bridge for {} (N={}, NN={}, {} mode)",
        startup.descriptor.model_directory.display(),
        startup.descriptor.n,
        startup.descriptor.nn,
        if startup.config.use_feed { "feed" } else { "lock" }
    );

    let buffers = BridgeManager::attach(&startup)
        .map_err(|e| startup_failed(Some(&startup.region), None, e))?;
    let addresses = buffers.describe();
    let mut manager = BridgeManager::with_buffers(&startup, buffers, registry)
        .map_err(|e| startup_failed(Some(&startup.region), Some(&addresses), e))?;
    receiver
        .task_done()
        .map_err(|e| startup_failed(Some(&startup.region), Some(&addresses), e))?;

    let summary = if manager.config().use_feed {
        let mut turns = FeedTurns::new(receiver);
        manager.run(&mut turns)?
    } else {
        // The channel stays open but unread; the rendezvous word drives turns.
        let lock = TurnLock::new(Arc::clone(manager.buffers().region()));
        let mut turns = LockTurns::new(lock);
        let summary = manager.run(&mut turns)?;
        drop(receiver);
        summary
    };

    tracing::info!(
        "Compute bridge finished after {} steps (update time {:?})",
        summary.steps,
        summary.update_time
    );
    Ok(summary)
}

fn startup_logging(config: &BridgeConfig) -> Result<Option<WorkerGuard>> {
    match &config.log_file {
        Some(path) => set_log_file(path),
        None => Ok(None),
    }
}

fn startup_failed(region: Option<&Path>, buffers: Option<&str>, error: BridgeError) -> BridgeError {
    tracing::error!(
        "Fatal error before the first turn: {} (region: {}, buffers: {})",
        error,
        region.map_or_else(|| "none".to_string(), |p| p.display().to_string()),
        buffers.unwrap_or("none")
    );
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffers::RegionLayout;
    use crate::core::channel::{local_channel, ControlSender};
    use crate::core::dtype::DType;
    use crate::core::graph::ops::{OP_IDENTITY, OP_PLACEHOLDER};
    use crate::core::graph::{GraphDef, NodeDef};
    use serial_test::serial;
    use tempfile::TempDir;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    fn startup(dir: &TempDir, n: usize) -> StartupMessage {
        let mut def = GraphDef::new();
        for name in ["positions", "nlist", "forces"] {
            def.push(NodeDef::new(name, OP_PLACEHOLDER).with_attr("dtype", "float32"));
        }
        def.push(NodeDef::new("echo", OP_IDENTITY).with_inputs(["positions:0"]));
        def.save(&dir.path().join(GraphDescriptor::GRAPH_FILE_NAME)).unwrap();

        let region = dir.path().join("region.shm");
        SharedRegion::create(&region, RegionLayout::new(4, 2, DType::Float32)).unwrap();

        StartupMessage {
            descriptor: GraphDescriptor {
                model_directory: dir.path().to_path_buf(),
                n,
                nn: 2,
                dtype: DType::Float32,
                positions: "positions:0".into(),
                nlist: "nlist:0".into(),
                forces: "forces:0".into(),
                virial: None,
                output_forces: false,
                out_nodes: vec!["echo:0".into()],
            },
            region,
            config: BridgeConfig {
                use_feed: true,
                ..BridgeConfig::default()
            },
        }
    }

    #[test]
    fn test_initialize_attaches_and_adapts() {
        let dir = TempDir::new().unwrap();
        let manager = BridgeManager::initialize(&startup(&dir, 4), OpRegistry::standard()).unwrap();
        assert_eq!(manager.state(), BridgeState::Ready);
        assert!(manager.warnings().is_empty());
        assert_eq!(manager.restored_step(), None);
        assert_eq!(manager.buffers().region().layout().n, 4);
    }

    #[test]
    fn test_extent_mismatch_fails_before_ready() {
        let dir = TempDir::new().unwrap();
        let err = BridgeManager::initialize(&startup(&dir, 5), OpRegistry::standard())
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_feed_run_over_local_channel() {
        let dir = TempDir::new().unwrap();
        let (mut tx, rx) = local_channel();
        tx.send(ControlMessage::Startup(startup(&dir, 4))).unwrap();

        let compute = std::thread::spawn(move || run_compute(rx, OpRegistry::standard()));
        tx.join().unwrap();
        for _ in 0..2 {
            tx.send(ControlMessage::Feed(Default::default())).unwrap();
            tx.join().unwrap();
        }
        tx.close().unwrap();

        let summary = compute.join().unwrap().unwrap();
        assert_eq!(summary.steps, 2);
    }

    #[test]
    fn test_first_message_must_be_startup() {
        let (mut tx, rx) = local_channel();
        tx.send(ControlMessage::Feed(Default::default())).unwrap();
        let err = run_compute(rx, OpRegistry::standard()).err().unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_closed_before_startup() {
        let (mut tx, rx) = local_channel();
        tx.close().unwrap();
        let err = run_compute(rx, OpRegistry::standard()).err().unwrap();
        assert!(matches!(err, BridgeError::ChannelClosed));
    }

    /// Collects the message of every ERROR event.
    struct ErrorLines(Arc<parking_lot::Mutex<Vec<String>>>);

    struct MessageField<'a>(&'a mut String);

    impl tracing::field::Visit for MessageField<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for ErrorLines {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::ERROR {
                let mut message = String::new();
                event.record(&mut MessageField(&mut message));
                self.0.lock().push(message);
            }
        }
    }

    #[test]
    fn test_startup_failure_is_logged_with_region_and_buffers() {
        let dir = TempDir::new().unwrap();
        let mut message = startup(&dir, 4);
        message.descriptor.positions = "missing:0".into();
        let region = message.region.clone();
        let (mut tx, rx) = local_channel();
        tx.send(ControlMessage::Startup(message)).unwrap();

        let lines = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(ErrorLines(Arc::clone(&lines)));
        let err = tracing::subscriber::with_default(subscriber, || run_compute(rx, OpRegistry::standard()))
            .err()
            .unwrap();

        assert!(matches!(err, BridgeError::Configuration(_)));
        let lines = lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(&region.display().to_string()));
        assert!(lines[0].contains("positions=0x"));
    }

    #[test]
    #[serial]
    fn test_startup_log_file_receives_output() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join("logs").join("compute.log");
        let mut message = startup(&dir, 4);
        message.config.log_file = Some(log_file.clone());

        let (mut tx, rx) = local_channel();
        tx.send(ControlMessage::Startup(message)).unwrap();
        let compute = std::thread::spawn(move || run_compute(rx, OpRegistry::standard()));
        tx.join().unwrap();
        tx.close().unwrap();
        compute.join().unwrap().unwrap();

        let content = std::fs::read_to_string(&log_file).unwrap();
        assert!(content.contains("Starting compute bridge"));
    }
}
