// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! What the simulation side tells the compute side once, at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::BridgeConfig;
use crate::core::dtype::DType;
use crate::core::error::{BridgeError, Result};
use crate::core::tensor::Tensor;

/// Graph configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// Holds `graph.json`, checkpoints and summaries.
    #[serde(default)]
    pub model_directory: PathBuf,

    /// Particle count.
    pub n: usize,

    /// Neighbor slots per particle.
    pub nn: usize,

    /// Dtype the graph computes in.
    pub dtype: DType,

    /// Graph input names the buffers are substituted for.
    pub positions: String,
    pub nlist: String,
    pub forces: String,

    #[serde(default)]
    pub virial: Option<String>,

    /// The graph computes forces (written back) rather than consuming them.
    #[serde(default)]
    pub output_forces: bool,

    /// Evaluated every step, in this order.
    #[serde(default)]
    pub out_nodes: Vec<String>,
}

impl GraphDescriptor {
    /// File the graph author saves next to `graph.json`.
    pub const FILE_NAME: &'static str = "graph_info.json";

    /// Serialized graph definition inside the model directory.
    pub const GRAPH_FILE_NAME: &'static str = "graph.json";

    /// Read `graph_info.json` from `dir`. A missing `model_directory` field
    /// defaults to `dir` itself.
    pub fn from_model_directory(dir: &Path) -> Result<Self> {
        let info_path = dir.join(Self::FILE_NAME);
        let content = std::fs::read_to_string(&info_path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read {}: {}", info_path.display(), e))
        })?;
        let mut descriptor: Self = serde_json::from_str(&content).map_err(|e| {
            BridgeError::Configuration(format!("Failed to parse {}: {}", info_path.display(), e))
        })?;
        if descriptor.model_directory.as_os_str().is_empty() {
            descriptor.model_directory = dir.to_path_buf();
        }
        descriptor.validate()?;
        tracing::info!("Loaded graph descriptor from {}", info_path.display());
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_directory.as_os_str().is_empty() {
            return Err(BridgeError::Configuration(
                "model_directory must be set".into(),
            ));
        }
        if self.n == 0 {
            return Err(BridgeError::Configuration(
                "particle count N must be greater than zero".into(),
            ));
        }
        for (field, name) in [
            ("positions", &self.positions),
            ("nlist", &self.nlist),
            ("forces", &self.forces),
        ] {
            if name.is_empty() {
                return Err(BridgeError::Configuration(format!(
                    "{} tensor name must not be empty",
                    field
                )));
            }
        }
        if matches!(&self.virial, Some(v) if v.is_empty()) {
            return Err(BridgeError::Configuration(
                "virial tensor name must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    pub fn graph_path(&self) -> PathBuf {
        self.model_directory.join(Self::GRAPH_FILE_NAME)
    }
}

/// Everything the compute side needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupMessage {
    pub descriptor: GraphDescriptor,

    /// Shared region file created by the simulation side.
    pub region: PathBuf,

    pub config: BridgeConfig,
}

/// Per-step tensor overrides, keyed by graph tensor name.
pub type FeedOverrides = BTreeMap<String, Tensor>;

/// Items carried by the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    Startup(StartupMessage),
    Feed(FeedOverrides),
    Close,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Startup(_) => "startup",
            ControlMessage::Feed(_) => "feed",
            ControlMessage::Close => "close",
        }
    }
}
