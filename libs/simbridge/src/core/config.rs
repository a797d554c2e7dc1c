// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Run configuration via `simbridge.yaml` in the model directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{BridgeError, Result};

/// Settings the simulation side chooses for a run. Sent to the compute side
/// inside the startup message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Save a checkpoint every `save_period` steps.
    pub save_period: u64,

    /// Per-step feed messages instead of lock-driven turns.
    pub use_feed: bool,

    /// Attach merged scalar summaries and write them with each checkpoint.
    pub write_summaries: bool,

    /// Log every evaluated output's shape and dtype each step.
    pub debug: bool,

    /// Run each step inside a `step` span and log its wall time.
    pub profile: bool,

    /// Checkpoint files to retain. `0` keeps all of them.
    pub keep_checkpoints: usize,

    /// Compute-side log file. Stderr only when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            save_period: 1000,
            use_feed: false,
            write_summaries: false,
            debug: false,
            profile: false,
            keep_checkpoints: 5,
            log_file: None,
        }
    }
}

impl BridgeConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "simbridge.yaml";

    /// Load configuration from a model directory. Returns error if the file
    /// is missing, cannot be parsed, or fails validation.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let config_path = model_dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            BridgeError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        config.validate()?;

        tracing::info!("Loaded bridge config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a model directory, returning defaults if the
    /// file is missing, unparseable or invalid.
    pub fn load_or_default(model_dir: &Path) -> Self {
        let config_path = model_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                model_dir.display()
            );
            return Self::default();
        }

        match Self::load(model_dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.save_period == 0 {
            return Err(BridgeError::Configuration(
                "save_period must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
