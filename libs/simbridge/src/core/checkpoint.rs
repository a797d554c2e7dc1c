// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Periodic persistence of graph variables and merged summaries.
//!
//! Layout under the model directory:
//!
//! ```text
//! {model_directory}/
//! ├── graph.json
//! ├── checkpoint                 # JSON index: latest file + retained files
//! ├── model-{step}.ckpt          # MessagePack variables, newest `keep_checkpoints`
//! └── summaries/events.jsonl     # one line per save when summaries are on
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::adapter::BRIDGE_SCOPE;
use crate::core::config::BridgeConfig;
use crate::core::error::{BridgeError, Result};
use crate::core::graph::ops::{OP_MERGE_SUMMARY, OP_SCALAR_SUMMARY};
use crate::core::graph::{ComputeGraph, Dataflow, NodeDef, TensorHandle};
use crate::core::tensor::Tensor;

const CHECKPOINT_PREFIX: &str = "model-";
const CHECKPOINT_SUFFIX: &str = ".ckpt";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    step: u64,
    variables: BTreeMap<String, Tensor>,
}

/// `all` lists retained files oldest save first. Step tags restart with
/// every run, so save order, not step, decides which file is newest.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointIndex {
    latest: String,
    #[serde(default)]
    all: Vec<String>,
}

pub struct CheckpointManager {
    model_directory: PathBuf,
    keep: usize,
    write_summaries: bool,
    summary_tags: Vec<String>,
}

impl CheckpointManager {
    pub const INDEX_FILE_NAME: &'static str = "checkpoint";

    pub fn new(model_directory: impl Into<PathBuf>, config: &BridgeConfig) -> Self {
        Self {
            model_directory: model_directory.into(),
            keep: config.keep_checkpoints,
            write_summaries: config.write_summaries,
            summary_tags: Vec::new(),
        }
    }

    pub fn checkpoint_path(&self, step: u64) -> PathBuf {
        self.model_directory
            .join(format!("{}{}{}", CHECKPOINT_PREFIX, step, CHECKPOINT_SUFFIX))
    }

    pub fn summaries_path(&self) -> PathBuf {
        self.model_directory.join("summaries").join("events.jsonl")
    }

    pub fn summaries_attached(&self) -> bool {
        !self.summary_tags.is_empty()
    }

    /// Merge every `ScalarSummary` into one output appended after all others.
    /// Returns whether anything was attached.
    pub fn attach_summaries(
        &mut self,
        graph: &mut Dataflow,
        outputs: &mut Vec<TensorHandle>,
        output_names: &mut Vec<String>,
    ) -> Result<bool> {
        if !self.write_summaries {
            return Ok(false);
        }
        let summaries = graph.nodes_with_op(OP_SCALAR_SUMMARY);
        if summaries.is_empty() {
            tracing::warn!("Summaries requested but the graph has no {} nodes", OP_SCALAR_SUMMARY);
            return Ok(false);
        }

        let mut inputs = Vec::with_capacity(summaries.len());
        let mut tags = Vec::with_capacity(summaries.len());
        for handle in summaries {
            let def = graph
                .node_def(handle)
                .ok_or_else(|| BridgeError::Graph("summary node vanished".into()))?;
            tags.push(def.attr_str("tag").unwrap_or(def.name.as_str()).to_string());
            inputs.push(def.name.clone());
        }

        let name = format!("{}/summaries", BRIDGE_SCOPE);
        let merged = graph.add_node(NodeDef::new(name.as_str(), OP_MERGE_SUMMARY).with_inputs(inputs))?;
        outputs.push(merged);
        output_names.push(name);
        tracing::info!("Attached {} summaries: {}", tags.len(), tags.join(", "));
        self.summary_tags = tags;
        Ok(true)
    }

    /// Restore the newest checkpoint if the graph has variables and one
    /// exists. Returns the restored step.
    pub fn restore_latest<G: ComputeGraph>(&self, graph: &mut G) -> Result<Option<u64>> {
        let count = graph.variable_count();
        if count == 0 {
            return Ok(None);
        }
        tracing::info!("Found {} trainable variables", count);

        let Some(path) = self.latest_checkpoint()? else {
            tracing::info!("No checkpoint in {}, starting fresh", self.model_directory.display());
            return Ok(None);
        };

        let bytes = std::fs::read(&path).map_err(|e| {
            BridgeError::Checkpoint(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: CheckpointFile = rmp_serde::from_slice(&bytes).map_err(|e| {
            BridgeError::Checkpoint(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        let restored = file.variables.len();
        graph.restore_variables(file.variables)?;
        tracing::info!(
            "Restored {} variables from {} (step {})",
            restored,
            path.display(),
            file.step
        );
        Ok(Some(file.step))
    }

    /// Newest checkpoint: from the index, else by scanning file names.
    pub fn latest_checkpoint(&self) -> Result<Option<PathBuf>> {
        if let Some(index) = self.read_index() {
            let path = self.model_directory.join(&index.latest);
            if path.is_file() {
                return Ok(Some(path));
            }
            if let Some(previous) = index
                .all
                .iter()
                .rev()
                .map(|name| self.model_directory.join(name))
                .find(|p| p.is_file())
            {
                tracing::warn!(
                    "Checkpoint index names missing file {}, using {}",
                    path.display(),
                    previous.display()
                );
                return Ok(Some(previous));
            }
            tracing::warn!(
                "Checkpoint index names missing file {}, scanning instead",
                path.display()
            );
        }
        Ok(self.scan()?.last().map(|(_, path)| path.clone()))
    }

    fn read_index(&self) -> Option<CheckpointIndex> {
        let index_path = self.model_directory.join(Self::INDEX_FILE_NAME);
        let content = std::fs::read_to_string(&index_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(
                    "Unreadable checkpoint index {}: {}, scanning instead",
                    index_path.display(),
                    e
                );
                None
            }
        }
    }

    /// Retained file names, oldest save first. Files on disk the index does
    /// not know about count as older than every indexed one, by step.
    fn saved_in_order(&self) -> Result<Vec<String>> {
        let indexed: Vec<String> = self
            .read_index()
            .map(|index| index.all)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| self.model_directory.join(name).is_file())
            .collect();
        let mut order: Vec<String> = self
            .scan()?
            .iter()
            .map(|(_, path)| file_name_of(path))
            .filter(|name| !indexed.contains(name))
            .collect();
        order.extend(indexed);
        Ok(order)
    }

    /// Checkpoint files sorted by step.
    fn scan(&self) -> Result<Vec<(u64, PathBuf)>> {
        let entries = match std::fs::read_dir(&self.model_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(step) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_checkpoint_step)
            {
                found.push((step, path));
            }
        }
        found.sort_by_key(|(step, _)| *step);
        Ok(found)
    }

    /// Persist variables tagged with `step`, plus summaries when attached.
    ///
    /// `result` is the last step's outputs. `None` (no step ever completed)
    /// saves nothing and returns `Ok(false)`.
    pub fn save<G: ComputeGraph>(&self, graph: &G, step: u64, result: Option<&[Tensor]>) -> Result<bool> {
        let Some(result) = result else {
            tracing::debug!("No result yet at step {}, skipping save", step);
            return Ok(false);
        };

        let mut wrote = false;
        let count = graph.variable_count();
        if count > 0 {
            tracing::info!("Writing {} variables at step {}", count, step);
            self.write_checkpoint(step, graph.snapshot_variables())?;
            wrote = true;
        }
        if self.summaries_attached() {
            tracing::info!("Writing summaries at step {}", step);
            let merged = result.last().ok_or_else(|| {
                BridgeError::Checkpoint("summary output missing from result".into())
            })?;
            self.append_summaries(step, merged)?;
            wrote = true;
        }
        Ok(wrote)
    }

    fn write_checkpoint(&self, step: u64, variables: BTreeMap<String, Tensor>) -> Result<()> {
        std::fs::create_dir_all(&self.model_directory)?;
        let path = self.checkpoint_path(step);
        let bytes = rmp_serde::to_vec_named(&CheckpointFile { step, variables })
            .map_err(|e| BridgeError::Serialization(format!("Failed to encode checkpoint: {}", e)))?;
        let name = file_name_of(&path);
        let mut retained = self.saved_in_order()?;
        write_atomic(&path, &bytes)?;

        retained.retain(|existing| *existing != name);
        retained.push(name.clone());
        if self.keep > 0 && retained.len() > self.keep {
            let excess = retained.len() - self.keep;
            for old in retained.drain(..excess) {
                tracing::debug!("Removing old checkpoint {}", old);
                match std::fs::remove_file(self.model_directory.join(&old)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let index = CheckpointIndex {
            latest: name,
            all: retained,
        };
        let index_bytes = serde_json::to_vec_pretty(&index)
            .map_err(|e| BridgeError::Serialization(format!("Failed to encode checkpoint index: {}", e)))?;
        write_atomic(&self.model_directory.join(Self::INDEX_FILE_NAME), &index_bytes)
    }

    fn append_summaries(&self, step: u64, merged: &Tensor) -> Result<()> {
        let values = merged.to_f64_vec();
        if values.len() != self.summary_tags.len() {
            return Err(BridgeError::Checkpoint(format!(
                "merged summary has {} values for {} tags",
                values.len(),
                self.summary_tags.len()
            )));
        }
        let tagged: serde_json::Map<String, serde_json::Value> = self
            .summary_tags
            .iter()
            .cloned()
            .zip(values.into_iter().map(serde_json::Value::from))
            .collect();
        let line = serde_json::json!({ "step": step, "values": tagged });

        let path = self.summaries_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

fn parse_checkpoint_step(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(CHECKPOINT_PREFIX)?
        .strip_suffix(CHECKPOINT_SUFFIX)?
        .parse()
        .ok()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
