// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Serialized graph definition (`graph.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{BridgeError, Result};

/// One operation in a serialized graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attrs: Map::new(),
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(Value::as_f64)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    /// Shape attribute as a list of extents.
    pub fn attr_shape(&self, key: &str) -> Option<Vec<usize>> {
        self.attr(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize))
            .collect()
    }
}

/// A whole serialized graph. Node order is free; import sorts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub nodes: Vec<NodeDef>,
}

impl GraphDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeDef) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read graph {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BridgeError::Configuration(format!("Failed to parse graph {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Serialization(format!("Failed to encode graph: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Strip an optional `:0` output suffix from a tensor name.
pub fn node_name(tensor_name: &str) -> &str {
    tensor_name.strip_suffix(":0").unwrap_or(tensor_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let mut def = GraphDef::new();
        def.push(NodeDef::new("x", "Placeholder").with_attr("dtype", "float32"))
            .push(NodeDef::new("y", "Neg").with_inputs(["x:0"]));
        def.save(&path).unwrap();

        let loaded = GraphDef::load(&path).unwrap();
        assert_eq!(loaded, def);
        assert_eq!(loaded.node("y").unwrap().inputs, vec!["x:0"]);
    }

    #[test]
    fn test_attr_shape() {
        let node = NodeDef::new("p", "Placeholder").with_attr("shape", serde_json::json!([4, 2]));
        assert_eq!(node.attr_shape("shape"), Some(vec![4, 2]));
        assert_eq!(node.attr_shape("missing"), None);
    }

    #[test]
    fn test_node_name_strips_output_index() {
        assert_eq!(node_name("forces:0"), "forces");
        assert_eq!(node_name("forces"), "forces");
    }
}
