use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

/// Source slot(s) a layer reads from. `-1` is the running output of the
/// previous layer, other negative values are offsets from the current slot,
/// non-negative values are absolute slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerFrom {
    Index(i64),
    Many(Vec<i64>),
}

impl LayerFrom {
    pub fn indices(&self) -> Vec<i64> {
        match self {
            LayerFrom::Index(i) => vec![*i],
            LayerFrom::Many(v) => v.clone(),
        }
    }
}

/// One `[from, repeats, module, args]` row of a model spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDef(pub LayerFrom, pub usize, pub String, pub Vec<Value>);

impl LayerDef {
    pub fn from(&self) -> &LayerFrom {
        &self.0
    }

    pub fn repeats(&self) -> usize {
        self.1
    }

    pub fn module(&self) -> &str {
        &self.2
    }

    pub fn args(&self) -> &[Value] {
        &self.3
    }
}

/// Declarative model description: class count, global depth/width gains and
/// the backbone + head layer lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub nc: usize,
    #[serde(default = "one")]
    pub depth_multiple: f64,
    #[serde(default = "one")]
    pub width_multiple: f64,
    pub backbone: Vec<LayerDef>,
    pub head: Vec<LayerDef>,
}

fn one() -> f64 {
    1.0
}

impl ModelSpec {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("failed to parse model spec")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model spec {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid model spec {}", path.display()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize model spec")
    }

    /// Backbone and head rows concatenated, in build order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerDef> {
        self.backbone.iter().chain(self.head.iter())
    }
}
