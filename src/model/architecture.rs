// Architecture descriptor parsing
// Reads the JSON produced by Keras `model.to_json()` for Sequential models

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::model::layers::{Activation, Padding};
use crate::model::ModelError;

/// Top-level `model.to_json()` document
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureDescriptor {
    pub class_name: String,
    pub config: SequentialConfig,
    #[serde(default)]
    pub keras_version: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
}

/// Keras 2+ nests layers under `config.layers`; older exports use a bare list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SequentialConfig {
    Named {
        #[serde(default)]
        name: Option<String>,
        layers: Vec<LayerDescriptor>,
    },
    Legacy(Vec<LayerDescriptor>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerDescriptor {
    pub class_name: String,
    #[serde(default)]
    pub config: Value,
}

impl LayerDescriptor {
    /// Layer name from its config, falling back to the class name
    pub fn name(&self) -> String {
        self.config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.class_name)
            .to_string()
    }

    /// `batch_input_shape` (Keras 2) or `batch_shape` (Keras 3), batch axis included
    pub fn batch_shape(&self) -> Option<Vec<Option<usize>>> {
        ["batch_input_shape", "batch_shape"]
            .iter()
            .filter_map(|key| self.config.get(*key))
            .find(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the config into a typed layer config
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        serde_json::from_value(self.config.clone()).map_err(|e| ModelError::InvalidLayer {
            layer: self.name(),
            reason: e.to_string(),
        })
    }
}

impl ArchitectureDescriptor {
    pub fn parse(json: &str) -> Result<Self, ModelError> {
        let descriptor: ArchitectureDescriptor = serde_json::from_str(json)?;
        if descriptor.class_name != "Sequential" {
            return Err(ModelError::UnsupportedModel(descriptor.class_name));
        }
        Ok(descriptor)
    }

    pub fn name(&self) -> Option<&str> {
        match &self.config {
            SequentialConfig::Named { name, .. } => name.as_deref(),
            SequentialConfig::Legacy(_) => None,
        }
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        match &self.config {
            SequentialConfig::Named { layers, .. } => layers,
            SequentialConfig::Legacy(layers) => layers,
        }
    }

    /// Per-example input shape (batch axis stripped) declared by the first layer that has one
    pub fn input_shape(&self) -> Result<Vec<usize>, ModelError> {
        let batch_shape = self
            .layers()
            .iter()
            .find_map(LayerDescriptor::batch_shape)
            .ok_or(ModelError::MissingInputShape)?;

        batch_shape
            .into_iter()
            .skip(1)
            .map(|dim| dim.ok_or(ModelError::MissingInputShape))
            .collect()
    }
}

/// Keras accepts either `3` or `[3, 3]` for 2-D sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Pair {
    Single(usize),
    Both([usize; 2]),
}

impl Pair {
    pub fn get(self) -> (usize, usize) {
        match self {
            Pair::Single(n) => (n, n),
            Pair::Both([a, b]) => (a, b),
        }
    }
}

fn unit_pair() -> Pair {
    Pair::Single(1)
}

fn default_pool() -> Pair {
    Pair::Single(2)
}

fn default_true() -> bool {
    true
}

fn default_epsilon() -> f32 {
    1e-3
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conv2dConfig {
    pub filters: usize,
    pub kernel_size: Pair,
    #[serde(default = "unit_pair")]
    pub strides: Pair,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
    #[serde(default)]
    pub data_format: Option<String>,
    #[serde(default)]
    pub dilation_rate: Option<Pair>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pool2dConfig {
    #[serde(default = "default_pool")]
    pub pool_size: Pair,
    /// `null` means "same as pool_size"
    #[serde(default)]
    pub strides: Option<Pair>,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub data_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseConfig {
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchNormConfig {
    #[serde(default)]
    pub axis: Option<Value>,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    #[serde(default = "default_true")]
    pub center: bool,
    #[serde(default = "default_true")]
    pub scale: bool,
}

impl BatchNormConfig {
    /// Whether `axis` names the channel (last) axis of a `rank`-dim example
    pub fn normalizes_last_axis(&self, rank: usize) -> bool {
        fn is_last(axis: &Value, rank: usize) -> bool {
            match axis {
                Value::Number(n) => n.as_i64().map_or(false, |a| a == -1 || a == rank as i64),
                Value::Array(items) if items.len() == 1 => is_last(&items[0], rank),
                _ => false,
            }
        }
        self.axis.as_ref().map_or(true, |axis| is_last(axis, rank))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationConfig {
    pub activation: Activation,
}

/// `data_format` must be absent or channels_last
pub fn is_channels_last(data_format: &Option<String>) -> bool {
    data_format.as_deref().map_or(true, |f| f == "channels_last")
}
