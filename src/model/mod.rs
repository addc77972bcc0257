// Pre-trained classifier model
// Loads a Keras-style Sequential architecture plus safetensors weights and runs inference

pub mod architecture;
pub mod layers;
pub mod sequential;
pub mod weights;

pub use architecture::{ArchitectureDescriptor, LayerDescriptor};
pub use layers::{Activation, Layer, LayerKind, Padding};
pub use sequential::{ModelArtifacts, ModelInfo, SequentialModel};
pub use weights::{WeightError, WeightStore};

use ndarray::ArrayView3;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that make a model unusable; all of them are fatal at startup
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed architecture descriptor: {0}")]
    Architecture(#[from] serde_json::Error),

    #[error("Unsupported model class: {0} (only Sequential models are supported)")]
    UnsupportedModel(String),

    #[error("Unsupported layer {name} ({class_name})")]
    UnsupportedLayer { name: String, class_name: String },

    #[error("Invalid layer {layer}: {reason}")]
    InvalidLayer { layer: String, reason: String },

    #[error("Architecture does not declare an input shape")]
    MissingInputShape,

    #[error("Missing weight tensor {layer}/{param}")]
    MissingTensor { layer: String, param: String },

    #[error("Weight tensor {layer}/{param} has shape {actual:?}, expected {expected:?}")]
    TensorShape {
        layer: String,
        param: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Weight error: {0}")]
    Weights(#[from] WeightError),
}

/// Errors raised while running a loaded model
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Input shape {actual:?} does not match model input {expected:?}")]
    InputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Layer {layer} cannot process shape {shape:?}")]
    LayerShape { layer: String, shape: Vec<usize> },

    #[error("Model output has shape {0:?}, expected a score vector")]
    OutputShape(Vec<usize>),
}

/// A loaded model mapping one feature matrix to a score vector.
///
/// Implementations are immutable after loading and keep all scratch state
/// call-local, so one instance can serve concurrent predictions.
pub trait ScoringModel: Send + Sync {
    /// `(coefficients, frames, channels)` the model accepts
    fn input_shape(&self) -> [usize; 3];

    /// Run inference and return one score per class
    fn scores(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, InferenceError>;

    /// Provenance of the loaded artifacts, when known
    fn info(&self) -> Option<&ModelInfo> {
        None
    }
}
