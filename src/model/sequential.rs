// Sequential model assembly and inference
// Builds layers from the descriptor, checks every weight against the propagated shapes

use ndarray::{Array, Array1, ArrayView3, Dimension, Ix1, Ix2, Ix4};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::model::architecture::{
    is_channels_last, ActivationConfig, ArchitectureDescriptor, BatchNormConfig, Conv2dConfig,
    DenseConfig, LayerDescriptor, Pool2dConfig,
};
use crate::model::layers::{BatchNorm, Conv2d, Dense, Layer, LayerKind, Pool2d, PoolMode};
use crate::model::weights::WeightStore;
use crate::model::{InferenceError, ModelError, ScoringModel};

/// Locations of the two model artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifacts {
    /// Architecture descriptor (Keras `model.to_json()` output)
    pub architecture: PathBuf,
    /// Weights (safetensors)
    pub weights: PathBuf,
}

impl ModelArtifacts {
    pub fn new(architecture: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        ModelArtifacts {
            architecture: architecture.into(),
            weights: weights.into(),
        }
    }

    /// Both artifacts inside one directory
    pub fn in_dir(dir: &Path, architecture_file: &str, weights_file: &str) -> Self {
        Self::new(dir.join(architecture_file), dir.join(weights_file))
    }
}

/// What was loaded, for logs and `--inspect-model`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ModelArtifacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_sha256: Option<String>,
    pub input_shape: [usize; 3],
    pub output_len: usize,
    pub layer_count: usize,
    pub parameter_count: usize,
}

/// A loaded Keras-style Sequential model
#[derive(Debug, Clone)]
pub struct SequentialModel {
    layers: Vec<Layer>,
    info: ModelInfo,
}

impl SequentialModel {
    /// Read, fingerprint, and assemble the model from its two artifacts
    pub fn load(artifacts: &ModelArtifacts) -> Result<Self, ModelError> {
        let architecture_json =
            std::fs::read_to_string(&artifacts.architecture).map_err(|source| ModelError::Io {
                path: artifacts.architecture.clone(),
                source,
            })?;
        let weight_bytes = std::fs::read(&artifacts.weights).map_err(|source| ModelError::Io {
            path: artifacts.weights.clone(),
            source,
        })?;

        let architecture_sha256 = sha256_hex(architecture_json.as_bytes());
        let weights_sha256 = sha256_hex(&weight_bytes);

        let descriptor = ArchitectureDescriptor::parse(&architecture_json)?;
        let weights = WeightStore::from_bytes(weight_bytes)?;

        let mut model = Self::from_parts(&descriptor, &weights)?;
        model.info.artifacts = Some(artifacts.clone());
        model.info.architecture_sha256 = Some(architecture_sha256);
        model.info.weights_sha256 = Some(weights_sha256);

        Ok(model)
    }

    /// Assemble from an already parsed descriptor and weight store
    pub fn from_parts(
        descriptor: &ArchitectureDescriptor,
        weights: &WeightStore,
    ) -> Result<Self, ModelError> {
        let declared = descriptor.input_shape()?;
        let input_shape: [usize; 3] =
            declared
                .as_slice()
                .try_into()
                .map_err(|_| ModelError::InvalidLayer {
                    layer: "input".to_string(),
                    reason: format!("expected a rank-3 input, got {:?}", declared),
                })?;

        let mut shape = declared;
        let mut layers = Vec::new();

        for desc in descriptor.layers() {
            let Some(layer) = build_layer(desc, weights, &shape)? else {
                continue;
            };
            shape = layer
                .output_shape(&shape)
                .ok_or_else(|| ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    reason: format!("cannot accept input shape {:?}", shape),
                })?;
            layers.push(layer);
        }

        let &[output_len] = shape.as_slice() else {
            return Err(ModelError::InvalidLayer {
                layer: layers.last().map_or_else(|| "input".to_string(), |l| l.name.clone()),
                reason: format!("model output must be a score vector, got shape {:?}", shape),
            });
        };

        let parameter_count = layers.iter().map(Layer::parameter_count).sum();
        let info = ModelInfo {
            name: descriptor.name().map(str::to_string),
            artifacts: None,
            architecture_sha256: None,
            weights_sha256: None,
            input_shape,
            output_len,
            layer_count: layers.len(),
            parameter_count,
        };

        Ok(SequentialModel { layers, info })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn forward(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        if input.shape() != self.info.input_shape {
            return Err(InferenceError::InputShape {
                expected: self.info.input_shape.to_vec(),
                actual: input.shape().to_vec(),
            });
        }

        let mut x = input.to_owned().into_dyn();
        for layer in &self.layers {
            x = layer.forward(x)?;
        }

        if x.ndim() != 1 {
            return Err(InferenceError::OutputShape(x.shape().to_vec()));
        }
        Ok(x.iter().copied().collect())
    }
}

impl ScoringModel for SequentialModel {
    fn input_shape(&self) -> [usize; 3] {
        self.info.input_shape
    }

    fn scores(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        self.forward(input)
    }

    fn info(&self) -> Option<&ModelInfo> {
        Some(&self.info)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn invalid(layer: &str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidLayer {
        layer: layer.to_string(),
        reason: reason.into(),
    }
}

/// Fetch a weight tensor and check it against the shape the architecture implies
fn required<D: Dimension>(
    weights: &WeightStore,
    layer: &str,
    param: &str,
    expected: &[usize],
) -> Result<Array<f32, D>, ModelError> {
    let Some(tensor) = weights.layer_param(layer, param)? else {
        log::debug!("Weight file holds: {:?}", weights.names()?);
        return Err(ModelError::MissingTensor {
            layer: layer.to_string(),
            param: param.to_string(),
        });
    };

    if tensor.shape() != expected {
        return Err(ModelError::TensorShape {
            layer: layer.to_string(),
            param: param.to_string(),
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }

    tensor
        .into_dimensionality::<D>()
        .map_err(|e| invalid(layer, e.to_string()))
}

/// Turn one descriptor into a layer; `None` for layers with no inference effect on shape
fn build_layer(
    desc: &LayerDescriptor,
    weights: &WeightStore,
    input: &[usize],
) -> Result<Option<Layer>, ModelError> {
    let name = desc.name();

    let kind = match desc.class_name.as_str() {
        "InputLayer" => return Ok(None),
        "Conv2D" | "Convolution2D" => {
            let cfg: Conv2dConfig = desc.typed()?;
            if !is_channels_last(&cfg.data_format) {
                return Err(invalid(&name, "only channels_last is supported"));
            }
            if cfg.dilation_rate.map_or(false, |d| d.get() != (1, 1)) {
                return Err(invalid(&name, "dilated convolutions are not supported"));
            }
            let &[_, _, channels] = input else {
                return Err(invalid(&name, format!("expects a rank-3 input, got {:?}", input)));
            };
            let (kh, kw) = cfg.kernel_size.get();

            let kernel = required::<Ix4>(weights, &name, "kernel", &[kh, kw, channels, cfg.filters])?;
            let bias = if cfg.use_bias {
                Some(required::<Ix1>(weights, &name, "bias", &[cfg.filters])?)
            } else {
                None
            };

            LayerKind::Conv2d(Conv2d {
                kernel,
                bias,
                strides: cfg.strides.get(),
                padding: cfg.padding,
                activation: cfg.activation,
            })
        }
        "MaxPooling2D" | "MaxPool2D" | "AveragePooling2D" | "AvgPool2D" => {
            let cfg: Pool2dConfig = desc.typed()?;
            if !is_channels_last(&cfg.data_format) {
                return Err(invalid(&name, "only channels_last is supported"));
            }
            let mode = if desc.class_name.starts_with("Max") {
                PoolMode::Max
            } else {
                PoolMode::Average
            };
            LayerKind::Pool2d(Pool2d {
                mode,
                pool: cfg.pool_size.get(),
                strides: cfg.strides.unwrap_or(cfg.pool_size).get(),
                padding: cfg.padding,
            })
        }
        "BatchNormalization" => {
            let cfg: BatchNormConfig = desc.typed()?;
            if !cfg.normalizes_last_axis(input.len()) {
                return Err(invalid(&name, "only channel-axis normalization is supported"));
            }
            let channels = *input
                .last()
                .ok_or_else(|| invalid(&name, "needs a non-scalar input"))?;
            let shape = [channels];

            let gamma = if cfg.scale {
                required::<Ix1>(weights, &name, "gamma", &shape)?
            } else {
                Array1::ones(channels)
            };
            let beta = if cfg.center {
                required::<Ix1>(weights, &name, "beta", &shape)?
            } else {
                Array1::zeros(channels)
            };
            let mean = required::<Ix1>(weights, &name, "moving_mean", &shape)?;
            let variance = required::<Ix1>(weights, &name, "moving_variance", &shape)?;

            LayerKind::BatchNorm(BatchNorm::fold(&gamma, &beta, &mean, &variance, cfg.epsilon))
        }
        "Dense" => {
            let cfg: DenseConfig = desc.typed()?;
            let &[features] = input else {
                return Err(invalid(&name, format!("expects a flattened input, got {:?}", input)));
            };

            let kernel = required::<Ix2>(weights, &name, "kernel", &[features, cfg.units])?;
            let bias = if cfg.use_bias {
                Some(required::<Ix1>(weights, &name, "bias", &[cfg.units])?)
            } else {
                None
            };

            LayerKind::Dense(Dense {
                kernel,
                bias,
                activation: cfg.activation,
            })
        }
        "Flatten" => LayerKind::Flatten,
        "GlobalAveragePooling2D" => LayerKind::GlobalAveragePool2d,
        "Dropout" | "SpatialDropout2D" => LayerKind::Identity,
        "Activation" => {
            let cfg: ActivationConfig = desc.typed()?;
            LayerKind::Activation(cfg.activation)
        }
        other => {
            return Err(ModelError::UnsupportedLayer {
                name,
                class_name: other.to_string(),
            });
        }
    };

    Ok(Some(Layer::new(name, kind)))
}
