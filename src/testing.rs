// Test fixtures
// Synthetic audio, WAV encoding, and a small model written to disk

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::ArrayView3;
use safetensors::tensor::{Dtype, TensorView};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{
    ArchitectureDescriptor, InferenceError, ModelArtifacts, ScoringModel, SequentialModel,
    WeightStore,
};

/// Encode samples as a 16-bit PCM WAV file
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Sine at `freq` Hz, amplitude 0.5
pub fn tone(freq: f32, secs: f64, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f64).round() as usize;
    (0..n)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Harmonic voice-like signal with a syllable envelope and a little noise
pub fn speechlike(secs: f64, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f64).round() as usize;
    let mut seed: u32 = 0x1234_5678;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = (PI * 4.0 * t).sin().powi(2);
            let voiced = 0.4 * (2.0 * PI * 140.0 * t).sin()
                + 0.2 * (2.0 * PI * 280.0 * t).sin()
                + 0.1 * (2.0 * PI * 2400.0 * t).sin();
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
            envelope * voiced + 0.02 * noise
        })
        .collect()
}

/// Serialize f32 tensors into a safetensors file
pub fn safetensors_bytes(tensors: &[(&str, Vec<usize>, Vec<f32>)]) -> Vec<u8> {
    let raw: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, shape, values)| {
            let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.to_string(), shape.clone(), bytes)
        })
        .collect();

    let views: Vec<(String, TensorView<'_>)> = raw
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap();
            (name.clone(), view)
        })
        .collect();

    safetensors::serialize(views, &None).unwrap()
}

/// Conv -> BN -> pool -> dropout -> flatten -> dense -> dense over a 13x180x1 input
pub const TINY_ARCHITECTURE: &str = r#"{
    "class_name": "Sequential",
    "config": {
        "name": "sequential",
        "layers": [
            {"class_name": "InputLayer", "config": {"batch_input_shape": [null, 13, 180, 1], "dtype": "float32", "name": "conv2d_input"}},
            {"class_name": "Conv2D", "config": {"name": "conv2d", "filters": 4, "kernel_size": [3, 3], "strides": [1, 1], "padding": "same", "data_format": "channels_last", "dilation_rate": [1, 1], "activation": "relu", "use_bias": true}},
            {"class_name": "BatchNormalization", "config": {"name": "batch_normalization", "axis": -1, "epsilon": 0.001, "center": true, "scale": true}},
            {"class_name": "MaxPooling2D", "config": {"name": "max_pooling2d", "pool_size": [2, 2], "strides": [2, 2], "padding": "valid", "data_format": "channels_last"}},
            {"class_name": "Dropout", "config": {"name": "dropout", "rate": 0.3}},
            {"class_name": "Flatten", "config": {"name": "flatten", "data_format": "channels_last"}},
            {"class_name": "Dense", "config": {"name": "dense", "units": 16, "activation": "relu", "use_bias": true}},
            {"class_name": "Dense", "config": {"name": "dense_1", "units": 8, "activation": "softmax", "use_bias": true}}
        ]
    },
    "keras_version": "2.4.0",
    "backend": "tensorflow"
}"#;

fn pattern(len: usize, salt: usize, scale: f32) -> Vec<f32> {
    (0..len)
        .map(|i| (((i * 37 + salt * 11) % 101) as f32 / 101.0 - 0.5) * scale)
        .collect()
}

pub fn tiny_weights() -> Vec<u8> {
    let flat = 6 * 90 * 4;
    safetensors_bytes(&[
        ("conv2d/kernel:0", vec![3, 3, 1, 4], pattern(36, 1, 0.02)),
        ("conv2d/bias:0", vec![4], pattern(4, 2, 0.1)),
        ("batch_normalization/gamma:0", vec![4], vec![1.0, 0.9, 1.1, 1.0]),
        ("batch_normalization/beta:0", vec![4], vec![0.0, 0.1, -0.1, 0.05]),
        ("batch_normalization/moving_mean:0", vec![4], vec![0.5, 1.0, 0.2, 0.0]),
        ("batch_normalization/moving_variance:0", vec![4], vec![4.0, 2.0, 1.0, 9.0]),
        ("dense/kernel:0", vec![flat, 16], pattern(flat * 16, 3, 0.01)),
        ("dense/bias:0", vec![16], pattern(16, 4, 0.1)),
        ("dense_1/kernel:0", vec![16, 8], pattern(16 * 8, 5, 0.2)),
        ("dense_1/bias:0", vec![8], pattern(8, 6, 0.1)),
    ])
}

pub fn tiny_model() -> SequentialModel {
    let descriptor = ArchitectureDescriptor::parse(TINY_ARCHITECTURE).unwrap();
    let weights = WeightStore::from_bytes(tiny_weights()).unwrap();
    SequentialModel::from_parts(&descriptor, &weights).unwrap()
}

/// Write the tiny model under its deployed file names
pub fn write_tiny_model(dir: &Path) -> ModelArtifacts {
    write_file(dir, "model_a1.json", TINY_ARCHITECTURE.as_bytes());
    write_file(dir, "model_weights1.safetensors", &tiny_weights());
    ModelArtifacts::in_dir(dir, "model_a1.json", "model_weights1.safetensors")
}

/// Model double returning fixed scores, optionally after a delay
pub struct FixedScores {
    scores: Vec<f32>,
    input_shape: [usize; 3],
    delay: Option<Duration>,
}

impl FixedScores {
    pub fn new(scores: Vec<f32>) -> Self {
        FixedScores {
            scores,
            input_shape: [13, 180, 1],
            delay: None,
        }
    }

    pub fn with_input_shape(mut self, input_shape: [usize; 3]) -> Self {
        self.input_shape = input_shape;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl ScoringModel for FixedScores {
    fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    fn scores(&self, _input: ArrayView3<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(self.scores.clone())
    }
}
