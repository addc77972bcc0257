// Speech Emotion - speech recording to emotion label
// Module declarations and public API

pub mod audio;
pub mod classifier;
pub mod config;
pub mod model;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use audio::{decode_file, AudioError, AudioSignal, FeatureError, FeatureExtractor, FeatureMatrix};
pub use classifier::{ClassifierError, EmotionClassifier, EmotionLabel, Prediction, UnmappedIndexError};
pub use config::{Config, ConfigError};
pub use model::{ModelArtifacts, ModelError, ModelInfo, ScoringModel, SequentialModel};
pub use pipeline::{
    classify_file_with_timeout, predict_file_with_timeout, render_outcome, ClassifyFailure, ErrorKind,
    Pipeline, PipelineError,
};
