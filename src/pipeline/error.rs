// Pipeline error translation
// Every stage error is mapped here, once, to a kind plus a user-facing message

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::audio::{AudioError, FeatureError};
use crate::classifier::ClassifierError;
use crate::model::{InferenceError, ModelError};

/// Errors that can occur anywhere in decode -> extract -> classify
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load model: {0}")]
    ModelLoad(#[from] ModelError),

    #[error("{0}")]
    Decode(#[from] AudioError),

    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),

    #[error("{0}")]
    Classifier(ClassifierError),

    #[error("Prediction did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Prediction task failed: {0}")]
    Task(String),
}

impl From<ClassifierError> for PipelineError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::ModelLoad(e) => PipelineError::ModelLoad(e),
            other => PipelineError::Classifier(other),
        }
    }
}

/// Failure categories reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ModelLoad,
    Decode,
    ShapeMismatch,
    UnmappedIndex,
    Internal,
    Timeout,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ModelLoad(_) => ErrorKind::ModelLoad,
            PipelineError::Decode(_) => ErrorKind::Decode,
            PipelineError::Feature(_) => ErrorKind::Internal,
            PipelineError::Classifier(err) => match err {
                ClassifierError::ModelLoad(_) => ErrorKind::ModelLoad,
                ClassifierError::ShapeMismatch { .. }
                | ClassifierError::Inference(InferenceError::InputShape { .. }) => {
                    ErrorKind::ShapeMismatch
                }
                ClassifierError::UnmappedIndex(_) => ErrorKind::UnmappedIndex,
                _ => ErrorKind::Internal,
            },
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Task(_) => ErrorKind::Internal,
        }
    }
}

/// The single translated form of any pipeline failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifyFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ClassifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClassifyFailure {}

impl From<PipelineError> for ClassifyFailure {
    fn from(err: PipelineError) -> Self {
        ClassifyFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
