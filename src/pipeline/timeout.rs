// Caller-side prediction timeout
// Runs a blocking prediction on tokio's blocking pool and gives up waiting after a deadline

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::Prediction;
use crate::pipeline::error::{ClassifyFailure, PipelineError};
use crate::pipeline::orchestrator::{translate, Pipeline};

/// Predict `path` but stop waiting after `timeout`.
///
/// The blocking work is not cancelled; on expiry its result is dropped.
pub async fn predict_file_with_timeout(
    pipeline: Arc<Pipeline>,
    path: PathBuf,
    timeout: Duration,
) -> Result<Prediction, PipelineError> {
    let task = tokio::task::spawn_blocking(move || pipeline.predict_file(&path));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PipelineError::Task(join_err.to_string())),
        Err(_) => {
            log::warn!("Prediction timed out after {:?}", timeout);
            Err(PipelineError::Timeout(timeout))
        }
    }
}

/// Classify `path`, waiting at most `timeout` when one is given.
///
/// Failures, including an expired deadline, come back translated.
pub async fn classify_file_with_timeout(
    pipeline: Arc<Pipeline>,
    path: PathBuf,
    timeout: Option<Duration>,
) -> Result<Prediction, ClassifyFailure> {
    let result = match timeout {
        Some(timeout) => predict_file_with_timeout(pipeline, path.clone(), timeout).await,
        None => pipeline.predict_file(&path),
    };
    translate(&path, result)
}
