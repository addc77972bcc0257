// Pipeline orchestration
// decode -> extract -> classify for one file, with a single error translation point

use std::path::Path;
use std::sync::Arc;

use crate::audio::{decode_file, AudioSignal, FeatureExtractor};
use crate::classifier::{EmotionClassifier, EmotionLabel, Prediction};
use crate::model::{ModelArtifacts, ModelInfo, ScoringModel};
use crate::pipeline::error::{ClassifyFailure, PipelineError};

/// Composes feature extraction and classification.
///
/// Construct once at startup; the loaded model is shared read-only, so a
/// `Pipeline` behind an `Arc` serves concurrent predictions.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extractor: FeatureExtractor,
    classifier: EmotionClassifier,
}

impl Pipeline {
    pub fn new(extractor: FeatureExtractor, classifier: EmotionClassifier) -> Self {
        Pipeline {
            extractor,
            classifier,
        }
    }

    /// Pipeline over an arbitrary scoring model with the default extractor
    pub fn with_model(model: Arc<dyn ScoringModel>) -> Self {
        Self::new(FeatureExtractor::new(), EmotionClassifier::new(model))
    }

    /// Load the model from its artifacts; failure here is fatal for the caller
    pub fn load(artifacts: &ModelArtifacts) -> Result<Self, PipelineError> {
        log::info!(
            "Loading model from {} and {}",
            artifacts.architecture.display(),
            artifacts.weights.display()
        );

        let classifier = EmotionClassifier::load(artifacts)?;
        let pipeline = Self::new(FeatureExtractor::new(), classifier);

        if let Some(info) = pipeline.model_info() {
            log::info!(
                "Model loaded: {} layers, {} parameters, input {:?}, {} outputs",
                info.layer_count,
                info.parameter_count,
                info.input_shape,
                info.output_len
            );
            if info.output_len != EmotionLabel::COUNT {
                log::warn!(
                    "Model has {} outputs but {} emotion labels are defined",
                    info.output_len,
                    EmotionLabel::COUNT
                );
            }
        }

        let expected = pipeline.extractor.output_shape();
        let accepted = pipeline.classifier.expected_shape();
        if expected != accepted {
            log::warn!(
                "Model expects input {:?} but features are {:?}; every prediction will fail",
                accepted,
                expected
            );
        }

        Ok(pipeline)
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &EmotionClassifier {
        &self.classifier
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.classifier.model().info()
    }

    pub fn predict_signal(&self, signal: &AudioSignal) -> Result<Prediction, PipelineError> {
        let features = self.extractor.extract(signal)?;
        if features.is_padded() {
            log::debug!(
                "Padded {} frames to {}",
                features.source_frames(),
                self.extractor.target_length()
            );
        }
        Ok(self.classifier.predict_detailed(&features)?)
    }

    pub fn predict_file(&self, path: &Path) -> Result<Prediction, PipelineError> {
        let signal = decode_file(path)?;
        let prediction = self.predict_signal(&signal)?;

        log::info!(
            "{}: {} ({:.3})",
            path.display(),
            prediction.label,
            prediction.confidence
        );
        Ok(prediction)
    }

    /// Classify one file; any failure comes back as a single translated message
    pub fn classify_file(&self, path: &Path) -> Result<EmotionLabel, ClassifyFailure> {
        self.classify_file_detailed(path).map(|p| p.label)
    }

    /// `classify_file` keeping the scores, for callers that report them
    pub fn classify_file_detailed(&self, path: &Path) -> Result<Prediction, ClassifyFailure> {
        translate(path, self.predict_file(path))
    }
}

/// The one place a `PipelineError` becomes a `ClassifyFailure`
pub(crate) fn translate(
    path: &Path,
    result: Result<Prediction, PipelineError>,
) -> Result<Prediction, ClassifyFailure> {
    result.map_err(|err| {
        log::warn!("Classification of {} failed: {}", path.display(), err);
        ClassifyFailure::from(err)
    })
}

/// The line shown to the user for one outcome
pub fn render_outcome(outcome: &Result<EmotionLabel, ClassifyFailure>) -> String {
    match outcome {
        Ok(label) => format!("Predicted Emotion: {}", label),
        Err(failure) => format!("An error occurred: {}", failure.message),
    }
}
