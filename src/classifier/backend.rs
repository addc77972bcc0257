// Emotion classifier backend
// Runs a loaded scoring model on a feature matrix and maps the winning index to a label

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::audio::FeatureMatrix;
use crate::classifier::labels::{EmotionLabel, UnmappedIndexError};
use crate::model::{InferenceError, ModelArtifacts, ModelError, ScoringModel, SequentialModel};

/// Errors that can occur during classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model loading failed: {0}")]
    ModelLoad(#[from] ModelError),

    #[error("Feature shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error(transparent)]
    UnmappedIndex(#[from] UnmappedIndexError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Model returned no scores")]
    EmptyScores,

    #[error("Model returned a non-finite score at index {0}")]
    NonFinite(usize),
}

/// Full result of one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: EmotionLabel,
    pub index: usize,
    /// Score of the winning class
    pub confidence: f32,
    pub scores: Vec<f32>,
}

/// Index of the highest score; ties go to the lowest index
pub fn argmax(scores: &[f32]) -> Result<usize, ClassifierError> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            return Err(ClassifierError::NonFinite(i));
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).ok_or(ClassifierError::EmptyScores)
}

/// Pre-trained emotion classifier.
///
/// Holds the model behind an `Arc`; cloning is cheap and every clone shares
/// the same immutable weights.
#[derive(Clone)]
pub struct EmotionClassifier {
    model: Arc<dyn ScoringModel>,
}

impl EmotionClassifier {
    pub fn new(model: Arc<dyn ScoringModel>) -> Self {
        EmotionClassifier { model }
    }

    /// Load the Sequential model from its artifacts
    pub fn load(artifacts: &ModelArtifacts) -> Result<Self, ClassifierError> {
        let model = SequentialModel::load(artifacts)?;
        Ok(Self::new(Arc::new(model)))
    }

    /// Shape `predict` accepts
    pub fn expected_shape(&self) -> [usize; 3] {
        self.model.input_shape()
    }

    pub fn model(&self) -> &dyn ScoringModel {
        self.model.as_ref()
    }

    pub fn predict(&self, features: &FeatureMatrix) -> Result<EmotionLabel, ClassifierError> {
        self.predict_detailed(features).map(|p| p.label)
    }

    pub fn predict_detailed(&self, features: &FeatureMatrix) -> Result<Prediction, ClassifierError> {
        let expected = self.expected_shape();
        let actual = features.shape();
        if actual != expected {
            return Err(ClassifierError::ShapeMismatch { expected, actual });
        }

        let scores = self.model.scores(features.view())?;
        let index = argmax(&scores)?;
        let label = EmotionLabel::from_index(index)?;

        log::debug!("Class scores: {:?}", scores);

        Ok(Prediction {
            label,
            index,
            confidence: scores[index],
            scores,
        })
    }
}

impl std::fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionClassifier")
            .field("input_shape", &self.expected_shape())
            .field("info", &self.model.info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedScores;
    use ndarray::Array3;

    fn features(shape: (usize, usize, usize)) -> FeatureMatrix {
        FeatureMatrix::from_array(Array3::zeros(shape))
    }

    fn classifier(scores: Vec<f32>) -> EmotionClassifier {
        EmotionClassifier::new(Arc::new(FixedScores::new(scores)))
    }

    #[test]
    fn test_argmax_prefers_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]).unwrap(), 1);
        assert_eq!(argmax(&[0.0; 8]).unwrap(), 0);
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]).unwrap(), 1);
    }

    #[test]
    fn test_argmax_rejects_bad_scores() {
        assert!(matches!(argmax(&[]), Err(ClassifierError::EmptyScores)));
        assert!(matches!(argmax(&[0.1, f32::NAN]), Err(ClassifierError::NonFinite(1))));
        assert!(matches!(argmax(&[f32::INFINITY]), Err(ClassifierError::NonFinite(0))));
    }

    #[test]
    fn test_predict_maps_index_to_label() {
        let classifier = classifier(vec![0.0, 0.1, 0.0, 0.7, 0.1, 0.0, 0.1, 0.0]);
        let label = classifier.predict(&features((13, 180, 1))).unwrap();
        assert_eq!(label, EmotionLabel::Happy);
    }

    #[test]
    fn test_predict_detailed() {
        let classifier = classifier(vec![0.05, 0.05, 0.6, 0.1, 0.05, 0.05, 0.05, 0.05]);
        let prediction = classifier.predict_detailed(&features((13, 180, 1))).unwrap();

        assert_eq!(prediction.label, EmotionLabel::Angry);
        assert_eq!(prediction.index, 2);
        assert!((prediction.confidence - 0.6).abs() < 1e-6);
        assert_eq!(prediction.scores.len(), 8);
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let classifier = classifier(vec![1.0; 8]);

        for shape in [(13, 179, 1), (12, 180, 1), (13, 180, 2)] {
            let err = classifier.predict(&features(shape)).unwrap_err();
            assert!(matches!(
                err,
                ClassifierError::ShapeMismatch { expected: [13, 180, 1], .. }
            ));
        }
    }

    #[test]
    fn test_unmapped_index_is_not_defaulted() {
        let mut scores = vec![0.0; 10];
        scores[9] = 1.0;
        let classifier = classifier(scores);

        let err = classifier.predict(&features((13, 180, 1))).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::UnmappedIndex(UnmappedIndexError { index: 9, table_len: 8 })
        ));
    }

    #[test]
    fn test_concurrent_predictions_agree() {
        let classifier = classifier(vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.3, 0.1]);
        let input = features((13, 180, 1));

        let labels: Vec<EmotionLabel> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| classifier.predict(&input).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(labels.iter().all(|&l| l == EmotionLabel::Disgust));
    }

    #[test]
    fn test_load_missing_artifacts() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let artifacts = ModelArtifacts::in_dir(temp_dir.path(), "a.json", "w.safetensors");

        assert!(matches!(
            EmotionClassifier::load(&artifacts),
            Err(ClassifierError::ModelLoad(ModelError::Io { .. }))
        ));
    }
}
