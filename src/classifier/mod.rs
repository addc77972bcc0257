// Emotion classification
// Label table plus the classifier that turns model scores into a label

pub mod backend;
pub mod labels;

pub use backend::{argmax, ClassifierError, EmotionClassifier, Prediction};
pub use labels::{EmotionLabel, UnmappedIndexError};
