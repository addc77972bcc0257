// Emotion label table
// Fixed mapping from model output index to emotion category

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The eight emotion categories the model was trained on.
/// Discriminants are the model's output indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionLabel {
    Sad = 0,
    Calm = 1,
    Angry = 2,
    Happy = 3,
    Neutral = 4,
    Fearful = 5,
    Disgust = 6,
    Surprised = 7,
}

/// An index the label table has no entry for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Model predicted class index {index}, but only {table_len} labels are defined")]
pub struct UnmappedIndexError {
    pub index: usize,
    pub table_len: usize,
}

impl EmotionLabel {
    /// Every label, in index order
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Sad,
        EmotionLabel::Calm,
        EmotionLabel::Angry,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
        EmotionLabel::Fearful,
        EmotionLabel::Disgust,
        EmotionLabel::Surprised,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Result<Self, UnmappedIndexError> {
        Self::ALL.get(index).copied().ok_or(UnmappedIndexError {
            index,
            table_len: Self::COUNT,
        })
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmotionLabel::Sad => "Sad",
            EmotionLabel::Calm => "Calm",
            EmotionLabel::Angry => "Angry",
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Neutral => "Neutral",
            EmotionLabel::Fearful => "Fearful",
            EmotionLabel::Disgust => "Disgust",
            EmotionLabel::Surprised => "Surprised",
        }
    }
}

// ALL must list the variants in discriminant order
const _: () = {
    let mut i = 0;
    while i < EmotionLabel::COUNT {
        assert!(EmotionLabel::ALL[i].index() == i);
        i += 1;
    }
};

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<usize> for EmotionLabel {
    type Error = UnmappedIndexError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}
