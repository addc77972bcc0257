// Fixed-shape feature extraction
// Pads or truncates the MFCC matrix to a fixed frame count and adds the channel axis

use ndarray::{s, Array2, Array3, ArrayView3};
use thiserror::Error;

use crate::audio::mfcc::{self, N_MFCC};
use crate::audio::signal::AudioSignal;

/// Frames the classifier was trained on
pub const TARGET_FRAMES: usize = 180;

/// Errors raised by feature extraction itself (decode errors come from `audio::ingest`)
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Target frame count must be positive")]
    ZeroTargetLength,
}

/// Model input: `(coefficients, frames, 1)`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array3<f32>,
    /// Frames taken from audio; the rest of the time axis is zero padding
    source_frames: usize,
}

impl FeatureMatrix {
    /// Wrap an arbitrary array, e.g. one produced outside this extractor
    pub fn from_array(data: Array3<f32>) -> Self {
        let source_frames = data.dim().1;
        FeatureMatrix {
            data,
            source_frames,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        let (c, f, ch) = self.data.dim();
        [c, f, ch]
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Number of leading frames that hold real MFCC values
    pub fn source_frames(&self) -> usize {
        self.source_frames
    }

    pub fn is_padded(&self) -> bool {
        self.source_frames < self.data.dim().1
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }
}

/// Converts audio into the classifier's fixed-size MFCC input.
///
/// MFCC parameters are constants of the extractor; only the target frame count
/// can be chosen, and it defaults to what the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureExtractor {
    target_length: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        FeatureExtractor {
            target_length: TARGET_FRAMES,
        }
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_length(target_length: usize) -> Self {
        FeatureExtractor { target_length }
    }

    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Shape of every matrix this extractor returns
    pub fn output_shape(&self) -> [usize; 3] {
        [N_MFCC, self.target_length, 1]
    }

    /// Extract MFCCs and fit them to `(N_MFCC, target_length, 1)`
    pub fn extract(&self, signal: &AudioSignal) -> Result<FeatureMatrix, FeatureError> {
        if self.target_length == 0 {
            return Err(FeatureError::ZeroTargetLength);
        }

        let coefficients = mfcc::mfcc(signal)?;
        log::debug!(
            "Extracted {} MFCC frames from {} samples at {} Hz",
            coefficients.ncols(),
            signal.len(),
            signal.sample_rate()
        );

        Ok(self.fit(&coefficients))
    }

    /// Zero-pad on the right or keep the leading frames, then add the channel axis
    fn fit(&self, coefficients: &Array2<f32>) -> FeatureMatrix {
        let (rows, frames) = coefficients.dim();
        let keep = frames.min(self.target_length);

        let mut data = Array3::<f32>::zeros((rows, self.target_length, 1));
        data.slice_mut(s![.., ..keep, 0])
            .assign(&coefficients.slice(s![.., ..keep]));

        FeatureMatrix {
            data,
            source_frames: keep,
        }
    }
}
