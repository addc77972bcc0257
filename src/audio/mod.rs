// Audio processing module
// Decodes audio files and turns them into fixed-shape MFCC features

pub mod decode;
pub mod features;
pub mod ingest;
pub mod mfcc;
pub mod signal;

pub use features::{FeatureError, FeatureExtractor, FeatureMatrix, TARGET_FRAMES};
pub use ingest::{decode_bytes, decode_file, ingest_wav, AudioData, AudioError};
pub use mfcc::{mfcc, N_MFCC};
pub use signal::AudioSignal;
