// Audio ingestion module
// Reads audio files, normalizes samples, and mixes down to a mono signal

use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::audio::decode::decode_with_symphonia;
use crate::audio::signal::AudioSignal;

/// Errors raised while turning a source file into an `AudioSignal`
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio contains no samples")]
    Empty,

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to f32 in range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 22050, 44100, 48000)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32), 0 when the codec doesn't say
    pub bit_depth: u16,

    /// Duration in milliseconds
    pub duration_ms: i64,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Build from interleaved samples, deriving frame count and duration
    pub fn from_interleaved(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        bit_depth: u16,
    ) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::InvalidData);
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }

        let frame_count = samples.len() / channels as usize;
        let duration_secs = frame_count as f64 / sample_rate as f64;

        Ok(AudioData {
            samples,
            sample_rate,
            channels,
            bit_depth,
            duration_ms: (duration_secs * 1000.0) as i64,
            frame_count,
        })
    }

    /// Get duration in seconds as f64
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Mix down to mono at the native sample rate
    pub fn into_signal(self) -> Result<AudioSignal, AudioError> {
        let mono = if self.channels == 1 {
            self.samples
        } else {
            self.to_mono()
        };
        AudioSignal::new(mono, self.sample_rate)
    }
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let cursor = Cursor::new(data);
    let mut reader = WavReader::new(cursor)?;

    let spec = reader.spec();
    let sample_format = spec.sample_format;
    let bit_depth = spec.bits_per_sample;

    let samples: Vec<f32> = match (sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // 8-bit PCM is unsigned on disk; hound already recentres it to [-128, 127]
            reader
                .samples::<i32>()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| s as f32 / 128.0)
                .collect()
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 8388608.0)
            .collect(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 2147483648.0)
            .collect(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                sample_format, bit_depth
            )));
        }
    };

    AudioData::from_interleaved(samples, spec.sample_rate, spec.channels, bit_depth)
}

fn is_riff_wave(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Decode an in-memory audio file
/// RIFF/WAVE goes through hound, everything else is probed by symphonia
pub fn decode_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<AudioData, AudioError> {
    if data.is_empty() {
        return Err(AudioError::Empty);
    }

    if is_riff_wave(&data) {
        ingest_wav(&data)
    } else {
        decode_with_symphonia(data, extension)
    }
}

/// Decode the file at `path` into a mono signal at its native sample rate
pub fn decode_file(path: &Path) -> Result<AudioSignal, AudioError> {
    // The handle is closed once the bytes are read, before any decoding.
    let data = std::fs::read(path)?;
    let extension = path.extension().and_then(|e| e.to_str());

    let audio = decode_bytes(data, extension)?;
    log::debug!(
        "Decoded {}: {} Hz, {} channels, {} bit, {} ms",
        path.display(),
        audio.sample_rate,
        audio.channels,
        audio.bit_depth,
        audio.duration_ms
    );

    audio.into_signal()
}
