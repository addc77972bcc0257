//! Container-agnostic decoding using symphonia
//!
//! Covers the formats hound doesn't (MP3, FLAC, AAC/MP4, Vorbis). Samples come
//! back interleaved as f32 at the stream's own sample rate.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::ingest::{AudioData, AudioError};

/// Decode a whole in-memory file with symphonia.
///
/// `extension` is only a probe hint; the container is still sniffed from the
/// bytes. Corrupt packets are skipped with a warning, anything else that stops
/// the stream early is an error.
pub fn decode_with_symphonia(
    data: Vec<u8>,
    extension: Option<&str>,
) -> Result<AudioData, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("Sample rate not found".to_string()))?;
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let bit_depth = codec_params.bits_per_sample.unwrap_or(0) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AudioError::Decode(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping corrupt packet: {}", msg);
            }
            Err(e) => {
                return Err(AudioError::Decode(format!("Failed to decode packet: {}", e)));
            }
        }
    }

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    AudioData::from_interleaved(samples, sample_rate, channels, bit_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tone, wav_bytes};

    #[test]
    fn test_symphonia_decodes_pcm_wav() {
        let samples = tone(440.0, 0.1, 16000);
        let audio = decode_with_symphonia(wav_bytes(&samples, 16000, 1), Some("wav")).unwrap();

        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frame_count, samples.len());
        for (decoded, original) in audio.samples.iter().zip(samples.iter()) {
            assert!((decoded - original).abs() < 1e-3);
        }
    }

    #[test]
    fn test_symphonia_rejects_empty_input() {
        assert!(decode_with_symphonia(Vec::new(), None).is_err());
    }

    #[test]
    fn test_symphonia_rejects_unknown_container() {
        let result = decode_with_symphonia(vec![0x42; 512], Some("bin"));
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }
}
