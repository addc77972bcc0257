// Mel-frequency cepstral coefficients
// Centered STFT -> power spectrum -> Slaney mel bank -> dB -> orthonormal DCT-II

use ndarray::Array2;
use realfft::RealFftPlanner;

use crate::audio::features::FeatureError;
use crate::audio::signal::AudioSignal;

/// Number of cepstral coefficients kept per frame
pub const N_MFCC: usize = 13;

/// FFT / window size in samples
pub const N_FFT: usize = 2048;

/// Advance between analysis frames in samples
pub const HOP_LENGTH: usize = 512;

/// Mel bands between 0 Hz and Nyquist
pub const N_MELS: usize = 128;

const N_FREQS: usize = N_FFT / 2 + 1;

/// Floor applied before taking the log
const AMIN: f32 = 1e-10;

/// Dynamic range kept below the loudest mel bin
const TOP_DB: f32 = 80.0;

/// Number of STFT frames produced for a signal of `len` samples
pub fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

/// Compute the unpadded MFCC matrix, shape `(N_MFCC, frame_count(len))`
pub fn mfcc(signal: &AudioSignal) -> Result<Array2<f32>, FeatureError> {
    let power = power_spectrogram(signal.samples())?;
    let filters = mel_filterbank(signal.sample_rate());

    let mut mel = filters.dot(&power);
    power_to_db(&mut mel);

    Ok(dct_basis().dot(&mel))
}

/// Periodic Hann window (matches `scipy.signal.get_window("hann", n)`)
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            (0.5 * (1.0 - phase.cos())) as f32
        })
        .collect()
}

/// Power spectrogram of a centered, zero-padded STFT, shape `(N_FREQS, frames)`
fn power_spectrogram(samples: &[f32]) -> Result<Array2<f32>, FeatureError> {
    let pad = N_FFT / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let n_frames = frame_count(samples.len());
    let window = hann_window(N_FFT);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);
    let mut frame = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();

    let mut power = Array2::<f32>::zeros((N_FREQS, n_frames));

    for t in 0..n_frames {
        let start = t * HOP_LENGTH;
        for ((dst, &src), &w) in frame
            .iter_mut()
            .zip(&padded[start..start + N_FFT])
            .zip(window.iter())
        {
            *dst = src * w;
        }

        fft.process_with_scratch(&mut frame, &mut spectrum, &mut scratch)
            .map_err(|e| FeatureError::Fft(e.to_string()))?;

        for (bin, c) in spectrum.iter().enumerate() {
            power[[bin, t]] = c.norm_sqr();
        }
    }

    Ok(power)
}

fn hz_to_mel(hz: f64) -> f64 {
    // Slaney: linear below 1 kHz, logarithmic above
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

fn logstep() -> f64 {
    6.4f64.ln() / 27.0
}

/// Triangular mel filters with Slaney area normalization, shape `(N_MELS, N_FREQS)`
fn mel_filterbank(sample_rate: u32) -> Array2<f32> {
    let sr = sample_rate as f64;
    let fmax = sr / 2.0;

    let fft_freqs: Vec<f64> = (0..N_FREQS)
        .map(|k| k as f64 * fmax / (N_FREQS - 1) as f64)
        .collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(fmax);
    let mel_points: Vec<f64> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (N_MELS + 1) as f64))
        .collect();

    let mut filters = Array2::<f32>::zeros((N_MELS, N_FREQS));
    for m in 0..N_MELS {
        let lower_width = mel_points[m + 1] - mel_points[m];
        let upper_width = mel_points[m + 2] - mel_points[m + 1];
        let enorm = 2.0 / (mel_points[m + 2] - mel_points[m]);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_points[m]) / lower_width;
            let upper = (mel_points[m + 2] - f) / upper_width;
            let weight = lower.min(upper).max(0.0);
            filters[[m, k]] = (weight * enorm) as f32;
        }
    }

    filters
}

/// In-place `10 * log10(max(S, amin))` with ref 1.0, floored at `max - TOP_DB`
fn power_to_db(mel: &mut Array2<f32>) {
    mel.mapv_inplace(|v| 10.0 * v.max(AMIN).log10());

    let peak = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - TOP_DB;
    mel.mapv_inplace(|v| v.max(floor));
}

/// First `N_MFCC` rows of the orthonormal DCT-II over `N_MELS` inputs
fn dct_basis() -> Array2<f32> {
    let n = N_MELS as f64;
    let mut basis = Array2::<f32>::zeros((N_MFCC, N_MELS));

    for k in 0..N_MFCC {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        for i in 0..N_MELS {
            let angle = std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n);
            basis[[k, i]] = (scale * angle.cos()) as f32;
        }
    }

    basis
}
