use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;

use super::config::ExtractorConfig;

const MEL_MIN_FREQ: f64 = 20.0;
const POWER_FLOOR: f64 = 1e-10;

/// STFT-derived views of one utterance, one row per frame.
pub(crate) struct Spectrograms {
    pub magnitude: Vec<Vec<f64>>,
    pub power: Vec<Vec<f64>>,
    pub mel: Vec<Vec<f64>>,
    /// Centre frequency of every magnitude/power bin.
    pub freqs: Vec<f64>,
}

impl Spectrograms {
    pub fn frame_count(&self) -> usize {
        self.magnitude.len()
    }
}

/// Compute magnitude, power and mel spectrograms.
///
/// `samples` must already be at `config.sample_rate` and at least
/// `config.fft_size` long (see [`pad_to_window`]).
pub(crate) fn compute_spectrograms(samples: &[f64], config: &ExtractorConfig) -> Spectrograms {
    let stft = spectrum::rstft(samples, config.fft_size, config.hop_size, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(config.fft_size, config.sample_rate);
    let filterbank = MelFilterbank::new(
        MEL_MIN_FREQ,
        config.nyquist(),
        config.n_mels,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank)
        .into_iter()
        .map(|frame| frame.into_iter().map(floor_power).collect())
        .collect();

    Spectrograms {
        magnitude,
        power,
        mel,
        freqs,
    }
}

/// MFCC matrix with exactly `n_mfcc` columns per frame.
pub(crate) fn compute_mfcc(mel: &[Vec<f64>], n_mfcc: usize) -> Vec<Vec<f64>> {
    if mel.is_empty() {
        return Vec::new();
    }
    analysis::mel::mfcc_spectrogram(mel, n_mfcc, None)
        .into_iter()
        .map(|mut frame| {
            frame.resize(n_mfcc, 0.0);
            frame
                .into_iter()
                .map(|v| if v.is_finite() { v } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Zero-pad short input so the STFT always yields at least one frame.
pub(crate) fn pad_to_window(samples: &[f32], window: usize) -> Vec<f64> {
    let mut padded: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    if padded.len() < window {
        padded.resize(window, 0.0);
    }
    padded
}

/// Time-domain analysis frames, zero-padded input assumed.
pub(crate) fn time_frames(
    samples: &[f64],
    window: usize,
    hop: usize,
) -> impl Iterator<Item = &[f64]> {
    let count = if samples.len() < window {
        0
    } else {
        1 + (samples.len() - window) / hop
    };
    (0..count).map(move |frame| &samples[frame * hop..frame * hop + window])
}

pub(crate) fn power_to_db(value: f64) -> f64 {
    10.0 * floor_power(value).log10()
}

fn floor_power(value: f64) -> f64 {
    if value.is_finite() {
        value.max(POWER_FLOOR)
    } else {
        POWER_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_frames_cover_padded_signal() {
        let samples = vec![0.0; 1_000];
        assert_eq!(time_frames(&samples, 400, 100).count(), 7);
        assert_eq!(time_frames(&samples[..10], 400, 100).count(), 0);
    }

    #[test]
    fn padding_only_extends_short_input() {
        assert_eq!(pad_to_window(&[0.5; 10], 64).len(), 64);
        assert_eq!(pad_to_window(&[0.5; 100], 64).len(), 100);
    }

    #[test]
    fn db_conversion_is_floored() {
        assert!((power_to_db(0.0) + 100.0).abs() < 1e-9);
        assert!((power_to_db(1.0)).abs() < 1e-12);
    }

    #[test]
    fn spectrogram_rows_match_bins() {
        let config = ExtractorConfig::default();
        let tone: Vec<f64> = (0..4_000)
            .map(|i| (2.0 * std::f64::consts::PI * 1_000.0 * i as f64 / 16_000.0).sin())
            .collect();
        let spectrograms = compute_spectrograms(&tone, &config);
        assert!(spectrograms.frame_count() > 0);
        assert_eq!(spectrograms.freqs.len(), config.fft_size / 2 + 1);
        assert_eq!(spectrograms.mel[0].len(), config.n_mels);
        let mfcc = compute_mfcc(&spectrograms.mel, config.n_mfcc);
        assert!(mfcc.iter().all(|frame| frame.len() == config.n_mfcc));
    }
}
