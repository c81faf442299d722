//! Pronunciation proxies: spectral contrast, chroma and spectral flux.

use std::ops::Range;

use super::config::{ExtractorConfig, CHROMA_DIM};
use super::spectral::{power_to_db, Spectrograms};

const CONTRAST_QUANTILE: f64 = 0.02;
const CHROMA_MIN_FREQ: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PronunciationBlock {
    pub spectral_contrast: Vec<f32>,
    pub chroma: [f32; CHROMA_DIM],
    pub spectral_flux: f32,
}

impl PronunciationBlock {
    pub fn append_to(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(&self.spectral_contrast);
        out.extend_from_slice(&self.chroma);
        out.push(self.spectral_flux);
    }
}

pub(crate) fn summarize_pronunciation(
    spectrograms: &Spectrograms,
    config: &ExtractorConfig,
) -> PronunciationBlock {
    let bands = contrast_band_bins(&spectrograms.freqs, config);
    let mut contrast = vec![0.0_f64; bands.len()];
    let mut chroma = [0.0_f64; CHROMA_DIM];
    let frames = spectrograms.frame_count();

    for frame in &spectrograms.magnitude {
        for (total, bins) in contrast.iter_mut().zip(&bands) {
            *total += band_contrast(frame, bins);
        }
    }
    for frame in &spectrograms.power {
        let profile = chroma_profile(frame, &spectrograms.freqs);
        for (total, value) in chroma.iter_mut().zip(profile) {
            *total += value;
        }
    }

    let scale = if frames > 0 { 1.0 / frames as f64 } else { 0.0 };
    let mut chroma_mean = [0.0_f32; CHROMA_DIM];
    for (mean, total) in chroma_mean.iter_mut().zip(chroma) {
        *mean = (total * scale) as f32;
    }

    PronunciationBlock {
        spectral_contrast: contrast.iter().map(|total| (total * scale) as f32).collect(),
        chroma: chroma_mean,
        spectral_flux: mean_spectral_difference(&spectrograms.magnitude) as f32,
    }
}

/// Bin index ranges of the octave bands `[0, fmin), [fmin, 2 fmin), ...`;
/// the last band runs to Nyquist. Always `contrast_bands + 1` entries.
fn contrast_band_bins(freqs: &[f64], config: &ExtractorConfig) -> Vec<Range<usize>> {
    let mut edges = vec![0.0];
    edges.extend(
        (0..=config.contrast_bands).map(|k| config.contrast_fmin * 2f64.powi(k as i32)),
    );
    (0..=config.contrast_bands)
        .map(|band| {
            let low = edges[band];
            let high = if band == config.contrast_bands {
                f64::INFINITY
            } else {
                edges[band + 1]
            };
            let start = freqs.partition_point(|&hz| hz < low);
            let end = freqs.partition_point(|&hz| hz < high);
            start..end
        })
        .collect()
}

/// Peak-to-valley difference in dB over one band of one frame.
fn band_contrast(frame: &[f64], bins: &Range<usize>) -> f64 {
    let end = bins.end.min(frame.len());
    let start = bins.start.min(end);
    let mut values: Vec<f64> = frame[start..end].to_vec();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let take = ((values.len() as f64 * CONTRAST_QUANTILE).round() as usize).max(1);
    let valley = values[..take].iter().sum::<f64>() / take as f64;
    let peak = values[values.len() - take..].iter().sum::<f64>() / take as f64;
    power_to_db(peak) - power_to_db(valley)
}

/// Energy per pitch class (C = 0), normalised by the strongest class.
fn chroma_profile(power: &[f64], freqs: &[f64]) -> [f64; CHROMA_DIM] {
    let mut profile = [0.0; CHROMA_DIM];
    for (&energy, &hz) in power.iter().zip(freqs) {
        if hz < CHROMA_MIN_FREQ || !(energy > 0.0) {
            continue;
        }
        let midi = 69.0 + 12.0 * (hz / 440.0).log2();
        let class = (midi.round() as i64).rem_euclid(CHROMA_DIM as i64) as usize;
        profile[class] += energy;
    }
    let peak = profile.iter().copied().fold(0.0, f64::max);
    if peak > 0.0 {
        profile.iter_mut().for_each(|value| *value /= peak);
    }
    profile
}

/// Signed mean of frame-to-frame magnitude differences over all bins.
fn mean_spectral_difference(magnitude: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for pair in magnitude.windows(2) {
        for (current, previous) in pair[1].iter().zip(&pair[0]) {
            total += current - previous;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bin_freqs(config: &ExtractorConfig) -> Vec<f64> {
        let step = config.sample_rate as f64 / config.fft_size as f64;
        (0..=config.fft_size / 2).map(|k| k as f64 * step).collect()
    }

    #[test]
    fn bands_partition_every_bin() {
        let config = ExtractorConfig::default();
        let freqs = bin_freqs(&config);
        let bands = contrast_band_bins(&freqs, &config);
        assert_eq!(bands.len(), config.contrast_bands + 1);
        assert_eq!(bands[0].start, 0);
        assert_eq!(bands.last().unwrap().end, freqs.len());
        for pair in bands.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn flat_band_has_no_contrast() {
        assert_abs_diff_eq!(band_contrast(&[0.5; 16], &(0..16)), 0.0);
        assert_eq!(band_contrast(&[0.5; 16], &(4..4)), 0.0);
        let peaked = band_contrast(&[0.01, 0.01, 1.0, 0.01], &(0..4));
        assert_abs_diff_eq!(peaked, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn a440_lands_in_pitch_class_a() {
        let freqs = [0.0, 261.63, 440.0];
        let profile = chroma_profile(&[5.0, 0.5, 1.0], &freqs);
        assert_abs_diff_eq!(profile[9], 1.0);
        assert_abs_diff_eq!(profile[0], 0.5);
        assert_eq!(chroma_profile(&[0.0; 3], &freqs), [0.0; CHROMA_DIM]);
    }

    #[test]
    fn flux_is_signed_mean_difference() {
        let frames = vec![vec![1.0, 1.0], vec![2.0, 0.0], vec![2.0, 2.0]];
        assert_abs_diff_eq!(mean_spectral_difference(&frames), 0.5);
        assert_eq!(mean_spectral_difference(&frames[..1]), 0.0);
    }
}
