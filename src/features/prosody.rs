use aus::analysis;

use super::config::ExtractorConfig;
use super::spectral::{power_to_db, time_frames, Spectrograms};
use crate::audio::voice_activity::VoicedSpan;

const ROLLOFF_PERCENT: f64 = 0.85;
const ONSET_DB_RANGE: f64 = 80.0;
const TEMPO_MIN_BPM: f64 = 30.0;
const TEMPO_MAX_BPM: f64 = 300.0;
const TEMPO_PRIOR_BPM: f64 = 120.0;
const TEMPO_PRIOR_OCTAVES: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ProsodyBlock {
    pub pitch_mean: f32,
    pub pitch_std: f32,
    pub pitch_range: f32,
    pub energy_mean: f32,
    pub energy_std: f32,
    pub zcr_mean: f32,
    pub spectral_centroid_mean: f32,
    pub spectral_rolloff_mean: f32,
    pub tempo: f32,
    pub duration: f32,
}

impl ProsodyBlock {
    pub fn append_to(&self, out: &mut Vec<f32>) {
        out.extend([
            self.pitch_mean,
            self.pitch_std,
            self.pitch_range,
            self.energy_mean,
            self.energy_std,
            self.zcr_mean,
            self.spectral_centroid_mean,
            self.spectral_rolloff_mean,
            self.tempo,
            self.duration,
        ]);
    }
}

/// Pitch observations gathered over voiced speech only.
#[derive(Debug, Clone, Default)]
pub(crate) struct PitchTrack {
    pub frequencies: Vec<f64>,
}

pub(crate) fn summarize_prosody(
    samples: &[f64],
    spectrograms: &Spectrograms,
    pitch: &PitchTrack,
    duration_secs: f64,
    config: &ExtractorConfig,
) -> ProsodyBlock {
    let (pitch_mean, pitch_std) = mean_std(&pitch.frequencies);
    let pitch_range = range(&pitch.frequencies);

    let rms: Vec<f64> = time_frames(samples, config.fft_size, config.hop_size)
        .map(frame_rms)
        .collect();
    let (energy_mean, energy_std) = mean_std(&rms);
    let zcr: Vec<f64> = time_frames(samples, config.fft_size, config.hop_size)
        .map(zero_crossing_rate)
        .collect();

    let centroids: Vec<f64> = spectrograms
        .magnitude
        .iter()
        .map(|frame| spectral_centroid(frame, &spectrograms.freqs))
        .collect();
    let rolloffs: Vec<f64> = spectrograms
        .magnitude
        .iter()
        .map(|frame| spectral_rolloff(frame, &spectrograms.freqs))
        .collect();

    ProsodyBlock {
        pitch_mean: pitch_mean as f32,
        pitch_std: pitch_std as f32,
        pitch_range: pitch_range as f32,
        energy_mean: energy_mean as f32,
        energy_std: energy_std as f32,
        zcr_mean: mean_std(&zcr).0 as f32,
        spectral_centroid_mean: mean_std(&centroids).0 as f32,
        spectral_rolloff_mean: mean_std(&rolloffs).0 as f32,
        tempo: estimate_tempo(&spectrograms.mel, config) as f32,
        duration: duration_secs as f32,
    }
}

/// Run pYIN over each voiced span long enough to hold a pitch frame.
pub(crate) fn track_pitch(
    samples: &[f64],
    spans: &[VoicedSpan],
    config: &ExtractorConfig,
) -> PitchTrack {
    let mut frequencies = Vec::new();
    for span in spans.iter().filter(|span| span.len() >= config.pitch_frame) {
        let end = span.end.min(samples.len());
        let segment = &samples[span.start.min(end)..end];
        let (_timestamps, pitches, voiced_flags, _confidence) = analysis::pyin_pitch_estimator(
            segment,
            config.sample_rate,
            config.pitch_fmin,
            config.pitch_fmax,
            config.pitch_frame,
        );
        frequencies.extend(
            pitches
                .iter()
                .zip(voiced_flags.iter())
                .filter_map(|(&hz, &voiced)| (voiced && hz.is_finite() && hz > 0.0).then_some(hz)),
        );
    }
    PitchTrack { frequencies }
}

fn frame_rms(frame: &[f64]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64).sqrt()
}

fn zero_crossing_rate(frame: &[f64]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count();
    crossings as f64 / frame.len() as f64
}

fn spectral_centroid(magnitude: &[f64], freqs: &[f64]) -> f64 {
    let (weighted, total) = magnitude
        .iter()
        .zip(freqs)
        .fold((0.0, 0.0), |(weighted, total), (&mag, &hz)| {
            (weighted + mag * hz, total + mag)
        });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

fn spectral_rolloff(magnitude: &[f64], freqs: &[f64]) -> f64 {
    let total: f64 = magnitude.iter().zip(freqs).map(|(&mag, _)| mag).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let target = ROLLOFF_PERCENT * total;
    let mut cumulative = 0.0;
    for (&mag, &hz) in magnitude.iter().zip(freqs) {
        cumulative += mag;
        if cumulative >= target {
            return hz;
        }
    }
    freqs.last().copied().unwrap_or(0.0)
}

/// Onset strength: mean positive rise of the log-mel spectrum per frame.
fn onset_envelope(mel: &[Vec<f64>]) -> Vec<f64> {
    let db: Vec<Vec<f64>> = mel
        .iter()
        .map(|frame| frame.iter().map(|&p| power_to_db(p)).collect())
        .collect();
    let peak = db
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - ONSET_DB_RANGE;
    let mut envelope = vec![0.0; mel.len()];
    for t in 1..db.len() {
        let bands = db[t].len().min(db[t - 1].len());
        if bands == 0 {
            continue;
        }
        let rise: f64 = (0..bands)
            .map(|b| (db[t][b].max(floor) - db[t - 1][b].max(floor)).max(0.0))
            .sum();
        envelope[t] = rise / bands as f64;
    }
    envelope
}

/// Tempo in BPM from the onset-envelope autocorrelation, 0 when there is
/// no onset energy.
pub(crate) fn estimate_tempo(mel: &[Vec<f64>], config: &ExtractorConfig) -> f64 {
    let envelope = onset_envelope(mel);
    let frame_rate = config.sample_rate as f64 / config.hop_size as f64;
    let min_lag = (60.0 * frame_rate / TEMPO_MAX_BPM).floor().max(1.0) as usize;
    let max_lag = (60.0 * frame_rate / TEMPO_MIN_BPM).ceil() as usize;
    if envelope.len() <= min_lag || envelope.iter().all(|&v| v <= 0.0) {
        return 0.0;
    }

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let centred: Vec<f64> = envelope.iter().map(|v| v - mean).collect();
    let mut best: Option<(f64, f64)> = None;
    for lag in min_lag..=max_lag.min(centred.len() - 1) {
        let correlation: f64 = centred[lag..]
            .iter()
            .zip(&centred[..centred.len() - lag])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f64;
        let prior = (-0.5 * ((bpm / TEMPO_PRIOR_BPM).log2() / TEMPO_PRIOR_OCTAVES).powi(2)).exp();
        let score = correlation * prior;
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, bpm));
        }
    }
    best.map(|(_, bpm)| bpm).unwrap_or(0.0)
}

/// Mean and population standard deviation; zeros for an empty slice.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn range(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max - min
}
