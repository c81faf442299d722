use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

/// Size of the prosody block (pitch, energy, zcr, centroid, rolloff, tempo, duration).
pub const PROSODY_DIM: usize = 10;
/// Number of pitch classes in the chroma summary.
pub const CHROMA_DIM: usize = 12;
/// Size of the fluency block.
pub const FLUENCY_DIM: usize = 7;

/// Parameters that fully determine the shape and meaning of a feature vector.
///
/// Changing any field changes the vectors the extractor produces, which
/// invalidates every normalizer and regressor fitted under the old values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub sample_rate: u32,
    pub n_mfcc: usize,
    pub n_mels: usize,
    pub fft_size: usize,
    pub hop_size: usize,
    /// Voice activity threshold relative to the loudest frame.
    pub top_db: f64,
    /// Absolute voice activity floor in dBFS.
    pub silence_floor_db: f64,
    pub contrast_bands: usize,
    pub contrast_fmin: f64,
    pub pitch_fmin: f64,
    pub pitch_fmax: f64,
    pub pitch_frame: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_mfcc: 13,
            n_mels: 40,
            fft_size: 512,
            hop_size: 160,
            top_db: 30.0,
            silence_floor_db: -60.0,
            contrast_bands: 6,
            contrast_fmin: 200.0,
            pitch_fmin: 55.0,
            pitch_fmax: 1_200.0,
            pitch_frame: 1_024,
        }
    }
}

impl ExtractorConfig {
    /// Length of every vector produced under this configuration.
    pub fn dimension(&self) -> usize {
        self.cepstral_dim() + PROSODY_DIM + self.pronunciation_dim() + FLUENCY_DIM
    }

    pub fn cepstral_dim(&self) -> usize {
        4 * self.n_mfcc
    }

    pub fn pronunciation_dim(&self) -> usize {
        self.contrast_bands + 1 + CHROMA_DIM + 1
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(ScoringError::configuration(message));
        if self.sample_rate == 0 {
            return fail("sample_rate must be positive".into());
        }
        if self.n_mfcc == 0 || self.n_mels == 0 {
            return fail("n_mfcc and n_mels must be positive".into());
        }
        if self.n_mfcc > self.n_mels {
            return fail(format!(
                "n_mfcc ({}) cannot exceed n_mels ({})",
                self.n_mfcc, self.n_mels
            ));
        }
        if self.fft_size < 2 || self.hop_size == 0 || self.hop_size > self.fft_size {
            return fail(format!(
                "invalid framing: fft_size {} hop_size {}",
                self.fft_size, self.hop_size
            ));
        }
        if !(self.top_db > 0.0) {
            return fail(format!("top_db must be positive, got {}", self.top_db));
        }
        if self.contrast_bands == 0 || !(self.contrast_fmin > 0.0) {
            return fail("spectral contrast needs at least one band above 0 Hz".into());
        }
        let last_edge = self.contrast_fmin * 2f64.powi(self.contrast_bands as i32 - 1);
        if last_edge >= self.nyquist() {
            return fail(format!(
                "contrast band edge {last_edge:.0} Hz reaches Nyquist {:.0} Hz",
                self.nyquist()
            ));
        }
        if !(self.pitch_fmin > 0.0) || self.pitch_fmin >= self.pitch_fmax {
            return fail(format!(
                "pitch range {}..{} Hz is empty",
                self.pitch_fmin, self.pitch_fmax
            ));
        }
        if self.pitch_fmax >= self.nyquist() {
            return fail(format!(
                "pitch_fmax {} Hz must stay below Nyquist {} Hz",
                self.pitch_fmax,
                self.nyquist()
            ));
        }
        let min_frame = (2.0 * self.sample_rate as f64 / self.pitch_fmin).ceil() as usize;
        if self.pitch_frame < min_frame {
            return fail(format!(
                "pitch_frame {} is shorter than two periods of {} Hz ({min_frame} samples)",
                self.pitch_frame, self.pitch_fmin
            ));
        }
        Ok(())
    }
}
