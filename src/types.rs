//! Core types shared by the extraction, training and inference pipeline

use serde::{Deserialize, Serialize};

/// Lower bound of the rubric scale used for both sub-scores.
pub const SCORE_MIN: f32 = 0.0;
/// Upper bound of the rubric scale used for both sub-scores.
pub const SCORE_MAX: f32 = 4.0;

/// Raw audio data representation (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 16000)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length of the clip in seconds; zero for an empty clip or a zero rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Pronunciation and fluency sub-scores on the 0-4 rubric scale.
///
/// Values produced by the regressor are not clamped; callers that need a
/// bounded score use [`SubScores::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub pronunciation: f32,
    pub fluency: f32,
}

impl SubScores {
    pub fn new(pronunciation: f32, fluency: f32) -> Self {
        Self {
            pronunciation,
            fluency,
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            pronunciation: self.pronunciation.clamp(SCORE_MIN, SCORE_MAX),
            fluency: self.fluency.clamp(SCORE_MIN, SCORE_MAX),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pronunciation.is_finite() && self.fluency.is_finite()
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.pronunciation, self.fluency]
    }
}
