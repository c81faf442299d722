use ndarray::Array1;

use super::config::{ExtractorConfig, CHROMA_DIM};
use crate::error::{Result, ScoringError};

const CHROMA_NAMES: [&str; CHROMA_DIM] = [
    "c", "c_sharp", "d", "d_sharp", "e", "f", "f_sharp", "g", "g_sharp", "a", "a_sharp", "b",
];

const PROSODY_NAMES: [&str; 10] = [
    "pitch_mean",
    "pitch_std",
    "pitch_range",
    "energy_mean",
    "energy_std",
    "zcr_mean",
    "spectral_centroid_mean",
    "spectral_rolloff_mean",
    "tempo",
    "duration",
];

const FLUENCY_NAMES: [&str; 7] = [
    "num_pauses",
    "pause_mean",
    "pause_std",
    "pause_total",
    "speech_rate",
    "speech_duration_mean",
    "articulation_rate",
];

/// Fixed-length acoustic feature vector.
///
/// The order of entries is described by [`FeatureLayout`]; vectors are never
/// mutated after extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeatureVector(Array1<f32>);

impl AudioFeatureVector {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(Array1::from(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }

    pub fn as_slice(&self) -> &[f32] {
        self.0
            .as_slice()
            .expect("feature vectors are always contiguous")
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn into_inner(self) -> Array1<f32> {
        self.0
    }

    /// Fails with a dimension mismatch unless the vector has `expected` entries.
    pub fn ensure_dimension(&self, expected: usize, context: &'static str) -> Result<()> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(ScoringError::DimensionMismatch {
                context,
                expected,
                actual: self.len(),
            })
        }
    }
}

impl From<Array1<f32>> for AudioFeatureVector {
    fn from(values: Array1<f32>) -> Self {
        if values.is_standard_layout() {
            Self(values)
        } else {
            Self(values.as_standard_layout().into_owned())
        }
    }
}

/// Index-to-name mapping for vectors produced under one [`ExtractorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    names: Vec<String>,
}

impl FeatureLayout {
    pub fn new(config: &ExtractorConfig) -> Self {
        let n = config.n_mfcc;
        let mut names = Vec::with_capacity(config.dimension());
        for prefix in ["mfcc_mean", "mfcc_std", "mfcc_delta_mean", "mfcc_delta2_mean"] {
            names.extend((0..n).map(|i| format!("{prefix}_{i}")));
        }
        names.extend(PROSODY_NAMES.iter().map(|name| name.to_string()));
        names.extend((0..=config.contrast_bands).map(|band| format!("spectral_contrast_{band}")));
        names.extend(CHROMA_NAMES.iter().map(|pc| format!("chroma_{pc}")));
        names.push("spectral_flux".to_string());
        names.extend(FLUENCY_NAMES.iter().map(|name| name.to_string()));
        debug_assert_eq!(names.len(), config.dimension());
        Self { names }
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    /// Look up a named entry of `vector`.
    pub fn value(&self, vector: &AudioFeatureVector, name: &str) -> Option<f32> {
        self.index_of(name).and_then(|idx| vector.get(idx))
    }
}
