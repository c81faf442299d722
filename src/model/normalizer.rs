use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::features::AudioFeatureVector;

/// Standard deviations below this are treated as this value.
pub const EPSILON: f32 = 1e-6;

/// Per-dimension affine transform fitted on training vectors.
///
/// `std` stores the raw population deviation; the [`EPSILON`] guard is
/// applied when transforming so that constant dimensions map to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

impl NormalizationState {
    /// Fit from a non-empty batch of equally sized vectors.
    pub fn fit(vectors: &[AudioFeatureVector]) -> Result<Self> {
        let first = vectors
            .first()
            .ok_or_else(|| ScoringError::data("cannot fit a normalizer on an empty batch"))?;
        let dim = first.len();
        // Accumulate in f64 so constant dimensions get an exact mean.
        let mut matrix = Array2::<f64>::zeros((vectors.len(), dim));
        for (mut row, vector) in matrix.outer_iter_mut().zip(vectors) {
            vector.ensure_dimension(dim, "normalizer fit")?;
            row.assign(&vector.as_array().mapv(f64::from));
        }
        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| ScoringError::data("cannot fit a normalizer on an empty batch"))?;
        let std = matrix.std_axis(Axis(0), 0.0);
        Ok(Self {
            mean: mean.mapv(|v| v as f32),
            std: std.mapv(|v| v as f32),
        })
    }

    /// Fit on `vectors` and return them transformed. Training only.
    pub fn fit_transform(vectors: &[AudioFeatureVector]) -> Result<(Self, Vec<AudioFeatureVector>)> {
        let state = Self::fit(vectors)?;
        let transformed = vectors
            .iter()
            .map(|vector| state.transform(vector))
            .collect::<Result<Vec<_>>>()?;
        Ok((state, transformed))
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, vector: &AudioFeatureVector) -> Result<AudioFeatureVector> {
        vector.ensure_dimension(self.dimension(), "normalizer")?;
        let scale = self.std.mapv(|s| if s < EPSILON { EPSILON } else { s });
        Ok(AudioFeatureVector::from((vector.as_array() - &self.mean) / &scale))
    }

    /// Checks that both parameter arrays have the same finite length.
    pub fn validate(&self) -> Result<()> {
        if self.std.len() != self.mean.len() {
            return Err(ScoringError::DimensionMismatch {
                context: "normalizer std",
                expected: self.mean.len(),
                actual: self.std.len(),
            });
        }
        if self.mean.iter().chain(self.std.iter()).any(|v| !v.is_finite()) {
            return Err(ScoringError::configuration(
                "normalizer parameters contain non-finite values",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn vectors(rows: &[[f32; 3]]) -> Vec<AudioFeatureVector> {
        rows.iter()
            .map(|row| AudioFeatureVector::from_vec(row.to_vec()))
            .collect()
    }

    #[test]
    fn transformed_training_set_is_standardised() {
        let batch = vectors(&[[1.0, 10.0, 5.0], [3.0, 20.0, 5.0], [5.0, 30.0, 5.0]]);
        let (state, transformed) = NormalizationState::fit_transform(&batch).unwrap();
        assert_abs_diff_eq!(state.mean[1], 20.0);
        for column in 0..2 {
            let values: Vec<f32> = transformed.iter().map(|v| v.as_array()[column]).collect();
            let mean = values.iter().sum::<f32>() / 3.0;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 3.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(var.sqrt(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn constant_dimension_maps_to_zero() {
        let batch = vectors(&[[1.0, 2.0, 7.0], [2.0, 4.0, 7.0]]);
        let state = NormalizationState::fit(&batch).unwrap();
        assert_eq!(state.std[2], 0.0);
        let out = state
            .transform(&AudioFeatureVector::from_vec(vec![1.5, 3.0, 7.0]))
            .unwrap();
        assert!(out.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(out.as_array()[2], 0.0);
    }

    #[test]
    fn empty_batch_is_a_data_error() {
        let err = NormalizationState::fit(&[]).unwrap_err();
        assert!(matches!(err, ScoringError::Data(_)));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let state = NormalizationState::fit(&vectors(&[[0.0, 1.0, 2.0]])).unwrap();
        let err = state
            .transform(&AudioFeatureVector::from_vec(vec![0.0; 4]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn round_trips_through_json() {
        let state = NormalizationState::fit(&vectors(&[[0.0, 1.0, 2.0], [2.0, 1.0, 0.0]])).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let restored: NormalizationState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
