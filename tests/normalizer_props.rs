use proptest::prelude::*;
use speechgrade::{AudioFeatureVector, NormalizationState};

fn batch() -> impl Strategy<Value = Vec<Vec<f32>>> {
    (1usize..6, 2usize..20).prop_flat_map(|(dim, rows)| {
        prop::collection::vec(prop::collection::vec(-1_000.0f32..1_000.0, dim), rows)
    })
}

proptest! {
    #[test]
    fn training_batch_is_centred_and_scaled(rows in batch()) {
        let vectors: Vec<AudioFeatureVector> =
            rows.iter().cloned().map(AudioFeatureVector::from_vec).collect();
        let (state, transformed) = NormalizationState::fit_transform(&vectors).unwrap();
        let n = transformed.len() as f32;

        for column in 0..state.dimension() {
            let values: Vec<f32> = transformed.iter().map(|v| v.as_slice()[column]).collect();
            prop_assert!(values.iter().all(|v| v.is_finite()));
            let mean = values.iter().sum::<f32>() / n;
            if state.std[column] > 1e-2 {
                prop_assert!(mean.abs() < 1e-2, "column {} mean {}", column, mean);
                let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
                prop_assert!((std - 1.0).abs() < 1e-2, "column {} std {}", column, std);
            } else if state.std[column] < speechgrade::model::EPSILON {
                prop_assert!(values.iter().all(|v| v.abs() < 1e-2));
            }
        }
    }

    #[test]
    fn transform_is_finite_for_any_input(rows in batch(), scale in -1e4f32..1e4) {
        let vectors: Vec<AudioFeatureVector> =
            rows.iter().cloned().map(AudioFeatureVector::from_vec).collect();
        let state = NormalizationState::fit(&vectors).unwrap();
        let probe = AudioFeatureVector::from_vec(vec![scale; state.dimension()]);
        let out = state.transform(&probe).unwrap();
        prop_assert!(out.as_slice().iter().all(|v| v.is_finite()));
    }
}
