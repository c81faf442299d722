use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use speechgrade::audio::write_wav;
use speechgrade::model::RegressorShape;
use speechgrade::{AudioData, ExtractorConfig, FeatureExtractor, FeatureLayout, ScoreRegressor};

const RATE: u32 = 16_000;

fn noisy_sine(freq: f32, secs: f32, rate: u32, noise: f32) -> AudioData {
    let mut rng = StdRng::seed_from_u64(7);
    let len = (secs * rate as f32) as usize;
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * freq * t).sin() + noise * rng.gen_range(-1.0..1.0)
        })
        .collect();
    AudioData::new(samples, rate)
}

fn extractor() -> FeatureExtractor {
    FeatureExtractor::new(ExtractorConfig::default()).expect("default config is valid")
}

fn value(layout: &FeatureLayout, features: &speechgrade::ExtractedFeatures, name: &str) -> f32 {
    layout
        .value(&features.vector, name)
        .unwrap_or_else(|| panic!("missing feature {name}"))
}

#[test]
fn sustained_tone_has_one_segment_and_its_pitch() {
    let extractor = extractor();
    let layout = extractor.layout();
    let features = extractor
        .extract(&noisy_sine(440.0, 3.0, RATE, 0.01))
        .expect("extraction succeeds");

    assert_eq!(features.vector.len(), 89);
    assert!(features.vector.as_slice().iter().all(|v| v.is_finite()));
    assert_abs_diff_eq!(value(&layout, &features, "duration"), 3.0, epsilon = 1e-4);
    assert_eq!(features.diagnostics.voiced_segments.len(), 1);
    assert_eq!(value(&layout, &features, "num_pauses"), 0.0);
    assert!(features.diagnostics.pitched_frames > 0);

    let pitch = value(&layout, &features, "pitch_mean");
    assert!((pitch - 440.0).abs() < 20.0, "pitch_mean was {pitch}");
    let chroma_a = value(&layout, &features, "chroma_a");
    assert!(chroma_a > 0.9, "chroma_a was {chroma_a}");

    let regressor = ScoreRegressor::new(RegressorShape {
        input_dim: extractor.dimension(),
        hidden_dim: 16,
        num_layers: 2,
    })
    .unwrap();
    let scores = regressor.forward(&features.vector).unwrap();
    assert!(scores.pronunciation.is_finite());
    assert!(scores.fluency.is_finite());
}

#[test]
fn extraction_is_deterministic() {
    let extractor = extractor();
    let clip = noisy_sine(220.0, 1.5, RATE, 0.05);
    let first = extractor.extract(&clip).unwrap();
    let second = extractor.extract(&clip).unwrap();
    assert_eq!(first.vector, second.vector);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn dimension_is_independent_of_clip_length_and_rate() {
    let extractor = extractor();
    for (secs, rate) in [(0.01, RATE), (0.5, RATE), (2.0, 44_100), (4.0, 8_000)] {
        let features = extractor
            .extract(&noisy_sine(300.0, secs, rate, 0.02))
            .unwrap();
        assert_eq!(features.vector.len(), extractor.dimension(), "{secs}s at {rate} Hz");
        assert!(features.vector.as_slice().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn resampled_input_keeps_its_duration() {
    let extractor = extractor();
    let layout = extractor.layout();
    let features = extractor.extract(&noisy_sine(440.0, 2.0, 44_100, 0.01)).unwrap();
    assert_abs_diff_eq!(value(&layout, &features, "duration"), 2.0, epsilon = 1e-3);
}

#[test]
fn silence_produces_finite_zero_speech_features() {
    let extractor = extractor();
    let layout = extractor.layout();
    for level in [0.0_f32, 1e-5] {
        let clip = noisy_sine(0.0, 3.0, RATE, level);
        let features = extractor.extract(&clip).unwrap();
        assert!(features.vector.as_slice().iter().all(|v| v.is_finite()));
        assert!(features.diagnostics.voiced_segments.is_empty(), "level {level}");
        for name in ["pitch_mean", "pitch_std", "pitch_range", "num_pauses", "speech_rate"] {
            assert_eq!(value(&layout, &features, name), 0.0, "{name} at level {level}");
        }
        assert_eq!(value(&layout, &features, "articulation_rate"), 0.0);
        assert_abs_diff_eq!(value(&layout, &features, "duration"), 3.0, epsilon = 1e-4);
    }
}

#[test]
fn decoded_wav_matches_in_memory_extraction() {
    let extractor = extractor();
    let clip = noisy_sine(330.0, 1.0, RATE, 0.01);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    write_wav(&clip, &path).unwrap();

    let from_file = extractor.extract_file(&path).unwrap();
    let layout = extractor.layout();
    assert_abs_diff_eq!(value(&layout, &from_file, "duration"), 1.0, epsilon = 1e-4);
    assert_eq!(from_file.diagnostics.voiced_segments.len(), 1);
}

#[test]
fn unreadable_file_is_a_resource_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"definitely not a wav file").unwrap();
    let err = extractor().extract_file(&path).unwrap_err();
    assert_eq!(err.kind(), speechgrade::ErrorKind::Resource);
}
