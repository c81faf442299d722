use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use speechgrade::audio::write_wav;
use speechgrade::training::{ManifestOptions, SkipReason, Trainer, TrainingPhase};
use speechgrade::{
    AudioData, AudioFeatureVector, Corpus, ExtractorConfig, FeatureExtractor, ModelBundle,
    ScoringError, TrainingConfig,
};

fn tone(freq: f32, amplitude: f32, secs: f32) -> AudioData {
    let len = (secs * 16_000.0) as usize;
    let samples = (0..len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 16_000.0).sin())
        .collect();
    AudioData::new(samples, 16_000)
}

fn small_config(output_dir: &Path) -> TrainingConfig {
    TrainingConfig {
        output_dir: output_dir.to_path_buf(),
        epochs: 12,
        batch_size: 4,
        learning_rate: 5e-3,
        hidden_dim: 16,
        num_layers: 2,
        ..TrainingConfig::default()
    }
}

/// Writes ten labeled clips plus a handful of unusable rows.
fn write_manifest(dir: &Path) -> std::path::PathBuf {
    let audio = dir.join("audio");
    fs::create_dir_all(&audio).unwrap();
    let mut rows = Vec::new();
    for i in 0..10 {
        let id = format!("spk{i}");
        let freq = 150.0 + 40.0 * i as f32;
        write_wav(&tone(freq, 0.2 + 0.05 * i as f32, 0.6), audio.join(format!("{id}.wav")))
            .unwrap();
        let score = (i % 5) as f32;
        rows.push(format!(
            r#"{{"id": "{id}", "pronunciation": {score}, "fluency": "{}"}}"#,
            4.0 - score
        ));
    }
    rows.push(r#"{"id": "spk0", "pronunciation": 1, "fluency": 1}"#.to_string());
    rows.push(r#"{"id": "ghost", "pronunciation": 1, "fluency": 1}"#.to_string());
    rows.push(r#"{"id": "loud", "pronunciation": 9, "fluency": 1}"#.to_string());
    rows.push("not even json".to_string());

    let manifest = dir.join("manifest.jsonl");
    fs::write(&manifest, rows.join("\n")).unwrap();
    manifest
}

fn load(manifest: &Path, dir: &Path) -> Corpus {
    let extractor = FeatureExtractor::new(ExtractorConfig::default()).unwrap();
    let options = ManifestOptions {
        audio_dir: Some(dir.join("audio")),
    };
    Corpus::load_manifest(manifest, &extractor, &options).unwrap()
}

#[test]
fn manifest_rows_are_joined_by_id_and_bad_rows_counted() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path());
    let corpus = load(&manifest, dir.path());

    assert_eq!(corpus.len(), 10);
    let skipped = corpus.skipped();
    assert_eq!(skipped.total(), 4);
    assert_eq!(skipped.count(SkipReason::DuplicateId), 1);
    assert_eq!(skipped.count(SkipReason::UnreadableAudio), 1);
    assert_eq!(skipped.count(SkipReason::LabelOutOfRange), 1);
    assert_eq!(skipped.count(SkipReason::MalformedJson), 1);
    assert_eq!(corpus.examples()[3].id, "spk3");
}

#[test]
fn best_bundle_reproduces_reported_validation_loss() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path());
    let corpus = load(&manifest, dir.path());
    let bundle_dir = dir.path().join("model");

    let mut trainer = Trainer::new(small_config(&bundle_dir), ExtractorConfig::default()).unwrap();
    let report = trainer.run(&corpus).unwrap();
    assert_eq!(trainer.phase(), TrainingPhase::Done);
    assert_eq!(report.used, 10);
    assert_eq!(report.skipped.len(), 4);
    assert_eq!(report.split.validation.len(), 2);
    assert_eq!(report.split.train.len(), 8);

    let bundle = ModelBundle::load(&bundle_dir, corpus.dimension()).unwrap();
    let examples = corpus.examples();
    let mut squared = 0.0_f32;
    for &index in &report.split.validation {
        let scores = bundle.predict(&examples[index].vector).unwrap();
        squared += (scores.pronunciation - examples[index].scores.pronunciation).powi(2);
        squared += (scores.fluency - examples[index].scores.fluency).powi(2);
    }
    let mse = squared / (2 * report.split.validation.len()) as f32;
    assert_abs_diff_eq!(mse, report.best_validation_loss, epsilon = 1e-4);
}

#[test]
fn normalizer_is_fitted_on_training_split_only() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path());
    let corpus = load(&manifest, dir.path());
    let bundle_dir = dir.path().join("model");
    let report = speechgrade::train(&corpus, small_config(&bundle_dir), ExtractorConfig::default())
        .unwrap();

    let bundle = ModelBundle::load(&bundle_dir, corpus.dimension()).unwrap();
    let train: Vec<AudioFeatureVector> = report
        .split
        .train
        .iter()
        .map(|&i| corpus.examples()[i].vector.clone())
        .collect();
    let expected = speechgrade::NormalizationState::fit(&train).unwrap();
    assert_eq!(bundle.normalizer(), &expected);

    let everything: Vec<AudioFeatureVector> =
        corpus.examples().iter().map(|e| e.vector.clone()).collect();
    let leaky = speechgrade::NormalizationState::fit(&everything).unwrap();
    assert_ne!(bundle.normalizer().mean, leaky.mean);
}

#[test]
fn same_seed_gives_same_split() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path());
    let corpus = load(&manifest, dir.path());
    let first = speechgrade::train(
        &corpus,
        small_config(&dir.path().join("a")),
        ExtractorConfig::default(),
    )
    .unwrap();
    let second = speechgrade::train(
        &corpus,
        small_config(&dir.path().join("b")),
        ExtractorConfig::default(),
    )
    .unwrap();
    assert_eq!(first.split, second.split);
}

#[test]
fn empty_corpus_fails_without_writing_a_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("empty.jsonl");
    fs::write(&manifest, "\n{broken\n").unwrap();
    let corpus = load(&manifest, dir.path());
    assert!(corpus.is_empty());

    let bundle_dir = dir.path().join("model");
    let err = speechgrade::train(&corpus, small_config(&bundle_dir), ExtractorConfig::default())
        .unwrap_err();
    assert!(matches!(err, ScoringError::Data(_)));
    assert!(!bundle_dir.exists());
}
