//! Weights, normalizer and metadata persisted together in one directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::normalizer::NormalizationState;
use super::regressor::{RegressorShape, ScoreRegressor};
use crate::error::{Result, ScoringError};
use crate::features::{AudioFeatureVector, ExtractorConfig};
use crate::types::SubScores;

pub const WEIGHTS_FILE: &str = "weights.safetensors";
pub const NORMALIZER_FILE: &str = "normalizer.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format_version: u32,
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub best_loss: f32,
    pub best_epoch: usize,
    /// Extractor settings the vectors were produced with during training.
    pub extractor: ExtractorConfig,
}

impl BundleMetadata {
    pub fn shape(&self) -> RegressorShape {
        RegressorShape {
            input_dim: self.input_dim,
            hidden_dim: self.hidden_dim,
            num_layers: self.num_layers,
        }
    }
}

/// A trained regressor with the normalizer it must be paired with.
#[derive(Debug)]
pub struct ModelBundle {
    regressor: ScoreRegressor,
    normalizer: NormalizationState,
    metadata: BundleMetadata,
}

impl ModelBundle {
    pub fn new(
        regressor: ScoreRegressor,
        normalizer: NormalizationState,
        metadata: BundleMetadata,
    ) -> Result<Self> {
        let shape = regressor.shape();
        if shape != metadata.shape() {
            return Err(ScoringError::configuration(format!(
                "metadata describes {:?} but the regressor is {shape:?}",
                metadata.shape()
            )));
        }
        if normalizer.dimension() != shape.input_dim {
            return Err(ScoringError::DimensionMismatch {
                context: "bundle normalizer",
                expected: shape.input_dim,
                actual: normalizer.dimension(),
            });
        }
        Ok(Self {
            regressor,
            normalizer,
            metadata,
        })
    }

    pub fn regressor(&self) -> &ScoreRegressor {
        &self.regressor
    }

    pub fn normalizer(&self) -> &NormalizationState {
        &self.normalizer
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn input_dim(&self) -> usize {
        self.metadata.input_dim
    }

    /// Normalize a raw feature vector and score it.
    pub fn predict(&self, vector: &AudioFeatureVector) -> Result<SubScores> {
        let normalized = self.normalizer.transform(vector)?;
        self.regressor.forward(&normalized)
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        write_bundle(dir.as_ref(), &self.regressor, &self.normalizer, &self.metadata)
    }

    /// Load and validate a bundle for vectors of `expected_input_dim` entries.
    ///
    /// Any missing file, unreadable content or dimension disagreement is a
    /// configuration error; nothing is partially loaded.
    pub fn load<P: AsRef<Path>>(dir: P, expected_input_dim: usize) -> Result<Self> {
        let dir = dir.as_ref();
        let metadata: BundleMetadata = read_json(&dir.join(METADATA_FILE))?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(ScoringError::configuration(format!(
                "unsupported bundle format {} (expected {FORMAT_VERSION})",
                metadata.format_version
            )));
        }
        if metadata.input_dim != expected_input_dim {
            return Err(ScoringError::DimensionMismatch {
                context: "bundle metadata",
                expected: expected_input_dim,
                actual: metadata.input_dim,
            });
        }

        let normalizer: NormalizationState = read_json(&dir.join(NORMALIZER_FILE))?;
        normalizer.validate()?;
        if normalizer.dimension() != expected_input_dim {
            return Err(ScoringError::DimensionMismatch {
                context: "bundle normalizer",
                expected: expected_input_dim,
                actual: normalizer.dimension(),
            });
        }

        let regressor = ScoreRegressor::load(metadata.shape(), dir.join(WEIGHTS_FILE))?;
        info!(
            dir = %dir.display(),
            input_dim = metadata.input_dim,
            hidden_dim = metadata.hidden_dim,
            num_layers = metadata.num_layers,
            best_epoch = metadata.best_epoch,
            "loaded model bundle"
        );
        Self::new(regressor, normalizer, metadata)
    }
}

/// Write all three files, each through a temporary name, metadata last.
pub fn write_bundle(
    dir: &Path,
    regressor: &ScoreRegressor,
    normalizer: &NormalizationState,
    metadata: &BundleMetadata,
) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| ScoringError::io(dir, err))?;

    let weights_tmp = temporary(dir, WEIGHTS_FILE);
    regressor.save(&weights_tmp)?;
    publish(&weights_tmp, &dir.join(WEIGHTS_FILE))?;

    write_json_atomic(dir, NORMALIZER_FILE, normalizer)?;
    write_json_atomic(dir, METADATA_FILE, metadata)?;
    debug!(dir = %dir.display(), best_epoch = metadata.best_epoch, "bundle saved");
    Ok(())
}

fn temporary(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}.tmp"))
}

fn publish(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|err| ScoringError::io(to, err))
}

fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let tmp = temporary(dir, name);
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, json).map_err(|err| ScoringError::io(&tmp, err))?;
    publish(&tmp, &dir.join(name))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|err| {
        ScoringError::configuration(format!("cannot read {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        ScoringError::configuration(format!("corrupt {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(input_dim: usize) -> ModelBundle {
        let shape = RegressorShape {
            input_dim,
            hidden_dim: 8,
            num_layers: 1,
        };
        let vectors = vec![
            AudioFeatureVector::from_vec(vec![0.0; input_dim]),
            AudioFeatureVector::from_vec(vec![1.0; input_dim]),
        ];
        let metadata = BundleMetadata {
            format_version: FORMAT_VERSION,
            input_dim,
            hidden_dim: 8,
            num_layers: 1,
            best_loss: 0.5,
            best_epoch: 3,
            extractor: ExtractorConfig::default(),
        };
        ModelBundle::new(
            ScoreRegressor::new(shape).unwrap(),
            NormalizationState::fit(&vectors).unwrap(),
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn saved_bundle_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let original = bundle(6);
        original.save(dir.path()).unwrap();
        assert!(!temporary(dir.path(), METADATA_FILE).exists());

        let restored = ModelBundle::load(dir.path(), 6).unwrap();
        assert_eq!(restored.metadata(), original.metadata());
        let vector = AudioFeatureVector::from_vec(vec![0.25; 6]);
        assert_eq!(
            restored.predict(&vector).unwrap(),
            original.predict(&vector).unwrap()
        );
    }

    #[test]
    fn dimension_disagreement_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        bundle(6).save(dir.path()).unwrap();
        let err = ModelBundle::load(dir.path(), 7).unwrap_err();
        assert!(matches!(
            err,
            ScoringError::DimensionMismatch {
                expected: 7,
                actual: 6,
                ..
            }
        ));
    }

    #[test]
    fn missing_or_corrupt_files_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelBundle::load(dir.path(), 6).unwrap_err().is_configuration());

        bundle(6).save(dir.path()).unwrap();
        fs::write(dir.path().join(NORMALIZER_FILE), b"{not json").unwrap();
        assert!(ModelBundle::load(dir.path(), 6).unwrap_err().is_configuration());

        bundle(6).save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(WEIGHTS_FILE)).unwrap();
        assert!(ModelBundle::load(dir.path(), 6).unwrap_err().is_configuration());
    }

    #[test]
    fn mismatched_normalizer_is_rejected_at_construction() {
        let shape = RegressorShape {
            input_dim: 4,
            hidden_dim: 8,
            num_layers: 1,
        };
        let normalizer =
            NormalizationState::fit(&[AudioFeatureVector::from_vec(vec![0.0; 3])]).unwrap();
        let metadata = BundleMetadata {
            format_version: FORMAT_VERSION,
            input_dim: 4,
            hidden_dim: 8,
            num_layers: 1,
            best_loss: 0.0,
            best_epoch: 0,
            extractor: ExtractorConfig::default(),
        };
        let err = ModelBundle::new(ScoreRegressor::new(shape).unwrap(), normalizer, metadata)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
