//! Long-lived scoring service over one loaded model bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::error::{Result, ScoringError};
use crate::features::{AudioFeatureVector, ExtractorConfig, FeatureExtractor, SpeechDiagnostics};
use crate::model::ModelBundle;
use crate::types::SubScores;

/// Scores plus the diagnostics of the clip they were computed from.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub scores: SubScores,
    pub diagnostics: SpeechDiagnostics,
}

/// Holds the active bundle and the extractor its vectors must come from.
///
/// Readers clone the current `Arc` under a short read lock, so a
/// [`replace_bundle`](Self::replace_bundle) never tears an in-flight
/// prediction.
pub struct ScoringService {
    extractor: FeatureExtractor,
    bundle: RwLock<Arc<ModelBundle>>,
}

impl ScoringService {
    /// Load the bundle in `dir` for vectors produced under `config`.
    pub fn load<P: AsRef<Path>>(dir: P, config: ExtractorConfig) -> Result<Self> {
        let extractor = FeatureExtractor::new(config)?;
        let bundle = ModelBundle::load(dir.as_ref(), extractor.dimension())?;
        Self::with_bundle(extractor, bundle)
    }

    pub fn with_bundle(extractor: FeatureExtractor, bundle: ModelBundle) -> Result<Self> {
        check_compatible(&extractor, &bundle)?;
        Ok(Self {
            extractor,
            bundle: RwLock::new(Arc::new(bundle)),
        })
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// The bundle currently used for predictions.
    pub fn current_bundle(&self) -> Arc<ModelBundle> {
        self.bundle.read().clone()
    }

    /// Score a raw (unnormalized) feature vector. Scores are not clamped.
    pub fn predict(&self, vector: &AudioFeatureVector) -> Result<SubScores> {
        self.current_bundle().predict(vector)
    }

    /// Decode, extract and score one audio file.
    pub fn assess_file<P: AsRef<Path>>(&self, path: P) -> Result<Assessment> {
        let extracted = self.extractor.extract_file(path)?;
        let scores = self.predict(&extracted.vector)?;
        Ok(Assessment {
            scores,
            diagnostics: extracted.diagnostics,
        })
    }

    /// Extract and score many files in parallel, one result per path in input
    /// order. The whole batch is scored by the bundle current at the call.
    pub fn assess_batch(&self, paths: &[PathBuf]) -> Vec<Result<Assessment>> {
        let bundle = self.current_bundle();
        self.extractor
            .extract_batch(paths)
            .into_iter()
            .map(|extracted| {
                let extracted = extracted?;
                Ok(Assessment {
                    scores: bundle.predict(&extracted.vector)?,
                    diagnostics: extracted.diagnostics,
                })
            })
            .collect()
    }

    /// Publish a fully loaded bundle; later predictions see only the new one.
    pub fn replace_bundle(&self, bundle: ModelBundle) -> Result<()> {
        check_compatible(&self.extractor, &bundle)?;
        let epoch = bundle.metadata().best_epoch;
        *self.bundle.write() = Arc::new(bundle);
        info!(best_epoch = epoch, "model bundle replaced");
        Ok(())
    }

    /// Load a bundle from `dir` and publish it.
    pub fn reload<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let bundle = ModelBundle::load(dir.as_ref(), self.extractor.dimension())?;
        self.replace_bundle(bundle)
    }
}

fn check_compatible(extractor: &FeatureExtractor, bundle: &ModelBundle) -> Result<()> {
    if bundle.input_dim() != extractor.dimension() {
        return Err(ScoringError::DimensionMismatch {
            context: "scoring service",
            expected: extractor.dimension(),
            actual: bundle.input_dim(),
        });
    }
    if &bundle.metadata().extractor != extractor.config() {
        return Err(ScoringError::configuration(format!(
            "bundle was trained with extractor settings {:?}, current settings are {:?}",
            bundle.metadata().extractor,
            extractor.config()
        )));
    }
    Ok(())
}
