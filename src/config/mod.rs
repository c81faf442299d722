use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::features::ExtractorConfig;
use crate::training::TrainingConfig;

/// Environment variable naming the bundle directory for prediction.
pub const BUNDLE_ENV: &str = "SPEECHGRADE_BUNDLE";

/// On-disk configuration: `{"extractor": {..}, "training": {..}}`, both optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub extractor: ExtractorConfig,
    pub training: TrainingConfig,
}

impl ScorerConfig {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn from_override(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.extractor.validate()?;
        config.training.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            ScoringError::configuration(format!("cannot read config {}: {err}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|err| {
            ScoringError::configuration(format!("invalid config {}: {err}", path.display()))
        })
    }

    /// The bundle directory to load: an explicit choice wins over training's output dir.
    pub fn bundle_dir(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.training.output_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = ScorerConfig::from_override(None).unwrap();
        assert_eq!(config, ScorerConfig::default());
        assert_eq!(config.bundle_dir(None), PathBuf::from("./audio_model"));
        assert_eq!(
            config.bundle_dir(Some(Path::new("/models/v2"))),
            PathBuf::from("/models/v2")
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"training": {"epochs": 5}, "extractor": {"n_mfcc": 20}}"#).unwrap();

        let config = ScorerConfig::from_override(Some(&path)).unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.extractor.n_mfcc, 20);
        assert_eq!(config.extractor.dimension(), 117);
    }

    #[test]
    fn unreadable_or_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(ScorerConfig::from_override(Some(&missing))
            .unwrap_err()
            .is_configuration());

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{"extractor": {"hop_size": 0}}"#).unwrap();
        assert!(ScorerConfig::from_override(Some(&invalid))
            .unwrap_err()
            .is_configuration());
    }
}
