//! Acoustic scoring of spoken responses: feature extraction, a trainable
//! two-output regressor, and a long-lived inference service.

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod model;
pub mod summary;
pub mod training;
pub mod types;

pub use error::{ErrorKind, Result, ScoringError};
pub use features::{
    AudioFeatureVector, ExtractedFeatures, ExtractorConfig, FeatureExtractor, FeatureLayout,
    SpeechDiagnostics,
};
pub use inference::{Assessment, ScoringService};
pub use model::{ModelBundle, NormalizationState, ScoreRegressor};
pub use training::{train, Corpus, TrainingConfig, TrainingReport};
pub use types::{AudioData, SubScores};
