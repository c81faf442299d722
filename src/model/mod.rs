//! Normalizer, regressor and their persisted bundle.

pub mod bundle;
pub mod normalizer;
pub mod regressor;

pub use bundle::{write_bundle, BundleMetadata, ModelBundle, FORMAT_VERSION};
pub use normalizer::{NormalizationState, EPSILON};
pub use regressor::{RegressorShape, ScoreRegressor};
