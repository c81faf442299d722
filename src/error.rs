use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for results returned by the scoring core.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors surfaced by feature extraction, training and inference.
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("configuration: {context} expects dimension {expected}, found {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("data: {0}")]
    Data(String),

    #[error("resource {}: {message}", path.display())]
    Resource { path: PathBuf, message: String },

    #[error("model: {0}")]
    Model(#[from] candle_core::Error),

    #[error("io {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse category used by callers to decide whether a failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Resource,
    Internal,
}

impl ScoringError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn resource(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::DimensionMismatch { .. } => ErrorKind::Configuration,
            Self::Data(_) => ErrorKind::Data,
            Self::Resource { .. } => ErrorKind::Resource,
            Self::Model(_) | Self::Io { .. } | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}
