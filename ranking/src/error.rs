//! Error types for the similarity ranker.

use semrank_embeddings::{EmbeddingError, VectorError};
use thiserror::Error;

/// Result type alias for ranking operations.
pub type Result<T> = std::result::Result<T, RankError>;

/// Errors that can occur while ranking.
#[derive(Error, Debug)]
pub enum RankError {
    /// The provider failed (or timed out) for one of the texts.
    #[error("embedding provider error: {0}")]
    Provider(#[from] EmbeddingError),

    /// A zero-norm embedding made cosine similarity undefined.
    #[error("degenerate vector: cosine similarity is undefined for a zero-norm embedding")]
    DegenerateVector,

    /// The provider returned embeddings of different lengths.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The caller cancelled the ranking.
    #[error("ranking cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VectorError> for RankError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::DegenerateVector => Self::DegenerateVector,
        }
    }
}

impl From<toml::de::Error> for RankError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
