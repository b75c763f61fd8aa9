//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding provider operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Failures while obtaining an embedding from a provider.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider has no credentials.
    #[error("embedding provider `{0}` not configured")]
    ProviderNotConfigured(String),

    /// Provider answered with a non-success status.
    #[error("API request failed with status {status}: {message}")]
    ApiRequest { status: u16, message: String },

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The request did not complete in time.
    #[error("embedding request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of vector comparisons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    /// Vectors of different lengths were compared.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A zero (or non-finite) norm makes cosine similarity undefined.
    #[error("degenerate vector: cosine similarity is undefined for a zero-norm vector")]
    DegenerateVector,
}
