//! # Embeddings
//!
//! Text embedding providers and the vector math used to compare their output.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through a hosted model
//! - **Multiple Providers**: Amazon Bedrock (Titan) and OpenAI-compatible endpoints
//! - **Similarity**: Cosine similarity and stable descending ranking
//! - **Caching**: Optional content-addressed cache in front of any provider
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► rank_by_similarity         │
//! │       │                                   │                     │
//! │       ▼                                   ▼                     │
//! │  Bedrock/OpenAI ◄── CachedProvider   SimilarityResult           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result, VectorError};
pub use provider::{
    BedrockProvider, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider,
};
pub use similarity::{
    ScoredText, SimilarityResult, cosine_similarity, dot_product, norm, rank_by_similarity,
};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
