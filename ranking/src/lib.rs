//! # Ranking
//!
//! Ranks a corpus of reference texts by semantic similarity to a query.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Similarity Ranker                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  corpus + query                                                 │
//! │        │                                                        │
//! │        ▼                                                        │
//! │  ┌──────────────┐   bounded, order-preserving fan-out           │
//! │  │  Embedding   │ ◄──────────────────────────────────────┐      │
//! │  │  Provider    │                                        │      │
//! │  └──────────────┘                                        │      │
//! │        │  one vector per text                            │      │
//! │        ▼                                                 │      │
//! │  ┌──────────────┐      ┌──────────────┐                  │      │
//! │  │  Dimension   │ ───► │   Cosine +   │ ───► ranked      │      │
//! │  │  check       │      │ stable sort  │      results     │      │
//! │  └──────────────┘      └──────────────┘                  │      │
//! │                                                          │      │
//! │  CancellationToken / per-request timeout ────────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semrank_ranking::{RankerConfig, SimilarityRanker};
//!
//! let ranker = SimilarityRanker::from_config(&RankerConfig::default())?;
//!
//! let facts = [
//!     "The first moon landing was in 1969.",
//!     "The capital of France is Paris.",
//! ];
//! let ranked = ranker.rank(&facts, "I like to play computer games").await?;
//! ```

pub mod config;
pub mod error;
pub mod ranker;

pub use config::{EmbeddingConfig, EmbeddingProviderType, RankerConfig};
pub use error::{RankError, Result};
pub use ranker::{RankOptions, SimilarityRanker, SimilarityRankerBuilder};

// Re-export from dependencies for convenience
pub use semrank_embeddings::{EmbeddingProvider, SimilarityResult};
pub use tokio_util::sync::CancellationToken;
