//! Similarity ranker implementation.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use semrank_embeddings::{
    Embedding, EmbeddingError, EmbeddingProvider, EmbeddingRequest, ScoredText, SimilarityResult,
    rank_by_similarity,
};

use crate::config::RankerConfig;
use crate::error::{RankError, Result};

/// Tuning for a [`SimilarityRanker`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    /// Maximum number of embedding requests in flight at once. `1` embeds
    /// the texts strictly one after another.
    pub max_concurrency: usize,

    /// Upper bound on a single embedding request.
    pub request_timeout: Duration,

    /// Output dimensions requested from the provider.
    pub dimensions: Option<usize>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            dimensions: None,
        }
    }
}

/// Ranks a corpus of texts by cosine similarity of their embeddings to a
/// query embedding.
///
/// The ranker keeps no state between calls; every [`rank`](Self::rank)
/// embeds its inputs afresh through the provider it was built with.
pub struct SimilarityRanker {
    provider: Arc<dyn EmbeddingProvider>,
    options: RankOptions,
}

impl SimilarityRanker {
    /// Create a ranker with default options.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            options: RankOptions::default(),
        }
    }

    /// Create a new ranker builder.
    pub fn builder() -> SimilarityRankerBuilder {
        SimilarityRankerBuilder::new()
    }

    /// Build a ranker and its provider from configuration.
    pub fn from_config(config: &RankerConfig) -> Result<Self> {
        config.validate()?;

        let provider = config.embedding.build_provider();
        info!(
            "Using {} embeddings with model {}",
            provider.name(),
            provider.model()
        );

        Ok(Self {
            provider,
            options: RankOptions {
                max_concurrency: config.max_concurrency,
                request_timeout: config.request_timeout(),
                dimensions: config.embedding.dimensions,
            },
        })
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn options(&self) -> &RankOptions {
        &self.options
    }

    /// Rank `corpus` by similarity to `query`, most similar first.
    ///
    /// The result holds one entry per corpus text. Entries with equal scores
    /// keep their corpus order. Any provider failure aborts the whole ranking.
    /// An empty corpus returns immediately without embedding the query.
    pub async fn rank<S: AsRef<str>>(
        &self,
        corpus: &[S],
        query: &str,
    ) -> Result<Vec<SimilarityResult>> {
        self.rank_with_cancel(corpus, query, &CancellationToken::new())
            .await
    }

    /// Like [`rank`](Self::rank), but gives up with [`RankError::Cancelled`]
    /// as soon as `cancel` fires. Outstanding requests are dropped. A token
    /// that is already cancelled fails even for an empty corpus.
    pub async fn rank_with_cancel<S: AsRef<str>>(
        &self,
        corpus: &[S],
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SimilarityResult>> {
        if cancel.is_cancelled() {
            return Err(RankError::Cancelled);
        }
        if corpus.is_empty() {
            debug!("Empty corpus, nothing to rank");
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = corpus
            .iter()
            .map(AsRef::<str>::as_ref)
            .chain(std::iter::once(query))
            .collect();

        debug!(
            "Embedding {} corpus texts and the query with up to {} concurrent requests",
            corpus.len(),
            self.options.max_concurrency
        );

        let mut embeddings = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Ranking cancelled");
                return Err(RankError::Cancelled);
            }
            embeddings = self.embed_all(texts) => embeddings?,
        };

        let query_embedding = embeddings.pop().ok_or_else(|| {
            EmbeddingError::InvalidResponse("missing query embedding".to_string())
        })?;

        let scored = corpus
            .iter()
            .zip(embeddings)
            .map(|(text, embedding)| {
                if embedding.len() != query_embedding.len() {
                    return Err(RankError::DimensionMismatch {
                        expected: query_embedding.len(),
                        actual: embedding.len(),
                    });
                }
                let text: &str = text.as_ref();
                Ok(ScoredText::new(text, embedding))
            })
            .collect::<Result<Vec<_>>>()?;

        let results = rank_by_similarity(&query_embedding, &scored)?;

        info!("Ranked {} texts against query", results.len());
        Ok(results)
    }

    /// The `k` most similar corpus texts.
    pub async fn top_k<S: AsRef<str>>(
        &self,
        corpus: &[S],
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>> {
        let mut results = self.rank(corpus, query).await?;
        results.truncate(k);
        Ok(results)
    }

    /// The single most similar corpus text, `None` for an empty corpus.
    pub async fn best_match<S: AsRef<str>>(
        &self,
        corpus: &[S],
        query: &str,
    ) -> Result<Option<SimilarityResult>> {
        Ok(self.rank(corpus, query).await?.into_iter().next())
    }

    /// Embed `texts` with bounded concurrency. Output order matches input
    /// order; the first failure to complete drops every request still in
    /// flight.
    async fn embed_all(&self, texts: Vec<&str>) -> Result<Vec<Embedding>> {
        let mut indexed: Vec<(usize, Embedding)> = stream::iter(texts.into_iter().enumerate())
            .map(|(index, text)| async move {
                self.embed_one(text)
                    .await
                    .map(|embedding| (index, embedding))
            })
            .buffer_unordered(self.options.max_concurrency.max(1))
            .try_collect()
            .await?;

        indexed.sort_unstable_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
    }

    async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut request = EmbeddingRequest::new(text);
        if let Some(dimensions) = self.options.dimensions {
            request = request.with_dimensions(dimensions);
        }

        let timeout = self.options.request_timeout;
        match tokio::time::timeout(timeout, self.provider.embed(request)).await {
            Ok(Ok(response)) => Ok(response.embedding),
            Ok(Err(err)) => {
                warn!("Embedding request to {} failed: {err}", self.provider.name());
                Err(err.into())
            }
            Err(_) => {
                warn!(
                    "Embedding request to {} timed out after {timeout:?}",
                    self.provider.name()
                );
                Err(EmbeddingError::Timeout {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into())
            }
        }
    }
}

/// Builder for [`SimilarityRanker`].
pub struct SimilarityRankerBuilder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    options: RankOptions,
}

impl SimilarityRankerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            options: RankOptions::default(),
        }
    }

    /// Set the embedding provider.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the maximum number of concurrent embedding requests.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.options.max_concurrency = max_concurrency;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Request shortened embeddings from the provider.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.options.dimensions = Some(dimensions);
        self
    }

    /// Build the ranker.
    pub fn build(self) -> Result<SimilarityRanker> {
        let provider = self
            .provider
            .ok_or_else(|| RankError::Config("no embedding provider set".to_string()))?;

        if self.options.max_concurrency == 0 {
            return Err(RankError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(SimilarityRanker {
            provider,
            options: self.options,
        })
    }
}

impl Default for SimilarityRankerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
