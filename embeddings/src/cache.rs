//! Embedding cache for avoiding repeated provider calls.
//!
//! Entries are keyed by the exact text and the model that embedded it, so a
//! text is only shared between calls when both match byte for byte.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

type CacheKey = [u8; 32];

/// Bounded, least-recently-used cache of embeddings.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, Embedding>>,
    max_entries: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_entries` embeddings.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, model: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = Self::key(text, model);
        let found = self.entries.lock().await.get(&key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Put an embedding in the cache, evicting the least recently used entry
    /// when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        let key = Self::key(text, model);
        let mut entries = self.entries.lock().await;
        if entries
            .push(key, embedding)
            .is_some_and(|(replaced, _)| replaced != key)
        {
            debug!("Evicted least recently used embedding");
        }
    }

    /// Check if an embedding is cached without touching its recency.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        self.entries
            .lock()
            .await
            .contains(&Self::key(text, model))
    }

    /// Drop the cached embedding for one text. Returns whether it was present.
    pub async fn invalidate(&self, text: &str, model: &str) -> bool {
        self.entries
            .lock()
            .await
            .pop(&Self::key(text, model))
            .is_some()
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().await.len(),
            max_entries: self.max_entries.get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to go to the provider.
    pub misses: u64,
}

/// A provider that consults an [`EmbeddingCache`] before calling the wrapped
/// provider. Failed calls are never cached.
pub struct CachedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedProvider {
    /// Create a new cached provider.
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingProvider for CachedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.inner.model().to_string());

        // Requested dimensions change the vector, so they are part of the key.
        let key_model = match request.dimensions {
            Some(dims) => format!("{model}@{dims}"),
            None => model.clone(),
        };

        if let Some(embedding) = self.cache.get(&request.text, &key_model).await {
            debug!("Cache hit for embedding");
            return Ok(EmbeddingResponse::new(embedding, model));
        }

        let text = request.text.clone();
        let response = self.inner.embed(request).await?;
        self.cache
            .put(&text, &key_model, response.embedding.clone())
            .await;

        Ok(response)
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    /// Embeds a text as `[len, 1.0]` and counts calls.
    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> &str {
            "counting-v1"
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.text == "fail" {
                return Err(EmbeddingError::InvalidResponse("boom".to_string()));
            }
            Ok(EmbeddingResponse::new(
                vec![request.text.len() as f32, 1.0],
                self.model(),
            ))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hello", "model-1", embedding.clone()).await;

        assert_eq!(cache.get("hello", "model-1").await, Some(embedding));
        assert_eq!(cache.get("hello", "model-2").await, None);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = EmbeddingCache::new(100);
        assert!(cache.get("not cached", "model-1").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a", "model").await.is_some());
        cache.put("c", "model", vec![3.0]).await;

        assert_eq!(cache.stats().await.entries, 2);
        assert!(cache.contains("a", "model").await);
        assert!(!cache.contains("b", "model").await);
        assert!(cache.contains("c", "model").await);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = EmbeddingCache::new(10);
        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;

        assert!(cache.invalidate("a", "model").await);
        assert!(!cache.invalidate("a", "model").await);
        assert!(!cache.contains("a", "model").await);

        cache.clear().await;
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_cached_provider_skips_repeat_calls() {
        let inner = Arc::new(CountingProvider::default());
        let provider = CachedProvider::new(inner.clone(), EmbeddingCache::new(10));

        let first = provider.embed(EmbeddingRequest::new("abc")).await.unwrap();
        let second = provider.embed(EmbeddingRequest::new("abc")).await.unwrap();

        assert_eq!(first.embedding, second.embedding);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        provider.embed(EmbeddingRequest::new("abcd")).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_provider_keys_on_dimensions() {
        let inner = Arc::new(CountingProvider::default());
        let provider = CachedProvider::new(inner.clone(), EmbeddingCache::new(10));

        provider.embed(EmbeddingRequest::new("abc")).await.unwrap();
        provider
            .embed(EmbeddingRequest::new("abc").with_dimensions(256))
            .await
            .unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_provider_does_not_cache_failures() {
        let inner = Arc::new(CountingProvider::default());
        let provider = CachedProvider::new(inner.clone(), EmbeddingCache::new(10));

        assert!(provider.embed(EmbeddingRequest::new("fail")).await.is_err());
        assert!(provider.embed(EmbeddingRequest::new("fail")).await.is_err());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cache().stats().await.entries, 0);
    }
}
