//! Configuration for the similarity ranker.
//!
//! Credentials never live here: providers read their API keys from the
//! environment.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use semrank_embeddings::{
    BedrockProvider, CachedProvider, EmbeddingCache, EmbeddingProvider, OpenAIProvider,
};

use crate::error::{RankError, Result};

/// Configuration for the similarity ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Maximum number of embedding requests in flight at once.
    pub max_concurrency: usize,

    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,
}

impl RankerConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded ranker configuration from {}", path.display());
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(RankError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RankError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.embedding.cache_enabled && self.embedding.cache_max_entries == 0 {
            return Err(RankError::Config(
                "cache_max_entries must be at least 1 when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the maximum number of concurrent embedding requests.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout_secs: 30,
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use; the provider's default when unset.
    pub model: Option<String>,

    /// Region for regional providers; taken from the environment when unset.
    pub region: Option<String>,

    /// Endpoint override.
    pub base_url: Option<String>,

    /// Environment variable holding the API key; the provider's standard
    /// variable when unset.
    pub api_key_env: Option<String>,

    /// Output dimensions, for models that support shortened embeddings.
    pub dimensions: Option<usize>,

    /// Whether to cache embeddings across rankings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Bedrock,
            model: None,
            region: None,
            base_url: None,
            api_key_env: None,
            dimensions: None,
            cache_enabled: false,
            cache_max_entries: 10000,
        }
    }
}

impl EmbeddingConfig {
    /// Build the configured provider, wrapped in a cache when enabled.
    pub fn build_provider(&self) -> Arc<dyn EmbeddingProvider> {
        let provider: Arc<dyn EmbeddingProvider> = match self.provider {
            EmbeddingProviderType::Bedrock => {
                let mut provider = BedrockProvider::new();
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(region) = &self.region {
                    provider = provider.with_region(region);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                if let Some(var) = &self.api_key_env {
                    provider = provider.with_api_key_env(var);
                }
                Arc::new(provider)
            }
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new();
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                if let Some(var) = &self.api_key_env {
                    provider = provider.with_api_key_env(var);
                }
                Arc::new(provider)
            }
        };

        if self.cache_enabled {
            Arc::new(CachedProvider::new(
                provider,
                EmbeddingCache::new(self.cache_max_entries),
            ))
        } else {
            provider
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Amazon Bedrock runtime (Titan embeddings).
    Bedrock,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}
