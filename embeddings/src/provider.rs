//! Embedding providers.
//!
//! A provider turns one text into one vector with a single network call. It
//! does not retry and keeps no state beyond its HTTP client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Request for generating an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,

    /// Dimensions for the output (if supported by provider).
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Dimension of the embedding.
    pub dimension: usize,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

impl EmbeddingResponse {
    pub fn new(embedding: Embedding, model: impl Into<String>) -> Self {
        Self {
            dimension: embedding.len(),
            embedding,
            model: model.into(),
            tokens_used: None,
        }
    }
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn model(&self) -> &str;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// POST `body` with bearer auth and decode a successful JSON reply.
async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<T> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    Ok(response.json().await?)
}

/// Turn a non-success HTTP response into an [`EmbeddingError`].
async fn error_from_response(response: reqwest::Response) -> EmbeddingError {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return EmbeddingError::RateLimited { retry_after_secs };
    }

    let body = response.text().await.unwrap_or_default();
    // Both APIs put a human readable message in the JSON body.
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or(body);

    EmbeddingError::ApiRequest {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.message.or_else(|| self.error.map(|e| e.message))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Amazon Bedrock runtime provider for the Titan text-embedding models.
///
/// Authenticates with a Bedrock API key sent as a bearer token.
pub struct BedrockProvider {
    /// Bedrock API key.
    api_key: Option<String>,

    /// AWS region hosting the model.
    region: String,

    /// Endpoint override; derived from the region when unset.
    base_url: Option<String>,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    default_model: String,
}

impl BedrockProvider {
    pub const DEFAULT_MODEL: &'static str = "amazon.titan-embed-text-v1";
    pub const DEFAULT_REGION: &'static str = "us-east-1";
    pub const API_KEY_ENV: &'static str = "AWS_BEARER_TOKEN_BEDROCK";

    /// Create a provider configured from `AWS_BEARER_TOKEN_BEDROCK` and
    /// `AWS_REGION` / `AWS_DEFAULT_REGION`.
    pub fn new() -> Self {
        Self {
            api_key: env_var(Self::API_KEY_ENV),
            region: Self::region_from(env_var),
            base_url: None,
            client: reqwest::Client::new(),
            default_model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    /// Resolve the region through `lookup`: `AWS_REGION` first, then
    /// `AWS_DEFAULT_REGION`, then [`Self::DEFAULT_REGION`].
    fn region_from(lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup("AWS_REGION")
            .or_else(|| lookup("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| Self::DEFAULT_REGION.to_string())
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the API key from the environment variable `name` instead of
    /// `AWS_BEARER_TOKEN_BEDROCK`.
    pub fn with_api_key_env(mut self, name: &str) -> Self {
        self.api_key = env_var(name);
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Send requests to `url` instead of the regional endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn endpoint(&self, model: &str) -> String {
        let base = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        };
        format!("{base}/model/{model}/invoke")
    }
}

impl Default for BedrockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn model(&self) -> &str {
        &self.default_model
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| EmbeddingError::ProviderNotConfigured(self.name().to_string()))?;

        let model = request.model.unwrap_or_else(|| self.default_model.clone());

        debug!("Invoking Bedrock model {model} in {}", self.region);

        let mut body = serde_json::json!({ "inputText": request.text });
        if let Some(dims) = request.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let result: TitanEmbeddingResponse =
            post_json(&self.client, &self.endpoint(&model), api_key, &body).await?;
        let embedding = result.embedding.ok_or_else(|| {
            EmbeddingError::InvalidResponse("No embedding in response".to_string())
        })?;

        debug!("Received embedding with {} dimensions", embedding.len());

        Ok(EmbeddingResponse {
            tokens_used: result.input_text_token_count,
            ..EmbeddingResponse::new(embedding, model)
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Titan embedding response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanEmbeddingResponse {
    embedding: Option<Vec<f32>>,
    input_text_token_count: Option<u64>,
}

/// Provider for any endpoint speaking the OpenAI `/embeddings` protocol.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    default_model: String,
}

impl OpenAIProvider {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    /// Create a provider configured from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: env_var(Self::API_KEY_ENV),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the API key from the environment variable `name` instead of
    /// `OPENAI_API_KEY`.
    pub fn with_api_key_env(mut self, name: &str) -> Self {
        self.api_key = env_var(name);
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.default_model
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| EmbeddingError::ProviderNotConfigured(self.name().to_string()))?;

        let model = request.model.unwrap_or_else(|| self.default_model.clone());

        debug!("Requesting {model} embedding from {}", self.base_url);

        let mut body = serde_json::json!({ "input": request.text, "model": model });
        if let Some(dims) = request.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let result: EmbeddingList = post_json(&self.client, &url, api_key, &body).await?;

        // One input was sent, so exactly one item should come back.
        let embedding = result
            .data
            .into_iter()
            .find(|item| item.index == 0)
            .map(|item| item.embedding)
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?;

        Ok(EmbeddingResponse {
            tokens_used: result.usage.map(|u| u.total_tokens),
            ..EmbeddingResponse::new(embedding, result.model.unwrap_or(model))
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// `/embeddings` response body.
#[derive(Debug, Deserialize)]
struct EmbeddingList {
    data: Vec<EmbeddingItem>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TITAN_PATH: &str = "/model/amazon.titan-embed-text-v1/invoke";

    fn bedrock(server: &MockServer) -> BedrockProvider {
        BedrockProvider::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
    }

    #[test]
    fn test_embedding_request() {
        let request = EmbeddingRequest::new("Hello world")
            .with_model("amazon.titan-embed-text-v2:0")
            .with_dimensions(512);

        assert_eq!(request.text, "Hello world");
        assert_eq!(
            request.model,
            Some("amazon.titan-embed-text-v2:0".to_string())
        );
        assert_eq!(request.dimensions, Some(512));
    }

    #[test]
    fn test_bedrock_regional_endpoint() {
        let provider = BedrockProvider::new().with_region("eu-west-1");
        assert_eq!(
            provider.endpoint("amazon.titan-embed-text-v1"),
            "https://bedrock-runtime.eu-west-1.amazonaws.com/model/amazon.titan-embed-text-v1/invoke"
        );
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_bedrock_region_from_environment() {
        let both = [
            ("AWS_DEFAULT_REGION", "eu-north-1"),
            ("AWS_REGION", "ap-southeast-2"),
        ];
        assert_eq!(BedrockProvider::region_from(lookup(&both)), "ap-southeast-2");
        assert_eq!(
            BedrockProvider::region_from(lookup(&both[..1])),
            "eu-north-1"
        );
        assert_eq!(
            BedrockProvider::region_from(lookup(&[])),
            BedrockProvider::DEFAULT_REGION
        );

        assert_eq!(
            BedrockProvider::new().region(),
            BedrockProvider::region_from(env_var)
        );
    }

    #[test]
    fn test_api_key_from_unset_variable() {
        let provider = BedrockProvider::new()
            .with_api_key("stale")
            .with_api_key_env("SEMRANK_TEST_KEY_THAT_IS_NEVER_SET");
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_bedrock_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TITAN_PATH))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({ "inputText": "The capital of France is Paris." })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.25, -0.5, 1.0],
                "inputTextTokenCount": 8
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = bedrock(&server)
            .embed(EmbeddingRequest::new("The capital of France is Paris."))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.25, -0.5, 1.0]);
        assert_eq!(response.dimension, 3);
        assert_eq!(response.model, "amazon.titan-embed-text-v1");
        assert_eq!(response.tokens_used, Some(8));
    }

    #[tokio::test]
    async fn test_bedrock_forwards_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/model/amazon.titan-embed-text-v2:0/invoke"))
            .and(body_json(serde_json::json!({ "inputText": "hi", "dimensions": 256 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "embedding": [1.0, 0.0] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = bedrock(&server)
            .with_model("amazon.titan-embed-text-v2:0")
            .embed(EmbeddingRequest::new("hi").with_dimensions(256))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![1.0, 0.0]);
        assert_eq!(response.tokens_used, None);
    }

    #[tokio::test]
    async fn test_bedrock_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TITAN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "Malformed input request"
            })))
            .mount(&server)
            .await;

        let err = bedrock(&server)
            .embed(EmbeddingRequest::new(""))
            .await
            .unwrap_err();

        match err {
            EmbeddingError::ApiRequest { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Malformed input request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bedrock_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TITAN_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = bedrock(&server)
            .embed(EmbeddingRequest::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_bedrock_missing_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TITAN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "inputTextTokenCount": 1 })),
            )
            .mount(&server)
            .await;

        let err = bedrock(&server)
            .embed(EmbeddingRequest::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = BedrockProvider::new().with_base_url(server.uri());
        provider.api_key = None;

        assert!(!provider.is_available());
        let err = provider
            .embed(EmbeddingRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderNotConfigured(name) if name == "bedrock"));
    }

    #[tokio::test]
    async fn test_openai_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2], "index": 0 }],
                "model": "text-embedding-3-small",
                "usage": { "prompt_tokens": 3, "total_tokens": 3 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = OpenAIProvider::new()
            .with_api_key("sk-test")
            .with_base_url(server.uri())
            .embed(EmbeddingRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.1, 0.2]);
        assert_eq!(response.tokens_used, Some(3));
    }

    #[tokio::test]
    async fn test_openai_compatible_without_model_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(serde_json::json!({
                "input": "hello",
                "model": "nomic-embed-text",
                "dimensions": 64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.3, 0.4] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = OpenAIProvider::new()
            .with_api_key("local")
            .with_base_url(format!("{}/v1/", server.uri()))
            .with_model("nomic-embed-text")
            .embed(EmbeddingRequest::new("hello").with_dimensions(64))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.3, 0.4]);
        assert_eq!(response.model, "nomic-embed-text");
        assert_eq!(response.tokens_used, None);
    }

    #[tokio::test]
    async fn test_openai_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let err = OpenAIProvider::new()
            .with_api_key("bad")
            .with_base_url(server.uri())
            .embed(EmbeddingRequest::new("hello"))
            .await
            .unwrap_err();

        match err {
            EmbeddingError::ApiRequest { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
