//! Embeddings module
//! Text embeddings via an OpenAI-compatible endpoint or a local Ollama model

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::{DeskError, DeskResult};

const DEFAULT_OPENAI_BASE: &str = "https://models.inference.ai.azure.com";
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";
/// Entries kept before the cache is flushed
const MAX_CACHE_ENTRIES: usize = 512;

/// Produces the semantic representation of a text
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> DeskResult<Vec<f32>>;
}

enum Backend {
    OpenAi(OpenAIClient<OpenAIConfig>),
    Ollama(Ollama),
}

/// Caching embedder over the configured backend
pub struct EmbeddingClient {
    backend: Backend,
    model_name: String,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

impl EmbeddingClient {
    /// OpenAI-compatible endpoint (OpenAI, GitHub Models, Azure inference)
    pub fn openai(api_key: &str, api_base: Option<&str>, model: &str) -> Self {
        let api_base = api_base.unwrap_or(DEFAULT_OPENAI_BASE);
        info!("Initializing OpenAI-compatible embeddings ({}) at {}", model, api_base);

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            backend: Backend::OpenAi(OpenAIClient::with_config(config)),
            model_name: model.to_string(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Local Ollama embedding model
    pub fn ollama(base_url: &str, model: &str) -> Self {
        info!("Initializing Ollama embeddings ({}) at {}", model, base_url);

        Self {
            backend: Backend::Ollama(crate::llm::ollama_from_url(base_url)),
            model_name: model.to_string(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build from configuration. The OpenAI backend needs an API key.
    pub fn from_config(config: &Config) -> DeskResult<Self> {
        match config.embeddings.provider.as_str() {
            "openai" => {
                let api_key = config.apis.openai_api_key.as_deref().ok_or_else(|| {
                    DeskError::Configuration("OPENAI_API_KEY or GITHUB_TOKEN not set".into())
                })?;
                let model = config.embeddings.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
                Ok(Self::openai(api_key, config.embeddings.api_base.as_deref(), model))
            }
            "ollama" => {
                let base = config
                    .embeddings
                    .api_base
                    .as_deref()
                    .unwrap_or(&config.llm.ollama_url);
                let model = config.embeddings.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
                Ok(Self::ollama(base, model))
            }
            other => Err(DeskError::Configuration(format!(
                "Unknown EMBEDDING_PROVIDER '{}' (use 'ollama' or 'openai')",
                other
            ))),
        }
    }

    async fn generate(&self, text: &str) -> DeskResult<Vec<f32>> {
        match &self.backend {
            Backend::OpenAi(client) => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(&self.model_name)
                    .input(EmbeddingInput::String(text.to_string()))
                    .build()
                    .map_err(|e| DeskError::embedding(format!("Invalid embedding request: {}", e)))?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| DeskError::embedding(format!("Embedding API error: {}", e)))?;

                response
                    .data
                    .into_iter()
                    .next()
                    .map(|data| data.embedding)
                    .ok_or_else(|| DeskError::embedding("No embedding returned"))
            }
            Backend::Ollama(client) => {
                let request = GenerateEmbeddingsRequest::new(
                    self.model_name.clone(),
                    EmbeddingsInput::from(text),
                );

                let response = client
                    .generate_embeddings(request)
                    .await
                    .map_err(|e| DeskError::embedding(format!("Ollama embedding error: {}", e)))?;

                response
                    .embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| DeskError::embedding("No embedding returned"))
            }
        }
    }

    /// Get cache statistics
    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Clear the embedding cache
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        info!("Embedding cache cleared");
    }

    async fn remember(&self, text: &str, embedding: Vec<f32>) {
        let mut cache = self.cache.write().await;
        if cache.len() >= MAX_CACHE_ENTRIES && !cache.contains_key(text) {
            debug!("Embedding cache full ({} entries), flushing", cache.len());
            cache.clear();
        }
        cache.insert(text.to_string(), embedding);
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> DeskResult<Vec<f32>> {
        {
            let cache = self.cache.read().await;
            if let Some(embedding) = cache.get(text) {
                return Ok(embedding.clone());
            }
        }

        let embedding = self.generate(text).await?;

        debug!(
            "Generated embedding with {} dimensions for text (first 50 chars): {}",
            embedding.len(),
            text.chars().take(50).collect::<String>()
        );

        self.remember(text, embedding.clone()).await;
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_requires_key() {
        let mut config = Config::default();
        config.embeddings.provider = "openai".into();
        assert!(matches!(
            EmbeddingClient::from_config(&config),
            Err(DeskError::Configuration(_))
        ));

        config.apis.openai_api_key = Some("test-key".into());
        assert!(EmbeddingClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        config.embeddings.provider = "word2vec".into();
        assert!(EmbeddingClient::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let embedder = EmbeddingClient::ollama("http://localhost:11434", "nomic-embed-text");
        for i in 0..MAX_CACHE_ENTRIES {
            embedder.remember(&format!("doc {}", i), vec![i as f32]).await;
        }
        assert_eq!(embedder.cache_len().await, MAX_CACHE_ENTRIES);

        // Re-caching a known text keeps the entries
        embedder.remember("doc 0", vec![0.0]).await;
        assert_eq!(embedder.cache_len().await, MAX_CACHE_ENTRIES);

        embedder.remember("one more", vec![1.0]).await;
        assert_eq!(embedder.cache_len().await, 1);

        embedder.clear_cache().await;
        assert_eq!(embedder.cache_len().await, 0);
    }

    #[tokio::test]
    #[ignore = "Requires a running Ollama with nomic-embed-text pulled"]
    async fn test_embedding_generation_is_cached() {
        let embedder = EmbeddingClient::ollama("http://localhost:11434", "nomic-embed-text");
        let text = "The market is showing strong bullish sentiment today";

        let first = embedder.embed(text).await.expect("Failed to generate embedding");
        let second = embedder.embed(text).await.expect("Failed to generate embedding");
        assert_eq!(first, second);
        assert_eq!(embedder.cache_len().await, 1);
    }
}
