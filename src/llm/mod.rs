//! LLM integration module for Ollama
//! Text completion with per-attempt timeouts and exponential backoff

pub mod prompts;

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;

use crate::errors::{DeskError, DeskResult};

/// Text completion service consumed by the analysis and reflection pipelines
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system_instructions: &str, user_payload: &str, temperature: f32) -> DeskResult<String>;
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub ollama_url: String,
    pub primary_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            primary_model: "llama3.2:3b".to_string(),
            timeout_seconds: 60,
            max_retries: 3,
        }
    }
}

/// Build an Ollama client from a base URL such as `http://localhost:11434`
pub fn ollama_from_url(base_url: &str) -> Ollama {
    match Url::parse(base_url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("localhost");
            let port = parsed.port().unwrap_or(11434);
            Ollama::new(format!("{}://{}", parsed.scheme(), host), port)
        }
        Err(e) => {
            warn!("Invalid Ollama URL '{}': {}; using default endpoint", base_url, e);
            Ollama::default()
        }
    }
}

/// LLM client with local Ollama integration
#[derive(Debug, Clone)]
pub struct LLMClient {
    ollama: Ollama,
    config: LLMConfig,
}

impl LLMClient {
    pub fn new(config: LLMConfig) -> Self {
        let ollama = ollama_from_url(&config.ollama_url);
        Self { ollama, config }
    }

    /// Create client from config::Config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(LLMConfig {
            ollama_url: config.llm.ollama_url.clone(),
            primary_model: config.llm.primary_model.clone(),
            timeout_seconds: config.llm.timeout_seconds,
            max_retries: config.llm.max_retries.max(1),
        })
    }

    /// Verify Ollama is reachable and report whether the primary model is pulled
    pub async fn check_connectivity(&self) -> DeskResult<bool> {
        info!("Testing Ollama connectivity at {}", self.config.ollama_url);

        match timeout(Duration::from_secs(10), self.ollama.list_local_models()).await {
            Ok(Ok(models)) => {
                let available = models
                    .iter()
                    .any(|m| m.name.contains(&self.config.primary_model));
                if !available {
                    warn!(
                        "Primary model '{}' not found. Consider pulling it with: ollama pull {}",
                        self.config.primary_model, self.config.primary_model
                    );
                }
                Ok(available)
            }
            Ok(Err(e)) => Err(DeskError::completion(format!(
                "Ollama API error when listing models: {}. Is Ollama running?",
                e
            ))),
            Err(_) => Err(DeskError::Timeout { timeout_seconds: 10 }),
        }
    }
}

#[async_trait]
impl CompletionService for LLMClient {
    async fn complete(&self, system_instructions: &str, user_payload: &str, temperature: f32) -> DeskResult<String> {
        let model_name = &self.config.primary_model;

        info!(
            "Generating text with model '{}' (prompt length: {} chars)",
            model_name,
            system_instructions.len() + user_payload.len()
        );

        let request = ChatMessageRequest::new(
            model_name.clone(),
            vec![
                ChatMessage::system(system_instructions.to_string()),
                ChatMessage::user(user_payload.to_string()),
            ],
        )
        .options(ModelOptions::default().temperature(temperature));

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match timeout(
                Duration::from_secs(self.config.timeout_seconds),
                self.ollama.send_chat_messages(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    info!(
                        "Generated {} chars with model '{}'",
                        response.message.content.len(),
                        model_name
                    );
                    return Ok(response.message.content);
                }
                Ok(Err(e)) => {
                    error!("Ollama API error on attempt {}: {}", attempt, e);
                    last_error = Some(DeskError::completion(format!("Ollama API error: {}", e)));
                }
                Err(_) => {
                    error!(
                        "Timeout on attempt {} after {} seconds",
                        attempt, self.config.timeout_seconds
                    );
                    last_error = Some(DeskError::Timeout {
                        timeout_seconds: self.config.timeout_seconds,
                    });
                }
            }

            if attempt < self.config.max_retries {
                let backoff_seconds = 2_u64.pow(attempt - 1);
                warn!(
                    "Retrying in {} seconds (attempt {}/{})",
                    backoff_seconds, attempt, self.config.max_retries
                );
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DeskError::completion(format!(
                "Failed to generate text after {} attempts",
                self.config.max_retries
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_never_disables_attempts() {
        let mut config = crate::config::Config::default();
        config.llm.max_retries = 0;
        let client = LLMClient::from_config(&config);
        assert_eq!(client.config.max_retries, 1);
    }

    #[tokio::test]
    #[ignore = "Requires running Ollama"]
    async fn test_ollama_completion() {
        let client = LLMClient::new(LLMConfig::default());
        let response = client
            .complete("You answer in one word.", "Say hello", 0.0)
            .await
            .expect("Completion failed");
        assert!(!response.is_empty());
    }
}
