use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::errors::{DeskError, DeskResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub apis: ApiConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingConfig,
    pub reflection: ReflectionConfig,

    // Reference date for period resolution (set programmatically, not from env vars)
    #[serde(skip)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub alpha_vantage_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub primary_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String, // "ollama" or "openai"
    pub model: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    pub collection: String,
    pub scan_limit: usize,
    pub backfill_enabled: bool,
    pub backfill_article_count: usize,
    pub backfill_day_timeout_seconds: u64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            collection: "financial_analyses".to_string(),
            scan_limit: 50,
            backfill_enabled: true,
            backfill_article_count: 5,
            backfill_day_timeout_seconds: 180,
        }
    }
}

fn parse_var<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {} value", key))
}

impl Config {
    /// Returns the effective date for period resolution.
    /// Uses `as_of` when set, otherwise the current UTC date.
    pub fn get_effective_date(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Database URL, required only by operations that open the record store
    pub fn database_url(&self) -> DeskResult<&str> {
        self.database.url.as_deref().ok_or_else(|| {
            DeskError::Configuration("DATABASE_URL environment variable is required but not set".into())
        })
    }

    /// Alpha Vantage key, required only by operations that fetch market data
    pub fn alpha_vantage_key(&self) -> DeskResult<&str> {
        self.apis.alpha_vantage_api_key.as_deref().ok_or_else(|| {
            DeskError::Configuration(
                "ALPHA_VANTAGE_API_KEY environment variable is required but not set".into(),
            )
        })
    }

    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                max_connections: parse_var("DB_MAX_CONNECTIONS", "5")?,
                min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            },
            apis: ApiConfig {
                alpha_vantage_api_key: env::var("ALPHA_VANTAGE_API_KEY").ok(),
                openai_api_key: env::var("OPENAI_API_KEY")
                    .or_else(|_| env::var("GITHUB_TOKEN"))
                    .ok(),
            },
            llm: LlmConfig {
                ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.llm.ollama_url),
                primary_model: env::var("PRIMARY_MODEL").unwrap_or(defaults.llm.primary_model),
                timeout_seconds: parse_var("LLM_TIMEOUT_SECONDS", "60")?,
                max_retries: parse_var("LLM_MAX_RETRIES", "3")?,
                temperature: parse_var("LLM_TEMPERATURE", "0.3")?,
            },
            embeddings: EmbeddingConfig {
                provider: env::var("EMBEDDING_PROVIDER")
                    .unwrap_or(defaults.embeddings.provider)
                    .to_lowercase(),
                model: env::var("EMBEDDING_MODEL").ok(),
                api_base: env::var("EMBEDDING_API_BASE").ok(),
            },
            reflection: ReflectionConfig {
                collection: env::var("RAG_COLLECTION").unwrap_or(defaults.reflection.collection),
                scan_limit: parse_var("RAG_SCAN_LIMIT", "50")?,
                backfill_enabled: parse_var("BACKFILL_ENABLED", "true")?,
                backfill_article_count: parse_var("BACKFILL_ARTICLE_COUNT", "5")?,
                backfill_day_timeout_seconds: parse_var("BACKFILL_DAY_TIMEOUT_SECONDS", "180")?,
            },
            as_of: None,
        };

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                min_connections: 1,
            },
            apis: ApiConfig {
                alpha_vantage_api_key: None,
                openai_api_key: None,
            },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                primary_model: "llama3.2:3b".to_string(),
                timeout_seconds: 60,
                max_retries: 3,
                temperature: 0.3,
            },
            embeddings: EmbeddingConfig {
                provider: "ollama".to_string(),
                model: None,
                api_base: None,
            },
            reflection: ReflectionConfig::default(),
            as_of: None,
        }
    }
}
