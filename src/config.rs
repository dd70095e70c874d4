//! Runtime configuration
//!
//! Read from the environment (a `.env` file is loaded first by the binary).
//! Command-line flags override individual values.

use crate::error::{AssistantError, Result};
use crate::llm::{LlmClient, Provider};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "db/prototype.db";
pub const DEFAULT_UPLOAD_DB_PATH: &str = "db/uploaded.db";

pub const PROVIDER_VAR: &str = "LLM_PROVIDER";
pub const API_KEY_VAR: &str = "LLM_API_KEY";
pub const MODEL_VAR: &str = "LLM_MODEL";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub upload_db_path: PathBuf,
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, with `overrides` (e.g. command-line flags) taking
    /// precedence over the environment key by key.
    pub fn from_env_with(overrides: &HashMap<String, String>) -> Result<Self> {
        Self::layered(overrides, |key| std::env::var(key).ok())
    }

    pub fn layered<F>(overrides: &HashMap<String, String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| overrides.get(key).cloned().or_else(|| lookup(key)))
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get(PROVIDER_VAR) {
            Some(name) => name.parse::<Provider>()?,
            None => Provider::Cohere,
        };

        let provider_key = match provider {
            Provider::Cohere => "COHERE_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = get(API_KEY_VAR).or_else(|| get(provider_key));

        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(secs.parse::<u64>().map_err(|_| {
                AssistantError::Config(format!("LLM_TIMEOUT_SECS must be a whole number, got {}", secs))
            })?)),
            None => None,
        };

        Ok(Self {
            db_path: get("TABLETALK_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            upload_db_path: get("TABLETALK_UPLOAD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DB_PATH)),
            provider,
            api_key,
            model: get(MODEL_VAR).unwrap_or_else(|| provider.default_model().to_string()),
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| provider.default_base_url().to_string()),
            timeout,
        })
    }

    /// HTTP completion client for this configuration.
    pub fn llm_client(&self) -> Result<LlmClient> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            AssistantError::Config(
                "No API key: set LLM_API_KEY (or COHERE_API_KEY / OPENAI_API_KEY) or pass --api-key"
                    .to_string(),
            )
        })?;

        match self.timeout {
            Some(timeout) => LlmClient::with_timeout(
                self.provider,
                api_key,
                self.model.clone(),
                self.base_url.clone(),
                timeout,
            ),
            None => Ok(LlmClient::new(
                self.provider,
                api_key,
                self.model.clone(),
                self.base_url.clone(),
            )),
        }
    }
}
