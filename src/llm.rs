use crate::error::{AssistantError, Result};
use crate::prompt::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that turns a message list into one JSON-shaped text reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `messages` and return the raw text of the first reply message.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Wire format of the remote chat API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Cohere v2 chat: `POST {base}/v2/chat`
    Cohere,
    /// OpenAI-compatible chat completions: `POST {base}/chat/completions`
    OpenAi,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Cohere => "cohere",
            Provider::OpenAi => "openai",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Cohere => "https://api.cohere.com",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Cohere => "command-r-plus",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Provider::Cohere => format!("{}/v2/chat", base),
            Provider::OpenAi => format!("{}/chat/completions", base),
        }
    }
}

impl FromStr for Provider {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cohere" => Ok(Provider::Cohere),
            "openai" | "open-ai" | "open_ai" => Ok(Provider::OpenAi),
            other => Err(AssistantError::Config(format!("Unknown LLM provider: {}", other))),
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(provider: Provider, api_key: String, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            api_key,
            base_url,
            model,
        }
    }

    /// Same as `new`, with a per-request timeout.
    pub fn with_timeout(
        provider: Provider,
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            provider,
            api_key,
            base_url,
            model,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body asking for a JSON object reply.
pub fn build_request_body(provider: Provider, model: &str, messages: &[ChatMessage]) -> serde_json::Value {
    match provider {
        Provider::Cohere => serde_json::json!({
            "model": model,
            "messages": messages,
            "response_format": {"type": "json_object"},
        }),
        Provider::OpenAi => serde_json::json!({
            "model": model,
            "messages": messages,
            "response_format": {"type": "json_object"},
            "temperature": 0.1,
        }),
    }
}

fn describe(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "Could not serialize".to_string())
}

/// Text of the first reply message in a provider response.
pub fn extract_content(provider: Provider, response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AssistantError::Service(format!("LLM API error: {}", describe(error))));
    }

    let content = match provider {
        Provider::Cohere => response_json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
            .and_then(|parts| parts.first())
            .and_then(|part| part.get("text"))
            .and_then(|t| t.as_str()),
        Provider::OpenAi => {
            let choices = response_json
                .get("choices")
                .and_then(|c| c.as_array())
                .ok_or_else(|| {
                    AssistantError::Service(format!(
                        "No choices array in LLM response. Response: {}",
                        describe(response_json)
                    ))
                })?;
            let first = choices.first().ok_or_else(|| {
                AssistantError::Service("Empty choices array in LLM response".to_string())
            })?;
            match first.get("finish_reason").and_then(|r| r.as_str()) {
                Some("content_filter") => {
                    return Err(AssistantError::Service(
                        "LLM response was filtered by content policy".to_string(),
                    ))
                }
                Some("length") => warn!("LLM response was truncated due to length limit"),
                _ => {}
            }
            first
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        }
    };

    let content = content.ok_or_else(|| {
        AssistantError::Service(format!(
            "No content in LLM response. Response: {}",
            describe(response_json)
        ))
    })?;

    let content = content.trim();
    if content.is_empty() {
        return Err(AssistantError::Service("Empty content in LLM response".to_string()));
    }
    Ok(content.to_string())
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = build_request_body(self.provider, &self.model, messages);
        let url = self.provider.endpoint(&self.base_url);
        debug!("Calling {:?} completion endpoint {} with model {}", self.provider, url, self.model);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Service(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantError::Service(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Service(format!("Failed to read LLM response: {}", e)))?;

        extract_content(self.provider, &response_json)
    }
}
