// ABOUTME: Completion oracle backed by the Anthropic Messages API
// ABOUTME: Handles API requests, error mapping and response parsing

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use specforge_core::{Config, MessageRole};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::oracle::{ChatMessage, CompletionOptions, CompletionOracle, CompletionResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 600;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No API key configured. Set ANTHROPIC_API_KEY to enable generation")]
    NoApiKey,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Anthropic-backed completion oracle
pub struct AIService {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AIService {
    /// Create HTTP client with timeout configuration
    fn create_client() -> AIServiceResult<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?)
    }

    /// Creates a service from loaded configuration.
    ///
    /// A missing API key is not an error here; calls fail with `NoApiKey`.
    pub fn from_config(config: &Config) -> AIServiceResult<Self> {
        if config.anthropic_api_key.is_none() {
            info!("ANTHROPIC_API_KEY not set - completion calls will fail until configured");
        }

        let model = config
            .anthropic_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if model != DEFAULT_MODEL {
            info!("Using custom Anthropic model: {}", model);
        }

        Ok(Self {
            client: Self::create_client()?,
            api_key: config.anthropic_api_key.clone(),
            model,
            base_url: config
                .anthropic_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Creates a service with a specific API key and the default model
    pub fn with_api_key(api_key: String) -> AIServiceResult<Self> {
        Ok(Self {
            client: Self::create_client()?,
            api_key: Some(api_key),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Get the model being used by this service
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    /// Split system messages out into the top-level `system` field
    fn build_request(&self, messages: &[ChatMessage], options: &CompletionOptions) -> AnthropicRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        AnthropicRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            messages: messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| Message {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
        }
    }
}

#[async_trait]
impl CompletionOracle for AIService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AIServiceResult<CompletionResponse> {
        let api_key = self.api_key.as_ref().ok_or(AIServiceError::NoApiKey)?;
        let request = self.build_request(messages, options);

        if request.messages.is_empty() {
            return Err(AIServiceError::InvalidResponse(
                "at least one user message is required".to_string(),
            ));
        }

        info!(
            "Making Anthropic API request: model={}, max_tokens={}, temperature={}",
            request.model, request.max_tokens, request.temperature
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Anthropic API request timed out after {} seconds", REQUEST_TIMEOUT_SECS);
                    AIServiceError::ApiError(format!(
                        "Request timed out after {} seconds. The AI service may be overloaded or unavailable.",
                        REQUEST_TIMEOUT_SECS
                    ))
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!(
                        "Connection failed: {}. Please check your internet connection.",
                        e
                    ))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::ApiError(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AIServiceError::ParseError(e.to_string()))?;

        let content: String = anthropic_response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(AIServiceError::InvalidResponse(
                "response contained no text content".to_string(),
            ));
        }

        let tokens_used = anthropic_response.usage.as_ref().map(Usage::total_tokens);
        debug!(
            "Anthropic response: model={}, tokens={:?}, stop_reason={:?}",
            anthropic_response.model, tokens_used, anthropic_response.stop_reason
        );

        Ok(CompletionResponse {
            content,
            model: anthropic_response.model,
            tokens_used,
            finish_reason: anthropic_response.stop_reason,
        })
    }
}
