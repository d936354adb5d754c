//! OpenRouter-compatible backend adapter
//!
//! Speaks the OpenAI-style `chat/completions` dialect that OpenRouter and
//! most hosted backends expose. Response parsing goes through a raw
//! `serde_json::Value` first: strict struct deserialization breaks on
//! models that return non-standard field types.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{ModelAdapter, ModelResponse, QueryOptions};
use crate::error::OrchestratorError;
use crate::task::Task;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Configuration for one OpenRouter-backed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Model identifier, e.g. "anthropic/claude-3.5-sonnet"
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(skip)]
    pub api_key: String,
    /// USD per million reasoning/prompt tokens
    pub prompt_price_per_mtok: Decimal,
    /// USD per million completion tokens
    pub completion_price_per_mtok: Decimal,
    /// Whether this model honors diff-style edit hints
    #[serde(default)]
    pub supports_diff_edits: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Adapter for any OpenAI-compatible chat endpoint
pub struct OpenRouterAdapter {
    client: Arc<Client>,
    config: OpenRouterConfig,
}

impl OpenRouterAdapter {
    pub fn new(config: OpenRouterConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            config,
        }
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    fn build_messages(&self, task: &Task, options: &QueryOptions) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        if let Some(prelude) = &options.prelude {
            messages.push(ChatMessage {
                role: "system",
                content: prelude.clone(),
            });
        }

        let mut user = task.description.clone();
        if let Some(context) = &task.code_context {
            user.push_str("\n\nCode context:\n");
            user.push_str(context);
        }
        if !task.file_paths.is_empty() {
            user.push_str("\n\nFiles involved: ");
            user.push_str(&task.file_paths.join(", "));
        }
        if let Some(format) = &options.edit_format {
            user.push_str(&format!(
                "\n\nProvide code modifications in {} format.",
                format
            ));
        }

        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        messages
    }

    /// Map an HTTP failure status onto the error taxonomy
    fn classify_status(&self, status: u16, body: &str) -> OrchestratorError {
        match status {
            429 => OrchestratorError::RateLimited {
                model: self.config.model.clone(),
                retry_after: None,
            },
            401 | 403 => OrchestratorError::ModelUnavailable {
                model: self.config.model.clone(),
                reason: "authentication rejected".to_string(),
            },
            404 => OrchestratorError::ModelUnavailable {
                model: self.config.model.clone(),
                reason: "model not found".to_string(),
            },
            _ => OrchestratorError::Api {
                model: self.config.model.clone(),
                status: Some(status),
                message: truncate(body, 500),
            },
        }
    }

    /// Extract text from a `content` value that may be a string or an
    /// array of content parts
    fn content_as_text(value: Option<&serde_json::Value>) -> String {
        match value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| {
                    if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                        part.get("text").and_then(|t| t.as_str()).map(str::to_string)
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenRouterAdapter {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn query(
        &self,
        task: &Task,
        options: &QueryOptions,
    ) -> Result<ModelResponse, OrchestratorError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(task, options),
            max_tokens: Some(options.max_tokens),
            temperature: Some(options.temperature),
        };

        debug!(model = %self.config.model, max_tokens = options.max_tokens, "dispatching query");
        let started = Instant::now();

        let send = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send();

        let response = tokio::time::timeout(options.timeout, send)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                model: self.config.model.clone(),
                seconds: options.timeout.as_secs(),
            })?
            .map_err(|e| {
                if e.is_connect() {
                    OrchestratorError::ModelUnavailable {
                        model: self.config.model.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    OrchestratorError::Api {
                        model: self.config.model.clone(),
                        status: None,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // Honor an advised retry interval when the backend sends one
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();

            let mut err = self.classify_status(status.as_u16(), &body);
            if let OrchestratorError::RateLimited {
                retry_after: slot, ..
            } = &mut err
            {
                *slot = retry_after;
            }
            return Err(err);
        }

        let body = response.text().await.map_err(|e| OrchestratorError::Api {
            model: self.config.model.clone(),
            status: None,
            message: e.to_string(),
        })?;

        let raw: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| OrchestratorError::Protocol {
                model: self.config.model.clone(),
                message: format!("invalid JSON: {}", e),
            })?;

        let message = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| OrchestratorError::Protocol {
                model: self.config.model.clone(),
                message: "no choices in response".to_string(),
            })?;

        let content = Self::content_as_text(message.get("content"));

        let usage = raw.get("usage");
        let reasoning_tokens = usage
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(|v| v.as_u64());
        let completion_tokens = usage
            .and_then(|u| u.get("completion_tokens"))
            .and_then(|v| v.as_u64());
        let total_tokens = usage
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64());

        let cost = self.estimate_cost(
            reasoning_tokens.unwrap_or(0),
            completion_tokens.unwrap_or(0),
        );

        Ok(ModelResponse {
            content,
            model: self.config.model.clone(),
            reasoning_tokens,
            completion_tokens,
            total_tokens,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            cost,
            confidence: None,
            metadata: Default::default(),
        })
    }

    fn estimate_cost(&self, reasoning_tokens: u64, completion_tokens: u64) -> Decimal {
        let mtok = Decimal::from(1_000_000u64);
        Decimal::from(reasoning_tokens) * self.config.prompt_price_per_mtok / mtok
            + Decimal::from(completion_tokens) * self.config.completion_price_per_mtok / mtok
    }

    async fn health_check(&self) -> bool {
        let request = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send();

        match tokio::time::timeout(std::time::Duration::from_secs(10), request).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                warn!(model = %self.config.model, "health check failed: {}", e);
                false
            }
            Err(_) => {
                warn!(model = %self.config.model, "health check timed out");
                false
            }
        }
    }

    fn max_reasoning_options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_max_tokens(32768)
            .with_temperature(0.5)
    }

    fn supports_diff_edits(&self) -> bool {
        self.config.supports_diff_edits
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
