//! Backend adapter contract
//!
//! Every remote reasoning backend is driven through [`ModelAdapter`].
//! Strategies hold a registry mapping logical role names (`fast`,
//! `primary`, `editor`, `architect`) to adapter instances, resolved at
//! construction.

pub mod openrouter;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::task::Task;

pub use openrouter::{OpenRouterAdapter, OpenRouterConfig};

/// Registry of adapters keyed by logical role name
pub type AdapterRegistry = HashMap<String, Arc<dyn ModelAdapter>>;

/// Well-known logical roles
pub mod roles {
    /// Fast/cheap first-pass backend
    pub const FAST: &str = "fast";
    /// Default high-quality backend
    pub const PRIMARY: &str = "primary";
    /// Precise code-edit specialist
    pub const EDITOR: &str = "editor";
    /// Architecture/design specialist
    pub const ARCHITECT: &str = "architect";
}

/// Per-call options derived from the active thinking profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Individual timeout for this call; a timeout here never cancels
    /// sibling calls in a fan-out
    pub timeout: Duration,
    /// Hint that the backend should answer with diff-style edits
    pub edit_format: Option<String>,
    /// Extra instruction text prepended to the task
    pub prelude: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.3,
            timeout: Duration::from_secs(60),
            edit_format: None,
            prelude: None,
        }
    }
}

impl QueryOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Standardized backend response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    /// Identifier of the model that produced the content
    pub model: String,
    pub reasoning_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub latency_ms: Option<u64>,
    pub cost: Decimal,
    pub confidence: Option<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ModelResponse {
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            reasoning_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            latency_ms: None,
            cost: Decimal::ZERO,
            confidence: None,
            metadata: HashMap::new(),
        }
    }
}

/// Capability contract every backend implementation satisfies.
///
/// `query` performs network I/O and must be independently timeoutable;
/// `estimate_cost` is pure; `health_check` is best-effort and never fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Model identifier reported in responses
    fn model_id(&self) -> &str;

    async fn query(
        &self,
        task: &Task,
        options: &QueryOptions,
    ) -> Result<ModelResponse, OrchestratorError>;

    /// Pure pricing function for this backend
    fn estimate_cost(&self, reasoning_tokens: u64, completion_tokens: u64) -> Decimal;

    /// Whether the backend currently looks reachable. Must not error.
    async fn health_check(&self) -> bool;

    /// Options that maximize this backend's reasoning capability
    fn max_reasoning_options(&self) -> QueryOptions {
        QueryOptions::default().with_max_tokens(32768)
    }

    /// Whether the backend honors diff-style edit hints
    fn supports_diff_edits(&self) -> bool {
        false
    }
}

/// Scriptable in-memory adapter for strategy unit tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) struct StubAdapter {
        pub model: String,
        pub content: String,
        pub confidence: Option<f32>,
        pub cost: Decimal,
        pub delay: Duration,
        /// Number of initial query attempts that fail with a transient
        /// API error before succeeding
        pub fail_attempts: AtomicU32,
        pub calls: AtomicU32,
    }

    impl StubAdapter {
        pub fn new(model: &str, content: &str) -> Self {
            Self {
                model: model.to_string(),
                content: content.to_string(),
                confidence: Some(0.8),
                cost: Decimal::new(1, 2), // $0.01
                delay: Duration::ZERO,
                fail_attempts: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }
        }

        pub fn with_confidence(mut self, confidence: f32) -> Self {
            self.confidence = Some(confidence);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing_first(self, attempts: u32) -> Self {
            self.fail_attempts.store(attempts, Ordering::SeqCst);
            self
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelAdapter for StubAdapter {
        fn model_id(&self) -> &str {
            &self.model
        }

        async fn query(
            &self,
            _task: &Task,
            _options: &QueryOptions,
        ) -> Result<ModelResponse, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .fail_attempts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(OrchestratorError::Api {
                    model: self.model.clone(),
                    status: Some(500),
                    message: "stubbed failure".to_string(),
                });
            }
            let mut response = ModelResponse::new(&self.model, &self.content);
            response.cost = self.cost;
            response.confidence = self.confidence;
            response.completion_tokens = Some(self.content.len() as u64 / 4);
            Ok(response)
        }

        fn estimate_cost(&self, _reasoning_tokens: u64, _completion_tokens: u64) -> Decimal {
            self.cost
        }

        async fn health_check(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_options() {
        let options = QueryOptions::default();
        assert_eq!(options.max_tokens, 8192);
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert!(options.edit_format.is_none());
    }

    #[test]
    fn test_response_constructor_defaults() {
        let response = ModelResponse::new("primary", "done");
        assert_eq!(response.model, "primary");
        assert_eq!(response.cost, Decimal::ZERO);
        assert!(response.confidence.is_none());
    }

    #[tokio::test]
    async fn test_adapter_contract_via_mock() {
        let mut mock = MockModelAdapter::new();
        mock.expect_model_id().return_const("mock-model".to_string());
        mock.expect_estimate_cost()
            .returning(|reasoning, completion| Decimal::from(reasoning + completion));
        mock.expect_query().returning(|task, _| {
            Ok(ModelResponse::new(
                "mock-model",
                format!("echo: {}", task.description),
            ))
        });
        mock.expect_health_check().returning(|| true);

        assert_eq!(mock.model_id(), "mock-model");
        let task = Task::new("ping").unwrap();
        let response = mock.query(&task, &QueryOptions::default()).await.unwrap();
        assert_eq!(response.content, "echo: ping");
        assert!(mock.health_check().await);
        assert_eq!(mock.estimate_cost(2, 3), Decimal::from(5u64));
    }
}
