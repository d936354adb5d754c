//! Error taxonomy and recovery policy
//!
//! Defines the closed set of orchestration errors and the policy that
//! decides which of them are retried, with what backoff, and which are
//! surfaced to the user.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

/// Which cost ceiling was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Request,
    Daily,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Request => write!(f, "per-request"),
            LimitScope::Daily => write!(f, "daily"),
        }
    }
}

/// All errors the orchestration engine can produce
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model '{model}' is not available: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("no models available: {0}")]
    NoModelsAvailable(String),

    #[error("rate limit exceeded for {model}")]
    RateLimited {
        model: String,
        /// Seconds the backend asked us to wait, if it said
        retry_after: Option<u64>,
    },

    #[error("API error from {model}: {message}")]
    Api {
        model: String,
        status: Option<u16>,
        message: String,
    },

    #[error("model '{model}' timed out after {seconds}s")]
    Timeout { model: String, seconds: u64 },

    #[error("malformed reply from {model}: {message}")]
    Protocol { model: String, message: String },

    #[error("cost limit exceeded: ${spent} exceeds {scope} limit of ${limit}")]
    CostLimit {
        spent: Decimal,
        limit: Decimal,
        scope: LimitScope,
    },

    #[error("failed to synthesize responses via {method}: {reason}")]
    Synthesis { method: String, reason: String },
}

impl OrchestratorError {
    /// Fatal errors terminate the current strategy run and are never retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::CostLimit { .. }
                | OrchestratorError::NoModelsAvailable(_)
                | OrchestratorError::Configuration(_)
        )
    }
}

/// Retry/backoff/fallback decisions for backend call failures.
///
/// Transient errors (rate limits, flaky API replies, timeouts) are absorbed
/// here and never reach the caller; fatal errors propagate immediately.
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    base_delay: Duration,
}

/// Fallback priority: most reliable role first
const FALLBACK_ORDER: &[&str] = &["primary", "fast", "editor", "architect"];

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::new(3, 2.0)
    }
}

impl ErrorPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Override the backoff base delay (tests use milliseconds)
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Exponential backoff delay for the given zero-based attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.mul_f64(self.backoff_factor.powi(attempt as i32))
    }

    /// How long to wait before retrying, or `None` when the error must not
    /// be retried.
    pub fn retry_delay(&self, err: &OrchestratorError, attempt: u32) -> Option<Duration> {
        if err.is_fatal() {
            return None;
        }
        match err {
            // Prefer the backend-advised interval when present
            OrchestratorError::RateLimited {
                retry_after: Some(seconds),
                ..
            } => Some(Duration::from_secs(*seconds)),
            _ => Some(self.backoff_delay(attempt)),
        }
    }

    /// Run an operation, retrying transient failures up to `max_retries`
    /// times. The last error is propagated once attempts are exhausted;
    /// fatal errors propagate on first occurrence.
    pub async fn run_with_retry<F, Fut, T>(&self, mut op: F) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OrchestratorError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(delay) = self.retry_delay(&err, attempt) else {
                        return Err(err);
                    };

                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "backend call failed: {}",
                        err
                    );
                    last_error = Some(err);

                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OrchestratorError::Configuration("retry loop ran zero attempts".to_string())
        }))
    }

    /// Pick a fallback role: first role in the fixed priority order that is
    /// registered and has not already failed.
    pub fn choose_fallback(
        &self,
        failed: &HashSet<String>,
        available: &[String],
    ) -> Option<String> {
        FALLBACK_ORDER
            .iter()
            .find(|role| available.iter().any(|a| a == *role) && !failed.contains(**role))
            .map(|role| role.to_string())
    }

    /// Only fatal errors are shown to the user; everything else is handled
    /// internally.
    pub fn should_escalate_to_user(&self, err: &OrchestratorError) -> bool {
        err.is_fatal()
    }

    /// Human-readable message for an escalated error
    pub fn format_user_error(&self, err: &OrchestratorError) -> String {
        match err {
            OrchestratorError::CostLimit {
                spent,
                limit,
                scope,
            } => format!(
                "The request would exceed the {} cost limit of ${:.2}. Current spend: ${:.4}. \
                 Adjust your limits or try a simpler request.",
                scope, limit, spent
            ),
            OrchestratorError::NoModelsAvailable(_) => {
                "No models are available to process your request. \
                 Check your configuration and API keys, then try again."
                    .to_string()
            }
            OrchestratorError::Configuration(message) => {
                format!("Configuration error: {}. Check your config file.", message)
            }
            OrchestratorError::RateLimited {
                model,
                retry_after,
            } => {
                let retry = retry_after
                    .map(|s| format!(" Try again in {} seconds.", s))
                    .unwrap_or_default();
                format!("Rate limit exceeded for {}.{}", model, retry)
            }
            other => format!("An error occurred while processing your request: {}", other),
        }
    }
}
