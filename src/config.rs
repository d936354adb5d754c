//! Configuration management
//!
//! Manages orchestrator configuration: model role assignments, cost
//! limits, and orchestration tunables. Loaded from a TOML file, with the
//! API key supplied via environment.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{AdapterRegistry, OpenRouterAdapter, OpenRouterConfig};
use crate::cost::CostGovernor;
use crate::error::ErrorPolicy;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::strategies::StrategyKind;
use crate::thinking::ThinkingMode;

/// Environment variable holding the backend API key
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider endpoint settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Model assignments for the logical backend roles
    #[serde(default)]
    pub models: ModelsConfig,
    /// Cost limits
    #[serde(default)]
    pub cost: CostConfig,
    /// Orchestration tunables
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the OpenRouter-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// One backend role assignment with its pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: String,
    /// USD per million prompt/reasoning tokens
    #[serde(default)]
    pub prompt_price_per_mtok: f64,
    /// USD per million completion tokens
    #[serde(default)]
    pub completion_price_per_mtok: f64,
    #[serde(default)]
    pub supports_diff_edits: bool,
}

impl ModelEntry {
    fn new(model: &str, prompt: f64, completion: f64) -> Self {
        Self {
            model: model.to_string(),
            prompt_price_per_mtok: prompt,
            completion_price_per_mtok: completion,
            supports_diff_edits: false,
        }
    }
}

/// Model assignments for the logical backend roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Fast first-pass model
    #[serde(default = "default_fast_model")]
    pub fast: ModelEntry,
    /// Default high-quality model
    #[serde(default = "default_primary_model")]
    pub primary: ModelEntry,
    /// Precise code-edit specialist
    #[serde(default = "default_editor_model")]
    pub editor: Option<ModelEntry>,
    /// Architecture/design specialist
    #[serde(default = "default_architect_model")]
    pub architect: Option<ModelEntry>,
}

fn default_fast_model() -> ModelEntry {
    ModelEntry::new("anthropic/claude-3.5-haiku", 0.80, 4.00)
}

fn default_primary_model() -> ModelEntry {
    ModelEntry::new("anthropic/claude-3.5-sonnet", 3.00, 15.00)
}

fn default_editor_model() -> Option<ModelEntry> {
    let mut entry = ModelEntry::new("google/gemini-2.5-pro-preview", 1.25, 10.00);
    entry.supports_diff_edits = true;
    Some(entry)
}

fn default_architect_model() -> Option<ModelEntry> {
    Some(ModelEntry::new("openai/o3", 10.00, 40.00))
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fast: default_fast_model(),
            primary: default_primary_model(),
            editor: default_editor_model(),
            architect: default_architect_model(),
        }
    }
}

impl ModelsConfig {
    /// Iterate configured (role, entry) pairs
    pub fn entries(&self) -> Vec<(&'static str, &ModelEntry)> {
        let mut entries = vec![("fast", &self.fast), ("primary", &self.primary)];
        if let Some(editor) = &self.editor {
            entries.push(("editor", editor));
        }
        if let Some(architect) = &self.architect {
            entries.push(("architect", architect));
        }
        entries
    }

    /// List all available roles
    pub fn roles() -> &'static [&'static str] {
        &["fast", "primary", "editor", "architect"]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Per-request spending limit in USD (scaled by thinking mode)
    #[serde(default = "default_request_limit")]
    pub max_cost_per_request: f64,
    /// Daily spending limit in USD
    #[serde(default = "default_daily_limit")]
    pub daily_limit: f64,
    /// Fraction of the daily limit at which a warning is logged
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

fn default_request_limit() -> f64 {
    5.0
}

fn default_daily_limit() -> f64 {
    100.0
}

fn default_warning_threshold() -> f64 {
    0.8
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_cost_per_request: default_request_limit(),
            daily_limit: default_daily_limit(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Strategy used when neither the caller nor the analysis picks one
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
    /// Reasoning depth used when the task phrasing names none; unset means
    /// derive it from the task's complexity
    #[serde(default)]
    pub default_thinking: Option<String>,
    /// Per-call timeout in a council fan-out, seconds
    #[serde(default = "default_parallel_timeout")]
    pub parallel_timeout_secs: u64,
    /// Retry ceiling for transient backend errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff factor between retries
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_strategy() -> String {
    "deep_dive".to_string()
}

fn default_parallel_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            default_thinking: None,
            parallel_timeout_secs: default_parallel_timeout(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Config {
    /// Load configuration from file, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path
            .parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Build the adapter registry from the configured role assignments
    pub fn build_adapters(&self, api_key: &str) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();

        for (role, entry) in self.models.entries() {
            let adapter = OpenRouterAdapter::new(OpenRouterConfig {
                model: entry.model.clone(),
                base_url: self.provider.base_url.clone(),
                api_key: api_key.to_string(),
                prompt_price_per_mtok: decimal(entry.prompt_price_per_mtok),
                completion_price_per_mtok: decimal(entry.completion_price_per_mtok),
                supports_diff_edits: entry.supports_diff_edits,
            });
            registry.insert(role.to_string(), Arc::new(adapter));
        }

        registry
    }

    /// Assemble a ready-to-run orchestrator. The API key comes from the
    /// environment.
    pub fn build_orchestrator(&self) -> Result<Orchestrator> {
        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{} is not set", API_KEY_ENV))?;

        let governor = CostGovernor::new(
            decimal(self.cost.max_cost_per_request),
            decimal(self.cost.daily_limit),
        )
        .with_warning_threshold(decimal(self.cost.warning_threshold));

        let policy = ErrorPolicy::new(
            self.orchestration.max_retries,
            self.orchestration.backoff_factor,
        );

        let settings = OrchestratorSettings {
            default_strategy: StrategyKind::parse(&self.orchestration.default_strategy)
                .unwrap_or(StrategyKind::DeepDive),
            default_thinking: self
                .orchestration
                .default_thinking
                .as_deref()
                .and_then(ThinkingMode::from_name),
            parallel_timeout: Duration::from_secs(self.orchestration.parallel_timeout_secs),
        };

        Ok(Orchestrator::new(
            self.build_adapters(&api_key),
            governor,
            policy,
            settings,
        ))
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Failed to get config directory")?;
    Ok(base.join("code-council").join("config.toml"))
}
