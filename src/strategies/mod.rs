//! Orchestration strategies
//!
//! Two escalation policies consume the task analysis and drive backend
//! adapters: the concurrent [`council::CouncilStrategy`] and the
//! sequential [`deep_dive::DeepDiveStrategy`].

pub mod council;
pub mod deep_dive;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{AdapterRegistry, ModelAdapter, ModelResponse, QueryOptions};
use crate::cost::CostGovernor;
use crate::error::{ErrorPolicy, OrchestratorError};
use crate::synthesis::{ResponseSynthesizer, SynthesisMethod};
use crate::task::{Task, TaskAnalysis};
use crate::thinking::ThinkingProfile;

pub use council::CouncilStrategy;
pub use deep_dive::DeepDiveStrategy;

/// Which strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Council,
    DeepDive,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Council => "council",
            StrategyKind::DeepDive => "deep_dive",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "council" => Some(StrategyKind::Council),
            "deep_dive" | "deep-dive" | "progressive" => Some(StrategyKind::DeepDive),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A strategy's final output plus execution metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub response: ModelResponse,
    pub strategy: StrategyKind,
    /// Model ids consulted, in dispatch order
    pub models_consulted: Vec<String>,
    pub synthesis: Option<SynthesisMethod>,
    /// Escalation stage reached (council is always 1)
    pub stages_used: u8,
    pub refinement_model: Option<String>,
}

/// Shared resources every strategy executes against
pub struct StrategyContext {
    pub adapters: AdapterRegistry,
    pub synthesizer: ResponseSynthesizer,
    pub governor: CostGovernor,
    pub policy: ErrorPolicy,
    /// Independent timeout for each call in a council fan-out
    pub parallel_timeout: Duration,
}

impl StrategyContext {
    pub fn adapter(&self, role: &str) -> Option<Arc<dyn ModelAdapter>> {
        self.adapters.get(role).cloned()
    }

    pub fn available_roles(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Query one adapter under the retry policy and commit its realized
    /// cost to the ledger.
    pub async fn query_and_commit(
        &self,
        adapter: &Arc<dyn ModelAdapter>,
        task: &Task,
        options: &QueryOptions,
    ) -> Result<ModelResponse, OrchestratorError> {
        let response = self
            .policy
            .run_with_retry(|| adapter.query(task, options))
            .await?;
        self.governor.commit(response.cost);
        Ok(response)
    }
}

/// Build per-call options from the active thinking profile
pub fn options_for(profile: &ThinkingProfile, timeout: Duration) -> QueryOptions {
    QueryOptions::default()
        .with_max_tokens(profile.token_budget)
        .with_temperature(profile.temperature)
        .with_timeout(timeout)
}

/// Escalation policy interface
#[async_trait]
pub trait OrchestrationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy is appropriate for the analyzed task
    fn should_activate(&self, analysis: &TaskAnalysis) -> bool;

    async fn execute(
        &self,
        task: &Task,
        analysis: &TaskAnalysis,
        profile: &ThinkingProfile,
    ) -> Result<StrategyResult, OrchestratorError>;
}
