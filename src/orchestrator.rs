//! Top-level orchestration
//!
//! Coordinates a request end to end: thinking-mode resolution, task
//! analysis, strategy selection, the cost gate, the bounded clarification
//! loop, and usage accounting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::{roles, AdapterRegistry, ModelResponse};
use crate::clarify::parse_clarification;
use crate::cost::{CostGovernor, Reservation};
use crate::error::{ErrorPolicy, OrchestratorError};
use crate::strategies::{
    options_for, CouncilStrategy, DeepDiveStrategy, OrchestrationStrategy, StrategyContext,
    StrategyKind, StrategyResult,
};
use crate::synthesis::ResponseSynthesizer;
use crate::task::{Task, TaskAnalysis, TaskAnalyzer};
use crate::thinking::{parse_thinking_mode, ThinkingMode, ThinkingProfile};

/// Hard ceiling on clarification round-trips
const MAX_CLARIFICATION_ROUNDS: u32 = 3;

/// Tunables that don't come from the adapter registry
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_strategy: StrategyKind,
    /// Reasoning depth used when the task phrasing names none; `None`
    /// falls back to the complexity mapping
    pub default_thinking: Option<ThinkingMode>,
    /// Independent per-call timeout inside a council fan-out
    pub parallel_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::DeepDive,
            default_thinking: None,
            parallel_timeout: Duration::from_secs(60),
        }
    }
}

/// Snapshot of orchestrator state for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub uptime_seconds: i64,
    pub request_count: u64,
    pub total_cost: Decimal,
    pub remaining_daily_budget: Decimal,
    pub models_available: Vec<String>,
    pub adapter_health: HashMap<String, bool>,
    pub strategies: Vec<String>,
    pub default_strategy: String,
}

/// Main coordinator between task analysis, strategies, and backends
pub struct Orchestrator {
    analyzer: TaskAnalyzer,
    context: Arc<StrategyContext>,
    council: CouncilStrategy,
    deep_dive: DeepDiveStrategy,
    settings: OrchestratorSettings,
    request_count: AtomicU64,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(
        adapters: AdapterRegistry,
        governor: CostGovernor,
        policy: ErrorPolicy,
        settings: OrchestratorSettings,
    ) -> Self {
        let context = Arc::new(StrategyContext {
            adapters,
            synthesizer: ResponseSynthesizer::new(),
            governor,
            policy,
            parallel_timeout: settings.parallel_timeout,
        });

        Self {
            analyzer: TaskAnalyzer::new(),
            council: CouncilStrategy::new(context.clone()),
            deep_dive: DeepDiveStrategy::new(context.clone()),
            context,
            settings,
            request_count: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Analyze a task without dispatching anything
    pub fn analyze(&self, task: &Task) -> TaskAnalysis {
        self.analyzer.analyze(task)
    }

    /// Orchestrate a task end to end.
    ///
    /// Strategy precedence: explicit override, then user preferences on
    /// the task, then automatic selection from the analysis.
    pub async fn run(
        &self,
        task: Task,
        strategy_override: Option<StrategyKind>,
    ) -> Result<StrategyResult, OrchestratorError> {
        let request_id = uuid::Uuid::new_v4();
        let analysis = self.analyzer.analyze(&task);

        let mode = parse_thinking_mode(&task.description)
            .or(self.settings.default_thinking)
            .unwrap_or_else(|| ThinkingMode::for_complexity(analysis.complexity));
        let profile = mode.profile();
        info!(
            request = %request_id,
            mode = %mode,
            token_budget = profile.token_budget,
            task_type = %analysis.task_type,
            "orchestrating task"
        );

        let kind = strategy_override.unwrap_or_else(|| self.select_strategy(&task, &analysis));
        info!(strategy = %kind, "strategy selected");

        self.check_cost_gate(&profile)?;

        let result = self.run_with_clarification(kind, task, &analysis, &profile).await?;

        self.request_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.append_usage_summary(result))
    }

    /// Query one backend by logical role, bypassing strategy selection
    pub async fn query_role(
        &self,
        role: &str,
        task: &Task,
        mode: ThinkingMode,
    ) -> Result<ModelResponse, OrchestratorError> {
        let adapter = self.context.adapter(role).ok_or_else(|| {
            OrchestratorError::ModelUnavailable {
                model: role.to_string(),
                reason: "role not registered".to_string(),
            }
        })?;

        let profile = mode.profile();
        self.check_cost_gate(&profile)?;
        let options = options_for(&profile, self.settings.parallel_timeout);
        let response = self.context.query_and_commit(&adapter, task, &options).await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        Ok(response)
    }

    fn strategy(&self, kind: StrategyKind) -> &dyn OrchestrationStrategy {
        match kind {
            StrategyKind::Council => &self.council,
            StrategyKind::DeepDive => &self.deep_dive,
        }
    }

    fn select_strategy(&self, task: &Task, analysis: &TaskAnalysis) -> StrategyKind {
        if task
            .user_preferences
            .get("quality_mode")
            .map(|v| v == "maximum")
            .unwrap_or(false)
        {
            return StrategyKind::Council;
        }

        if let Some(kind) = task
            .user_preferences
            .get("strategy")
            .and_then(|name| StrategyKind::parse(name))
        {
            return kind;
        }

        if self.council.should_activate(analysis) {
            StrategyKind::Council
        } else if self.deep_dive.should_activate(analysis) {
            StrategyKind::DeepDive
        } else {
            self.settings.default_strategy
        }
    }

    /// Pre-dispatch budget gate, scaled by the active thinking profile
    fn check_cost_gate(&self, profile: &ThinkingProfile) -> Result<(), OrchestratorError> {
        let estimate = self.estimate_request_cost(profile);
        match self.context.governor.reserve(estimate, profile) {
            Reservation::Allowed => Ok(()),
            Reservation::Denied(denial) => Err(denial.into_error()),
        }
    }

    /// Rough upper-bound estimate for one request at this reasoning depth
    fn estimate_request_cost(&self, profile: &ThinkingProfile) -> Decimal {
        let budget = u64::from(profile.token_budget);
        self.context
            .adapter(roles::PRIMARY)
            .or_else(|| self.context.adapters.values().next().cloned())
            .map(|adapter| adapter.estimate_cost(budget, budget))
            .unwrap_or(Decimal::ZERO)
    }

    /// Execute the strategy, re-invoking when the result is a
    /// clarification envelope. Bounded: after the last round the most
    /// recent result is returned as-is rather than erroring.
    async fn run_with_clarification(
        &self,
        kind: StrategyKind,
        task: Task,
        analysis: &TaskAnalysis,
        profile: &ThinkingProfile,
    ) -> Result<StrategyResult, OrchestratorError> {
        let strategy = self.strategy(kind);
        let mut current = task;

        let mut result = strategy.execute(&current, analysis, profile).await?;

        for round in 1..=MAX_CLARIFICATION_ROUNDS {
            let Some(request) = parse_clarification(&result.response.content) else {
                return Ok(result);
            };

            if round == MAX_CLARIFICATION_ROUNDS {
                warn!("clarification rounds exhausted, returning last result");
                return Ok(result);
            }

            info!(round, question = %request.question, "clarification requested");
            let mut enhanced = current.with_description(format!(
                "{}\n\nClarification for: {}",
                current.description, request.question
            ));
            if !request.files_needed.is_empty() {
                enhanced.code_context = Some(self.gather_files_context(&request.files_needed));
            }
            current = enhanced;

            result = strategy.execute(&current, analysis, profile).await?;
        }

        Ok(result)
    }

    /// Placeholder for the external file-reading collaborator. Callers
    /// that can read the workspace resolve the file contents upstream and
    /// attach them to the task before submission.
    fn gather_files_context(&self, files: &[String]) -> String {
        format!("[Context requested from files: {}]", files.join(", "))
    }

    fn append_usage_summary(&self, mut result: StrategyResult) -> StrategyResult {
        let models = if result.models_consulted.is_empty() {
            result.response.model.clone()
        } else {
            result.models_consulted.join(", ")
        };
        result.response.content.push_str(&format!(
            "\n\n---\nModels: {} | Cost: ${:.4} | Strategy: {}",
            models, result.response.cost, result.strategy
        ));
        result
    }

    /// Current statistics and adapter health
    pub async fn status(&self) -> StatusReport {
        let mut adapter_health = HashMap::new();
        let checks = self.context.adapters.iter().map(|(role, adapter)| async move {
            (role.clone(), adapter.health_check().await)
        });
        for (role, healthy) in futures::future::join_all(checks).await {
            adapter_health.insert(role, healthy);
        }

        StatusReport {
            status: "operational",
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            request_count: self.request_count.load(Ordering::Relaxed),
            total_cost: self.context.governor.total_spent(),
            remaining_daily_budget: self.context.governor.remaining_today(),
            models_available: self.context.available_roles(),
            adapter_health,
            strategies: vec![
                StrategyKind::Council.to_string(),
                StrategyKind::DeepDive.to_string(),
            ],
            default_strategy: self.settings.default_strategy.to_string(),
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.context.governor.total_spent()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn orchestrator_without_adapters(governor: CostGovernor) -> Orchestrator {
        Orchestrator::new(
            AdapterRegistry::new(),
            governor,
            ErrorPolicy::new(2, 2.0).with_base_delay(Duration::from_millis(1)),
            OrchestratorSettings::default(),
        )
    }

    #[test]
    fn test_strategy_preference_precedence() {
        let orchestrator =
            orchestrator_without_adapters(CostGovernor::new(dec!(1.00), dec!(10.00)));

        let task = Task::new("fix a typo")
            .unwrap()
            .with_preference("quality_mode", "maximum");
        let analysis = orchestrator.analyze(&task);
        assert_eq!(
            orchestrator.select_strategy(&task, &analysis),
            StrategyKind::Council
        );

        let task = Task::new("fix a typo")
            .unwrap()
            .with_preference("strategy", "deep_dive");
        let analysis = orchestrator.analyze(&task);
        assert_eq!(
            orchestrator.select_strategy(&task, &analysis),
            StrategyKind::DeepDive
        );
    }

    #[test]
    fn test_auto_selection_mirrors_activation() {
        let orchestrator =
            orchestrator_without_adapters(CostGovernor::new(dec!(1.00), dec!(10.00)));

        let task = Task::new("Design a microservices architecture for checkout").unwrap();
        let analysis = orchestrator.analyze(&task);
        assert_eq!(
            orchestrator.select_strategy(&task, &analysis),
            StrategyKind::Council
        );

        let task = Task::new("fix the null pointer bug in parser.py").unwrap();
        let analysis = orchestrator.analyze(&task);
        assert_eq!(
            orchestrator.select_strategy(&task, &analysis),
            StrategyKind::DeepDive
        );
    }

    #[tokio::test]
    async fn test_cost_gate_denies_before_dispatch() {
        // Without adapters the estimate is zero, so exhaust the daily
        // budget instead
        let governor = CostGovernor::new(dec!(1.00), dec!(1.00));
        governor.commit(dec!(1.01));
        let orchestrator = orchestrator_without_adapters(governor);

        let task = Task::new("fix the bug").unwrap();
        let err = orchestrator.run(task, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CostLimit { .. }));
    }

    #[test]
    fn test_usage_summary_appended() {
        let orchestrator =
            orchestrator_without_adapters(CostGovernor::new(dec!(1.00), dec!(10.00)));
        let result = StrategyResult {
            response: ModelResponse::new("model-a", "answer"),
            strategy: StrategyKind::DeepDive,
            models_consulted: vec!["model-a".to_string()],
            synthesis: None,
            stages_used: 1,
            refinement_model: None,
        };

        let with_summary = orchestrator.append_usage_summary(result);
        assert!(with_summary.response.content.contains("Models: model-a"));
        assert!(with_summary.response.content.contains("Strategy: deep_dive"));
    }
}
