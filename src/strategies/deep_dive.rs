//! Progressive deep-dive strategy: sequential escalation
//!
//! Starts with the fast backend and escalates stage by stage only when the
//! previous result falls short. Stage N+1 never starts before stage N
//! completes.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    options_for, OrchestrationStrategy, StrategyContext, StrategyKind, StrategyResult,
};
use crate::adapters::{roles, ModelAdapter, ModelResponse};
use crate::error::OrchestratorError;
use crate::synthesis::SynthesisMethod;
use crate::task::{ComplexityLevel, Task, TaskAnalysis, TaskType};
use crate::thinking::ThinkingProfile;

/// Minimum content length for a stage-1 result to stand on its own
const SUFFICIENT_LENGTH: usize = 50;
/// Confidence floor below which a reported score forces escalation
const SUFFICIENT_CONFIDENCE: f32 = 0.6;
/// How much of the previous stage's output seeds the next stage
const SEED_EXCERPT_CHARS: usize = 500;

pub struct DeepDiveStrategy {
    context: Arc<StrategyContext>,
}

impl DeepDiveStrategy {
    pub fn new(context: Arc<StrategyContext>) -> Self {
        Self { context }
    }

    /// Whether a first-pass answer adequately addresses the task
    fn is_sufficient(&self, response: &ModelResponse, task: &Task) -> bool {
        if response.content.len() < SUFFICIENT_LENGTH {
            return false;
        }

        if let Some(confidence) = response.confidence {
            if confidence < SUFFICIENT_CONFIDENCE {
                return false;
            }
        }

        let content = response.content.to_lowercase();
        let error_markers = ["i cannot", "i'm unable", "error occurred", "failed to"];
        if error_markers.iter().any(|m| content.contains(m)) {
            return false;
        }

        // Implementation requests need actual code in the answer
        if task.description.to_lowercase().contains("implement")
            && !response.content.contains("```")
        {
            return false;
        }

        true
    }

    /// Whether the stage-2 answer signals that a specialist should weigh in
    fn needs_specialized_expertise(&self, response: &ModelResponse, task: &Task) -> bool {
        let content = response.content.to_lowercase();

        let complexity_markers = [
            "complex",
            "challenging",
            "difficult",
            "intricate",
            "multiple approaches",
            "trade-offs",
            "considerations",
        ];
        if complexity_markers.iter().filter(|m| content.contains(*m)).count() >= 2 {
            return true;
        }

        let uncertainty_markers = [
            "might", "could", "possibly", "perhaps", "depending on", "it depends", "unclear",
        ];
        if uncertainty_markers.iter().filter(|m| content.contains(*m)).count() >= 3 {
            return true;
        }

        let description = task.description.to_lowercase();
        [
            "architecture",
            "design pattern",
            "optimization",
            "performance",
            "scalability",
            "refactor",
            "migrate",
            "integrate",
        ]
        .iter()
        .any(|k| description.contains(k))
    }

    /// Specialist routing: exactly one of editor or architect
    fn pick_specialist(&self, analysis: &TaskAnalysis) -> Option<(String, Arc<dyn ModelAdapter>)> {
        let editor_shaped = matches!(
            analysis.task_type,
            TaskType::ComplexEdit
                | TaskType::Refactoring
                | TaskType::BugFix
                | TaskType::Optimization
        ) && (analysis.complexity >= ComplexityLevel::High
            || analysis.languages.len() > 1
            || analysis.estimated_lines_affected > 100);

        if editor_shaped {
            if let Some(adapter) = self.context.adapter(roles::EDITOR) {
                return Some((roles::EDITOR.to_string(), adapter));
            }
        }

        let architect_shaped = matches!(
            analysis.task_type,
            TaskType::Architecture | TaskType::Design
        ) || analysis.has_architectural_implications;

        if architect_shaped {
            if let Some(adapter) = self.context.adapter(roles::ARCHITECT) {
                return Some((roles::ARCHITECT.to_string(), adapter));
            }
        }

        None
    }

    /// Seed the next stage with an excerpt of the previous result
    fn enhance_with_excerpt(&self, task: &Task, earlier: &ModelResponse) -> Task {
        task.with_description(format!(
            "{}\n\nInitial analysis:\n{}\n\nProvide a more comprehensive and \
             detailed solution, addressing any limitations above.",
            task.description,
            excerpt(&earlier.content, SEED_EXCERPT_CHARS)
        ))
    }

    fn specialist_task(&self, task: &Task, earlier: &ModelResponse) -> Task {
        task.with_description(format!(
            "{}\n\nCurrent approach:\n{}\n\nProvide your specialized take, \
             with precise code modifications where applicable.",
            task.description,
            key_points(&earlier.content, SEED_EXCERPT_CHARS)
        ))
    }

    fn result(
        &self,
        response: ModelResponse,
        models: Vec<String>,
        stages: u8,
        synthesis: Option<SynthesisMethod>,
    ) -> StrategyResult {
        StrategyResult {
            response,
            strategy: StrategyKind::DeepDive,
            models_consulted: models,
            synthesis,
            stages_used: stages,
            refinement_model: None,
        }
    }
}

#[async_trait]
impl OrchestrationStrategy for DeepDiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DeepDive
    }

    /// Default strategy: anything simple enough not to need a council
    fn should_activate(&self, analysis: &TaskAnalysis) -> bool {
        analysis.complexity <= ComplexityLevel::Medium
            || !analysis.requires_multiple_perspectives
    }

    async fn execute(
        &self,
        task: &Task,
        analysis: &TaskAnalysis,
        profile: &ThinkingProfile,
    ) -> Result<StrategyResult, OrchestratorError> {
        let options = options_for(profile, self.context.parallel_timeout);

        // Stage 1: fast first pass
        let stage1 = match self.context.adapter(roles::FAST) {
            Some(fast) => {
                info!("deep dive: stage 1 via fast backend");
                let stage1_options = options.clone().with_temperature(0.5);
                match self
                    .context
                    .query_and_commit(&fast, task, &stage1_options)
                    .await
                {
                    Ok(response) => {
                        if self.is_sufficient(&response, task) {
                            debug!("deep dive: stage 1 sufficient, returning early");
                            let model = response.model.clone();
                            return Ok(self.result(response, vec![model], 1, None));
                        }
                        Some(response)
                    }
                    // A failed first pass is not fatal; stage 2 still runs
                    Err(err) => {
                        debug!("deep dive: stage 1 failed, escalating: {}", err);
                        None
                    }
                }
            }
            None => None,
        };

        // Stage 2: primary backend, seeded with the stage-1 excerpt
        let primary = match self.context.adapter(roles::PRIMARY) {
            Some(primary) => primary,
            None => {
                // No primary configured: the stage-1 answer is all we have
                return match stage1 {
                    Some(response) => {
                        let model = response.model.clone();
                        Ok(self.result(response, vec![model], 1, None))
                    }
                    None => Err(OrchestratorError::NoModelsAvailable(
                        "neither fast nor primary backends are registered".to_string(),
                    )),
                };
            }
        };

        info!("deep dive: stage 2 via primary backend");
        let stage2_task = match &stage1 {
            Some(earlier) => self.enhance_with_excerpt(task, earlier),
            None => task.clone(),
        };
        let stage2 = match self
            .context
            .query_and_commit(&primary, &stage2_task, &options)
            .await
        {
            Ok(response) => response,
            Err(err) if !err.is_fatal() => {
                // Primary is down even after retries; walk the fallback
                // order before giving up
                // The fast role already had its chance in stage 1
                let failed: std::collections::HashSet<String> =
                    [roles::PRIMARY.to_string(), roles::FAST.to_string()]
                        .into_iter()
                        .collect();
                let fallback_role = self
                    .context
                    .policy
                    .choose_fallback(&failed, &self.context.available_roles())
                    .ok_or(err)?;
                info!(role = %fallback_role, "deep dive: stage 2 via fallback backend");
                let fallback = self
                    .context
                    .adapter(&fallback_role)
                    .expect("fallback role is registered");
                self.context
                    .query_and_commit(&fallback, &stage2_task, &options)
                    .await?
            }
            Err(err) => return Err(err),
        };

        let mut models: Vec<String> = stage1
            .iter()
            .map(|r| r.model.clone())
            .chain(std::iter::once(stage2.model.clone()))
            .collect();

        if !self.needs_specialized_expertise(&stage2, task) {
            debug!("deep dive: stage 2 sufficient, no specialist needed");
            return Ok(self.result(stage2, models, 2, None));
        }

        // Stage 3: exactly one specialist, then merge
        let Some((role, specialist)) = self.pick_specialist(analysis) else {
            debug!("deep dive: no specialist registered, returning stage 2");
            return Ok(self.result(stage2, models, 2, None));
        };

        info!(role = %role, "deep dive: stage 3 via specialist");
        let mut stage3_options = options.clone().with_temperature(0.5);
        if specialist.supports_diff_edits() && role == roles::EDITOR {
            stage3_options.edit_format = Some("diff-fenced".to_string());
        }
        let stage3 = self
            .context
            .query_and_commit(&specialist, &self.specialist_task(task, &stage2), &stage3_options)
            .await?;
        models.push(stage3.model.clone());

        let merged = self.context.synthesizer.combine(
            &[stage2.clone(), stage3.clone()],
            SynthesisMethod::Merge,
            None,
        );

        let response = ModelResponse {
            content: merged,
            model: format!("{} + {}", stage2.model, stage3.model),
            reasoning_tokens: sum_tokens(stage2.reasoning_tokens, stage3.reasoning_tokens),
            completion_tokens: sum_tokens(stage2.completion_tokens, stage3.completion_tokens),
            total_tokens: sum_tokens(stage2.total_tokens, stage3.total_tokens),
            latency_ms: sum_tokens(stage2.latency_ms, stage3.latency_ms),
            cost: stage2.cost + stage3.cost,
            confidence: match (stage2.confidence, stage3.confidence) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            metadata: Default::default(),
        };

        Ok(self.result(
            response,
            models,
            3,
            Some(SynthesisMethod::Merge),
        ))
    }
}

fn sum_tokens(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

fn excerpt(content: &str, limit: usize) -> String {
    if content.len() <= limit {
        return content.to_string();
    }
    let mut end = limit;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &content[..end])
}

/// Prefer the paragraph with implementation detail; fall back to the first
/// substantial one
fn key_points(content: &str, limit: usize) -> String {
    let paragraphs: Vec<&str> = content.split("\n\n").collect();

    for paragraph in &paragraphs {
        let lower = paragraph.to_lowercase();
        if ["implementation", "approach", "solution", "code"]
            .iter()
            .any(|k| lower.contains(k))
        {
            return excerpt(paragraph, limit);
        }
    }

    paragraphs
        .iter()
        .find(|p| p.len() > 100)
        .map(|p| excerpt(p, limit))
        .unwrap_or_else(|| excerpt(content, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::StubAdapter;
    use crate::adapters::AdapterRegistry;
    use crate::cost::CostGovernor;
    use crate::error::ErrorPolicy;
    use crate::synthesis::ResponseSynthesizer;
    use crate::task::TaskAnalyzer;
    use crate::thinking::ThinkingMode;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn context(adapters: AdapterRegistry) -> Arc<StrategyContext> {
        Arc::new(StrategyContext {
            adapters,
            synthesizer: ResponseSynthesizer::new(),
            governor: CostGovernor::new(dec!(10.00), dec!(100.00)),
            policy: ErrorPolicy::new(2, 2.0).with_base_delay(Duration::from_millis(1)),
            parallel_timeout: Duration::from_millis(100),
        })
    }

    fn analyze(description: &str) -> (Task, TaskAnalysis) {
        let task = Task::new(description).unwrap();
        let analysis = TaskAnalyzer::new().analyze(&task);
        (task, analysis)
    }

    fn good_answer() -> String {
        "The null check is missing before dereferencing the parser result. \
         Add a guard clause at the top of parse_entry and return early."
            .to_string()
    }

    #[tokio::test]
    async fn test_stage1_sufficient_returns_early() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", &good_answer())),
        );
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("primary-model", "should not be called")),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("Fix the null pointer bug in parser.py");
        assert!(strategy.should_activate(&analysis));

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();

        assert_eq!(result.stages_used, 1);
        assert_eq!(result.models_consulted, vec!["fast-model".to_string()]);
    }

    #[tokio::test]
    async fn test_short_stage1_forces_escalation() {
        let mut adapters = AdapterRegistry::new();
        // Under 50 chars: never sufficient
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", "add a null check")),
        );
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("primary-model", &good_answer())),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("Fix the null pointer bug in parser.py");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();

        assert_eq!(result.stages_used, 2);
        assert_eq!(result.models_consulted.len(), 2);
        assert_eq!(result.response.model, "primary-model");
    }

    #[tokio::test]
    async fn test_low_confidence_stage1_escalates() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", &good_answer()).with_confidence(0.3)),
        );
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("primary-model", &good_answer())),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("Fix the null pointer bug in parser.py");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();
        assert_eq!(result.stages_used, 2);
    }

    #[tokio::test]
    async fn test_implement_tasks_require_code_block() {
        let mut adapters = AdapterRegistry::new();
        let prose = "You should write a function that reverses the list and returns it.";
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", prose)),
        );
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new(
                "primary-model",
                "```rust\nfn reverse(v: &mut Vec<i32>) { v.reverse(); }\n```",
            )),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("implement a list reversal helper");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();
        assert_eq!(result.stages_used, 2);
    }

    #[tokio::test]
    async fn test_stage3_specialist_merge() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", "too shallow")),
        );
        // Stage 2 answer drips with uncertainty so a specialist is engaged
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new(
                "primary-model",
                "This is complex and challenging. There are trade-offs and \
                 considerations around cache invalidation.",
            )),
        );
        adapters.insert(
            "architect".to_string(),
            Arc::new(StubAdapter::new(
                "architect-model",
                "Implementation: split the cache into read and write paths.",
            )),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("Improve the architecture of the caching layer");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Medium.profile())
            .await
            .unwrap();

        assert_eq!(result.stages_used, 3);
        assert_eq!(result.synthesis, Some(SynthesisMethod::Merge));
        assert_eq!(result.models_consulted.len(), 3);
        assert_eq!(result.response.model, "primary-model + architect-model");
        assert_eq!(result.response.cost, dec!(0.02));
    }

    #[tokio::test]
    async fn test_stage2_falls_back_when_primary_is_down() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "fast".to_string(),
            Arc::new(StubAdapter::new("fast-model", "too shallow")),
        );
        // Fails more times than the retry ceiling allows
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("primary-model", "never produced").failing_first(10)),
        );
        adapters.insert(
            "editor".to_string(),
            Arc::new(StubAdapter::new("editor-model", &good_answer())),
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("fix the off-by-one in the pager");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();

        assert_eq!(result.response.model, "editor-model");
        assert_eq!(result.stages_used, 2);
    }

    #[tokio::test]
    async fn test_no_backends_is_fatal() {
        let strategy = DeepDiveStrategy::new(context(AdapterRegistry::new()));
        let (task, analysis) = analyze("fix the off-by-one in the pager");

        let err = strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoModelsAvailable(_)));
    }

    #[tokio::test]
    async fn test_stages_are_sequential() {
        // The fast stub records its call before primary is consulted; if
        // stage 2 ran concurrently the counts could not differ this way
        let fast = Arc::new(StubAdapter::new("fast-model", "meh"));
        let primary = Arc::new(StubAdapter::new("primary-model", &good_answer()));

        let mut adapters = AdapterRegistry::new();
        adapters.insert("fast".to_string(), fast.clone() as Arc<dyn ModelAdapter>);
        adapters.insert(
            "primary".to_string(),
            primary.clone() as Arc<dyn ModelAdapter>,
        );

        let strategy = DeepDiveStrategy::new(context(adapters));
        let (task, analysis) = analyze("fix the off-by-one in the pager");
        strategy
            .execute(&task, &analysis, &ThinkingMode::Low.profile())
            .await
            .unwrap();

        assert_eq!(fast.call_count(), 1);
        assert_eq!(primary.call_count(), 1);
    }
}
