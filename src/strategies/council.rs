//! Council strategy: concurrent multi-model consultation
//!
//! Dispatches the roster in parallel, synthesizes the surviving responses
//! by weighted consensus, then asks the highest-weighted backend to
//! reconcile the synthesis in one refinement pass.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    options_for, OrchestrationStrategy, StrategyContext, StrategyKind, StrategyResult,
};
use crate::adapters::{roles, ModelAdapter, ModelResponse};
use crate::error::OrchestratorError;
use crate::synthesis::SynthesisMethod;
use crate::task::{ComplexityLevel, ImpactLevel, Task, TaskAnalysis, TaskType};
use crate::thinking::ThinkingProfile;

pub struct CouncilStrategy {
    context: Arc<StrategyContext>,
}

impl CouncilStrategy {
    pub fn new(context: Arc<StrategyContext>) -> Self {
        Self { context }
    }

    /// Roster selection: primary always; specialists when the task shape
    /// calls for them.
    fn build_roster(&self, analysis: &TaskAnalysis) -> Vec<(String, Arc<dyn ModelAdapter>)> {
        let mut roster = Vec::new();

        if let Some(adapter) = self.context.adapter(roles::PRIMARY) {
            roster.push((roles::PRIMARY.to_string(), adapter));
        }

        if self.include_editor(analysis) {
            if let Some(adapter) = self.context.adapter(roles::EDITOR) {
                roster.push((roles::EDITOR.to_string(), adapter));
            }
        }

        if self.include_architect(analysis) {
            if let Some(adapter) = self.context.adapter(roles::ARCHITECT) {
                roster.push((roles::ARCHITECT.to_string(), adapter));
            }
        }

        roster
    }

    fn include_editor(&self, analysis: &TaskAnalysis) -> bool {
        matches!(
            analysis.task_type,
            TaskType::ComplexEdit
                | TaskType::Refactoring
                | TaskType::BugFix
                | TaskType::Optimization
        ) || analysis.languages.len() > 1
            || analysis.complexity >= ComplexityLevel::High
    }

    fn include_architect(&self, analysis: &TaskAnalysis) -> bool {
        matches!(analysis.task_type, TaskType::Architecture | TaskType::Design)
            || analysis.has_architectural_implications
    }

    /// Per-response weights: role affinity, confidence scaling, and a
    /// bonus for reasoning effort actually spent. Normalized to sum 1.
    fn compute_weights(
        &self,
        analysis: &TaskAnalysis,
        consulted: &[(String, ModelResponse)],
    ) -> HashMap<String, f64> {
        let mut weights = HashMap::new();

        for (role, response) in consulted {
            let mut weight = 1.0;

            match role.as_str() {
                roles::EDITOR
                    if matches!(
                        analysis.task_type,
                        TaskType::ComplexEdit | TaskType::Refactoring
                    ) =>
                {
                    weight *= 1.3
                }
                roles::ARCHITECT
                    if matches!(
                        analysis.task_type,
                        TaskType::Architecture | TaskType::Design
                    ) =>
                {
                    weight *= 1.3
                }
                roles::PRIMARY => weight *= 1.2,
                _ => {}
            }

            if let Some(confidence) = response.confidence {
                weight *= 0.5 + f64::from(confidence) * 0.5;
            }

            if let Some(tokens) = response.reasoning_tokens {
                let ratio = tokens as f64 / 10_000.0;
                weight *= 1.0 + (ratio * 0.2).min(0.4);
            }

            weights.insert(response.model.clone(), weight);
        }

        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for weight in weights.values_mut() {
                *weight /= total;
            }
        }

        weights
    }

    fn refinement_task(&self, task: &Task, synthesized: &str) -> Task {
        task.with_description(format!(
            "Based on the following synthesized response from multiple models, \
             provide a refined, coherent solution.\n\n\
             Original task: {}\n\n\
             Synthesized response:\n{}\n\n\
             Preserve all key insights, resolve contradictions, and keep the \
             result technically accurate.",
            task.description, synthesized
        ))
    }
}

#[async_trait]
impl OrchestrationStrategy for CouncilStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Council
    }

    fn should_activate(&self, analysis: &TaskAnalysis) -> bool {
        analysis.complexity >= ComplexityLevel::High
            || matches!(
                analysis.task_type,
                TaskType::Architecture | TaskType::CriticalBug | TaskType::Design
            )
            || analysis.impact >= ImpactLevel::Major
            || analysis.requires_multiple_perspectives
            || analysis.has_architectural_implications
    }

    async fn execute(
        &self,
        task: &Task,
        analysis: &TaskAnalysis,
        profile: &ThinkingProfile,
    ) -> Result<StrategyResult, OrchestratorError> {
        let roster = self.build_roster(analysis);
        if roster.is_empty() {
            return Err(OrchestratorError::NoModelsAvailable(
                "no adapters registered for council dispatch".to_string(),
            ));
        }

        let options = options_for(profile, self.context.parallel_timeout);
        info!(models = roster.len(), "council: consulting models in parallel");

        // Fan out with one independent timeout per call; a slow or failed
        // sibling is excluded, never fatal to the batch
        let calls = roster.iter().map(|(role, adapter)| {
            let context = &self.context;
            let options = &options;
            async move {
                let outcome = tokio::time::timeout(
                    context.parallel_timeout,
                    context.query_and_commit(adapter, task, options),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(OrchestratorError::Timeout {
                        model: adapter.model_id().to_string(),
                        seconds: context.parallel_timeout.as_secs(),
                    })
                });
                (role.clone(), outcome)
            }
        });

        let mut consulted: Vec<(String, ModelResponse)> = Vec::new();
        for (role, outcome) in futures::future::join_all(calls).await {
            match outcome {
                Ok(response) => consulted.push((role, response)),
                Err(err) => warn!(role = %role, "council: model excluded: {}", err),
            }
        }

        if consulted.is_empty() {
            return Err(OrchestratorError::NoModelsAvailable(
                "every council model failed or timed out".to_string(),
            ));
        }

        let models_consulted: Vec<String> = consulted
            .iter()
            .map(|(_, response)| response.model.clone())
            .collect();
        let total_cost: rust_decimal::Decimal =
            consulted.iter().map(|(_, r)| r.cost).sum();

        if consulted.len() == 1 {
            info!("council: single model responded, returning directly");
            let (_, response) = consulted.into_iter().next().expect("one response");
            return Ok(StrategyResult {
                response,
                strategy: StrategyKind::Council,
                models_consulted,
                synthesis: None,
                stages_used: 1,
                refinement_model: None,
            });
        }

        let weights = self.compute_weights(analysis, &consulted);
        let responses: Vec<ModelResponse> =
            consulted.iter().map(|(_, r)| r.clone()).collect();
        let synthesized = self.context.synthesizer.combine(
            &responses,
            SynthesisMethod::WeightedConsensus,
            Some(&weights),
        );

        // Refinement: the top-weighted backend reconciles the synthesis at
        // low temperature
        let (best_role, best_response) = consulted
            .iter()
            .max_by(|(_, a), (_, b)| {
                let wa = weights.get(&a.model).copied().unwrap_or(0.0);
                let wb = weights.get(&b.model).copied().unwrap_or(0.0);
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty consulted list");

        let refinement_adapter = self
            .context
            .adapter(best_role)
            .expect("consulted role still registered");
        let refinement_options = options.clone().with_temperature(0.3);
        let refinement = self
            .context
            .query_and_commit(
                &refinement_adapter,
                &self.refinement_task(task, &synthesized),
                &refinement_options,
            )
            .await;

        let mut response = match refinement {
            Ok(refined) => refined,
            Err(err) => {
                // Synthesis already holds the best content; refinement is
                // an improvement pass, not a requirement
                warn!("council: refinement failed, using synthesis: {}", err);
                let mut fallback = best_response.clone();
                fallback.content = synthesized;
                fallback
            }
        };
        response.cost = total_cost + response.cost;

        Ok(StrategyResult {
            response,
            strategy: StrategyKind::Council,
            models_consulted,
            synthesis: Some(SynthesisMethod::WeightedConsensus),
            stages_used: 1,
            refinement_model: Some(refinement_adapter.model_id().to_string()),
        })
    }
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

    #[test]
    fn test_activation_conditions() {
        let strategy = CouncilStrategy::new(context(AdapterRegistry::new()));

        let (_, architecture) =
            analyze("Design a microservices architecture for an e-commerce platform");
        assert!(strategy.should_activate(&architecture));

        let (_, perspectives) = analyze("compare the trade-offs of these two approaches");
        assert!(strategy.should_activate(&perspectives));

        let (_, simple) = analyze("fix a typo in the readme");
        assert!(!strategy.should_activate(&simple));
    }

    #[test]
    fn test_activates_on_complexity_or_type_alone() {
        let strategy = CouncilStrategy::new(context(AdapterRegistry::new()));
        let base = TaskAnalysis {
            task_type: TaskType::Generation,
            complexity: ComplexityLevel::Low,
            impact: ImpactLevel::Moderate,
            languages: vec![],
            frameworks: vec![],
            estimated_lines_affected: 50,
            requires_multiple_perspectives: false,
            has_architectural_implications: false,
            requires_deep_reasoning: false,
            confidence: 0.8,
        };
        assert!(!strategy.should_activate(&base));

        for complexity in [ComplexityLevel::High, ComplexityLevel::VeryHigh] {
            assert!(strategy.should_activate(&TaskAnalysis { complexity, ..base.clone() }));
        }
        for task_type in [TaskType::Architecture, TaskType::CriticalBug, TaskType::Design] {
            assert!(strategy.should_activate(&TaskAnalysis { task_type, ..base.clone() }));
        }
        assert!(strategy.should_activate(&TaskAnalysis {
            impact: ImpactLevel::Major,
            ..base.clone()
        }));
    }

    #[tokio::test]
    async fn test_fan_out_synthesis_and_refinement() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("model-a", "primary take on the design")),
        );
        adapters.insert(
            "architect".to_string(),
            Arc::new(
                StubAdapter::new("model-b", "architectural take on the design")
                    .with_confidence(0.95),
            ),
        );

        let strategy = CouncilStrategy::new(context(adapters));
        let (task, analysis) =
            analyze("Design a microservices architecture for an e-commerce platform");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::High.profile())
            .await
            .unwrap();

        assert_eq!(result.models_consulted.len(), 2);
        assert_eq!(result.synthesis, Some(SynthesisMethod::WeightedConsensus));
        assert!(result.refinement_model.is_some());
        // Two council calls plus one refinement call committed
        assert_eq!(result.response.cost, dec!(0.03));
    }

    #[tokio::test]
    async fn test_timeout_excludes_only_the_slow_model() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("model-a", "fast and correct")),
        );
        adapters.insert(
            "editor".to_string(),
            Arc::new(StubAdapter::new("model-b", "precise edits").with_confidence(0.9)),
        );
        adapters.insert(
            "architect".to_string(),
            Arc::new(
                StubAdapter::new("model-c", "never arrives")
                    .with_delay(Duration::from_secs(5)),
            ),
        );

        let strategy = CouncilStrategy::new(context(adapters));
        let (task, analysis) =
            analyze("Refactor the architecture of the payment module for scale");
        assert!(strategy.should_activate(&analysis));

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::High.profile())
            .await
            .unwrap();

        assert_eq!(result.models_consulted.len(), 2);
        assert!(!result.models_consulted.contains(&"model-c".to_string()));
    }

    #[tokio::test]
    async fn test_single_response_returned_directly() {
        let mut adapters = AdapterRegistry::new();
        adapters.insert(
            "primary".to_string(),
            Arc::new(StubAdapter::new("model-a", "the only opinion")),
        );

        let strategy = CouncilStrategy::new(context(adapters));
        let (task, analysis) = analyze("Design the plugin system");

        let result = strategy
            .execute(&task, &analysis, &ThinkingMode::Medium.profile())
            .await
            .unwrap();

        assert_eq!(result.response.content, "the only opinion");
        assert!(result.synthesis.is_none());
        assert!(result.refinement_model.is_none());
    }

    #[tokio::test]
    async fn test_empty_roster_is_fatal() {
        let strategy = CouncilStrategy::new(context(AdapterRegistry::new()));
        let (task, analysis) = analyze("Design the plugin system");

        let err = strategy
            .execute(&task, &analysis, &ThinkingMode::Medium.profile())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoModelsAvailable(_)));
    }
}
