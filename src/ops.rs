//! Logical operation surface
//!
//! Maps named operations with JSON parameter maps onto the orchestrator.
//! Thin outer transports (CLI, servers) call [`invoke`] and relay the JSON
//! result; the engine itself stays transport-agnostic.

use serde_json::{json, Value};
use tracing::debug;

use crate::adapters::roles;
use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use crate::strategies::StrategyKind;
use crate::task::Task;
use crate::thinking::ThinkingMode;

/// Operations recognized by [`invoke`]
pub const OPERATIONS: &[&str] = &[
    "analyze_task",
    "orchestrate_task",
    "query_model",
    "get_status",
    "multi_model_review",
    "quick_model",
];

/// Dispatch one named operation.
///
/// Parameter conventions: `task` (string, required for task-shaped
/// operations), `code_context` (string), `file_paths` (string array),
/// `strategy` (string), `preferences` (string map), `role` (string),
/// `thinking_mode` (string).
pub async fn invoke(
    orchestrator: &Orchestrator,
    operation: &str,
    params: Value,
) -> Result<Value, OrchestratorError> {
    debug!(operation, "invoking operation");

    match operation {
        "analyze_task" => {
            let task = task_from_params(&params)?;
            let analysis = orchestrator.analyze(&task);
            serde_json::to_value(&analysis).map_err(internal)
        }

        "orchestrate_task" => {
            let task = task_from_params(&params)?;
            let strategy = params
                .get("strategy")
                .and_then(Value::as_str)
                .and_then(StrategyKind::parse);
            let result = orchestrator.run(task, strategy).await?;
            serde_json::to_value(&result).map_err(internal)
        }

        "query_model" => {
            let task = task_from_params(&params)?;
            let role = params
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or(roles::PRIMARY);
            let mode = thinking_mode_from_params(&params);
            let response = orchestrator.query_role(role, &task, mode).await?;
            serde_json::to_value(&response).map_err(internal)
        }

        "get_status" => {
            let status = orchestrator.status().await;
            serde_json::to_value(&status).map_err(internal)
        }

        "multi_model_review" => {
            let task = task_from_params(&params)?;
            let result = orchestrator.run(task, Some(StrategyKind::Council)).await?;
            serde_json::to_value(&result).map_err(internal)
        }

        "quick_model" => {
            // Single fast call, no escalation machinery
            let task = task_from_params(&params)?;
            let response = orchestrator
                .query_role(roles::FAST, &task, ThinkingMode::Low)
                .await?;
            Ok(json!({
                "content": response.content,
                "model": response.model,
                "cost": response.cost,
            }))
        }

        unknown => Err(OrchestratorError::Configuration(format!(
            "unknown operation '{}' (expected one of: {})",
            unknown,
            OPERATIONS.join(", ")
        ))),
    }
}

fn task_from_params(params: &Value) -> Result<Task, OrchestratorError> {
    let description = params
        .get("task")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            OrchestratorError::Configuration("missing required 'task' parameter".to_string())
        })?;

    let mut task = Task::new(description)?;

    if let Some(context) = params.get("code_context").and_then(Value::as_str) {
        task = task.with_code_context(context);
    }

    if let Some(paths) = params.get("file_paths").and_then(Value::as_array) {
        task = task.with_file_paths(
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }

    if let Some(preferences) = params.get("preferences").and_then(Value::as_object) {
        for (key, value) in preferences {
            if let Some(value) = value.as_str() {
                task = task.with_preference(key.clone(), value);
            }
        }
    }

    Ok(task)
}

fn thinking_mode_from_params(params: &Value) -> ThinkingMode {
    params
        .get("thinking_mode")
        .and_then(Value::as_str)
        .and_then(ThinkingMode::from_name)
        .unwrap_or(ThinkingMode::Medium)
}

fn internal(err: serde_json::Error) -> OrchestratorError {
    OrchestratorError::Configuration(format!("failed to serialize result: {}", err))
}
