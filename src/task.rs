//! Task representation and analysis
//!
//! Classifies incoming coding tasks by type, complexity, and impact so the
//! orchestrator can pick the right escalation strategy.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::OrchestratorError;

/// The kind of coding task being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Generation,
    BugFix,
    Refactoring,
    Architecture,
    Documentation,
    Review,
    TestGeneration,
    Optimization,
    ComplexEdit,
    Explanation,
    CriticalBug,
    Design,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Generation => "generation",
            TaskType::BugFix => "bug_fix",
            TaskType::Refactoring => "refactoring",
            TaskType::Architecture => "architecture",
            TaskType::Documentation => "documentation",
            TaskType::Review => "review",
            TaskType::TestGeneration => "test_generation",
            TaskType::Optimization => "optimization",
            TaskType::ComplexEdit => "complex_edit",
            TaskType::Explanation => "explanation",
            TaskType::CriticalBug => "critical_bug",
            TaskType::Design => "design",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task complexity, 5-point ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Trivial = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    VeryHigh = 5,
}

/// Potential blast radius of the task, 5-point ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Minimal = 1,
    Low = 2,
    Moderate = 3,
    Major = 4,
    Critical = 5,
}

/// A coding task submitted for orchestration.
///
/// Tasks are immutable once built. Strategies that need to "enhance" a task
/// (e.g. seed it with an earlier model's output) construct a new value via
/// [`Task::with_description`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub code_context: Option<String>,
    pub file_paths: Vec<String>,
    pub user_preferences: HashMap<String, String>,
    pub session_context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task. Fails if the description is empty or whitespace-only.
    pub fn new(description: impl Into<String>) -> Result<Self, OrchestratorError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "task description cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            description,
            code_context: None,
            file_paths: Vec::new(),
            user_preferences: HashMap::new(),
            session_context: HashMap::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_code_context(mut self, context: impl Into<String>) -> Self {
        self.code_context = Some(context.into());
        self
    }

    pub fn with_file_paths(mut self, paths: Vec<String>) -> Self {
        self.file_paths = paths;
        self
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_preferences.insert(key.into(), value.into());
        self
    }

    /// Build a new task with a replacement description, carrying over
    /// context, paths, and preference maps from this one.
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code_context: self.code_context.clone(),
            file_paths: self.file_paths.clone(),
            user_preferences: self.user_preferences.clone(),
            session_context: self.session_context.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Results of analyzing a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    pub complexity: ComplexityLevel,
    pub impact: ImpactLevel,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub estimated_lines_affected: u32,
    pub requires_multiple_perspectives: bool,
    pub has_architectural_implications: bool,
    pub requires_deep_reasoning: bool,
    pub confidence: f32,
}

/// One row of the task-type classification table
struct TypeRule {
    task_type: TaskType,
    patterns: Vec<Regex>,
}

fn rule(task_type: TaskType, patterns: &[&str]) -> TypeRule {
    TypeRule {
        task_type,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("invalid type pattern"))
            .collect(),
    }
}

/// Declarative pattern table: pattern group -> task type. Each matching
/// group adds one point to that type's score.
static TYPE_RULES: Lazy<Vec<TypeRule>> = Lazy::new(|| {
    vec![
        rule(
            TaskType::BugFix,
            &[
                r"\b(fix|bug|error|issue|problem|broken|crash|fail)\b",
                r"\b(not working|doesn't work|exception|traceback|panic)\b",
            ],
        ),
        rule(
            TaskType::Refactoring,
            &[
                r"\b(refactor|restructure|reorganize|clean up|improve)\b",
                r"\b(technical debt|code smell|duplicate|DRY)\b",
            ],
        ),
        rule(
            TaskType::Architecture,
            &[
                r"\b(architect|architecture|design|structure|pattern|system|module)\b",
                r"\b(microservice|monolith|layer|component|interface)\b",
            ],
        ),
        rule(
            TaskType::Generation,
            &[
                r"\b(create|implement|add|build|generate|write)\b",
                r"\b(feature|function|class|method|component)\b",
            ],
        ),
        rule(
            TaskType::TestGeneration,
            &[
                r"\b(test|unit test|integration test|e2e|coverage)\b",
                r"\b(pytest|jest|mocha|junit|testing)\b",
            ],
        ),
        rule(
            TaskType::Documentation,
            &[
                r"\b(document|docs|readme|comment|explain|describe)\b",
                r"\b(api doc|docstring|jsdoc|javadoc)\b",
            ],
        ),
        rule(
            TaskType::Optimization,
            &[
                r"\b(optimize|performance|speed up|faster|efficient)\b",
                r"\b(memory|cpu|latency|throughput|bottleneck)\b",
            ],
        ),
    ]
});

/// Complexity indicator phrases and their weights (applied at half value)
static COMPLEXITY_INDICATORS: &[(&str, u32)] = &[
    ("multi file", 3),
    ("architectural terms", 4),
    ("complex algorithms", 4),
    ("concurrent processing", 5),
    ("distributed systems", 5),
    ("security concerns", 4),
    ("performance critical", 4),
    ("large codebase", 3),
    ("multiple languages", 3),
    ("framework specific", 2),
];

static LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    (".py", "Python"),
    (".js", "JavaScript"),
    (".ts", "TypeScript"),
    (".java", "Java"),
    (".cpp", "C++"),
    (".c", "C"),
    (".go", "Go"),
    (".rs", "Rust"),
    (".rb", "Ruby"),
    (".php", "PHP"),
];

static FRAMEWORK_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("react", r"\b(react|jsx|hooks?)\b"),
        ("django", r"\b(django|models\.py|views\.py)\b"),
        ("flask", r"\b(flask|blueprint)\b"),
        ("express", r"\b(express|middleware)\b"),
        ("spring", r"\b(spring|autowired)\b"),
        ("vue", r"\b(vue|vuex|composition api)\b"),
        ("axum", r"\b(axum|tower)\b"),
        ("tokio", r"\b(tokio|async runtime)\b"),
    ]
    .iter()
    .map(|(name, pat)| {
        (
            *name,
            Regex::new(&format!("(?i){}", pat)).expect("invalid framework pattern"),
        )
    })
    .collect()
});

/// Analyzes tasks to determine type, complexity, and handling strategy.
///
/// Pure and deterministic: the same task always produces the same analysis.
#[derive(Debug, Default, Clone)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, task: &Task) -> TaskAnalysis {
        let task_type = self.detect_task_type(task);
        let complexity = self.assess_complexity(task, task_type);
        let impact = self.estimate_impact(task, task_type);

        TaskAnalysis {
            task_type,
            complexity,
            impact,
            languages: self.detect_languages(task),
            frameworks: self.detect_frameworks(task),
            estimated_lines_affected: self.estimate_affected_lines(task, task_type),
            requires_multiple_perspectives: self.needs_multiple_perspectives(task, complexity),
            has_architectural_implications: self.has_architectural_implications(task, task_type),
            requires_deep_reasoning: self.requires_deep_reasoning(task, complexity, task_type),
            confidence: self.calculate_confidence(task, task_type),
        }
    }

    fn detect_task_type(&self, task: &Task) -> TaskType {
        let description = task.description.to_lowercase();

        let mut best: Option<(TaskType, usize)> = None;
        for rule in TYPE_RULES.iter() {
            let score = rule
                .patterns
                .iter()
                .filter(|p| p.is_match(&description))
                .count();
            if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((rule.task_type, score));
            }
        }

        best.map(|(t, _)| t).unwrap_or(TaskType::Generation)
    }

    fn assess_complexity(&self, task: &Task, task_type: TaskType) -> ComplexityLevel {
        let base: f32 = match task_type {
            TaskType::Architecture
            | TaskType::Optimization
            | TaskType::CriticalBug
            | TaskType::ComplexEdit
            | TaskType::Design => 3.0,
            TaskType::Refactoring | TaskType::BugFix | TaskType::Generation | TaskType::Review => {
                2.0
            }
            TaskType::TestGeneration | TaskType::Documentation | TaskType::Explanation => 1.0,
        };
        let mut score = base;

        if task.file_paths.len() > 5 {
            score += 2.0;
        } else if task.file_paths.len() > 2 {
            score += 1.0;
        }

        let description = task.description.to_lowercase();
        for (indicator, weight) in COMPLEXITY_INDICATORS {
            if description.contains(indicator) {
                score += *weight as f32 * 0.5;
            }
        }

        if task
            .code_context
            .as_ref()
            .map(|c| c.len() > 5000)
            .unwrap_or(false)
        {
            score += 1.0;
        }

        if score <= 2.0 {
            ComplexityLevel::Low
        } else if score <= 4.0 {
            ComplexityLevel::Medium
        } else if score <= 6.0 {
            ComplexityLevel::High
        } else {
            ComplexityLevel::VeryHigh
        }
    }

    fn estimate_impact(&self, task: &Task, task_type: TaskType) -> ImpactLevel {
        if task_type == TaskType::CriticalBug {
            return ImpactLevel::Critical;
        }
        if matches!(task_type, TaskType::Architecture | TaskType::Design) {
            return ImpactLevel::Major;
        }

        if task.file_paths.len() > 10 {
            return ImpactLevel::Major;
        } else if task.file_paths.len() > 5 {
            return ImpactLevel::Moderate;
        }

        // Explicit severity keywords win over the default
        let description = task.description.to_lowercase();
        let keyword_levels: &[(&str, ImpactLevel)] = &[
            ("critical", ImpactLevel::Critical),
            ("major", ImpactLevel::Major),
            ("breaking", ImpactLevel::Major),
            ("security", ImpactLevel::Major),
            ("performance", ImpactLevel::Moderate),
            ("minor", ImpactLevel::Low),
        ];
        for (keyword, level) in keyword_levels {
            if description.contains(keyword) {
                return *level;
            }
        }

        ImpactLevel::Moderate
    }

    fn detect_languages(&self, task: &Task) -> Vec<String> {
        let mut languages: Vec<String> = Vec::new();

        for path in &task.file_paths {
            for (ext, lang) in LANGUAGE_EXTENSIONS {
                if path.ends_with(ext) && !languages.iter().any(|l| l == lang) {
                    languages.push(lang.to_string());
                }
            }
        }

        let description = task.description.to_lowercase();
        let mentions: &[(&str, &str)] = &[
            ("python", "Python"),
            ("javascript", "JavaScript"),
            ("typescript", "TypeScript"),
            ("java ", "Java"),
            ("golang", "Go"),
            ("rust", "Rust"),
        ];
        for (mention, canonical) in mentions {
            if description.contains(mention) && !languages.iter().any(|l| l == canonical) {
                languages.push(canonical.to_string());
            }
        }

        languages
    }

    fn detect_frameworks(&self, task: &Task) -> Vec<String> {
        let mut haystack = task.description.clone();
        if let Some(context) = &task.code_context {
            haystack.push(' ');
            haystack.push_str(context);
        }

        FRAMEWORK_RULES
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&haystack))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn estimate_affected_lines(&self, task: &Task, task_type: TaskType) -> u32 {
        let base = 50.0;
        let type_multiplier: f32 = match task_type {
            TaskType::Architecture | TaskType::Design => 10.0,
            TaskType::Refactoring => 5.0,
            TaskType::Optimization => 2.0,
            TaskType::BugFix | TaskType::CriticalBug => 0.5,
            TaskType::Documentation => 0.3,
            _ => 1.0,
        };
        let file_multiplier = task.file_paths.len().max(1) as f32;

        (base * type_multiplier * file_multiplier) as u32
    }

    fn has_architectural_implications(&self, task: &Task, task_type: TaskType) -> bool {
        if matches!(task_type, TaskType::Architecture | TaskType::Design) {
            return true;
        }

        let description = task.description.to_lowercase();
        [
            "architecture",
            "design pattern",
            "structure",
            "refactor",
            "module boundary",
            "interface",
            "api design",
        ]
        .iter()
        .any(|keyword| description.contains(keyword))
    }

    fn requires_deep_reasoning(
        &self,
        task: &Task,
        complexity: ComplexityLevel,
        task_type: TaskType,
    ) -> bool {
        if complexity >= ComplexityLevel::High {
            return true;
        }
        if matches!(
            task_type,
            TaskType::Architecture
                | TaskType::Optimization
                | TaskType::CriticalBug
                | TaskType::ComplexEdit
        ) {
            return true;
        }

        let description = task.description.to_lowercase();
        [
            "complex",
            "intricate",
            "sophisticated",
            "algorithm",
            "optimize",
            "design",
            "architect",
        ]
        .iter()
        .any(|keyword| description.contains(keyword))
    }

    fn needs_multiple_perspectives(&self, task: &Task, complexity: ComplexityLevel) -> bool {
        if complexity >= ComplexityLevel::High {
            return true;
        }

        let description = task.description.to_lowercase();
        [
            "best approach",
            "alternatives",
            "trade-offs",
            "pros and cons",
            "compare",
            "evaluate",
        ]
        .iter()
        .any(|keyword| description.contains(keyword))
    }

    fn calculate_confidence(&self, task: &Task, task_type: TaskType) -> f32 {
        let mut confidence: f32 = 0.7;

        if task.code_context.is_some() {
            confidence += 0.1;
        }
        confidence += 0.05 * task.file_paths.len().min(2) as f32;

        // Generation and explanation match broadly, so the classification
        // is less certain for them
        if matches!(task_type, TaskType::Generation | TaskType::Explanation) {
            confidence -= 0.1;
        }

        confidence.clamp(0.0, 1.0)
    }
}
