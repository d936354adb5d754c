//! Code Council - multi-model orchestration engine
//!
//! Routes a natural-language coding task to one or more remote reasoning
//! backends, selects an escalation strategy from the task analysis, and
//! merges the results under a cost budget:
//! - Pattern-based task classification (type, complexity, impact)
//! - Concurrent "council" fan-out and sequential "deep dive" escalation
//! - Weighted-consensus, best-of, and section-merge synthesis
//! - Atomic cost ledger with per-request and daily ceilings
//! - Retry/backoff/fallback policy for transient backend failures
//!
//! # Example
//!
//! ```ignore
//! use code_council::config::Config;
//! use code_council::task::Task;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Config::load()?.build_orchestrator()?;
//!     let task = Task::new("Fix the null pointer bug in parser.py")?;
//!     let result = orchestrator.run(task, None).await?;
//!     println!("{}", result.response.content);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod clarify;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod strategies;
pub mod synthesis;
pub mod task;
pub mod thinking;

// Re-export commonly used types for convenience
pub use adapters::{AdapterRegistry, ModelAdapter, ModelResponse, QueryOptions};
pub use config::Config;
pub use cost::CostGovernor;
pub use error::{ErrorPolicy, OrchestratorError};
pub use orchestrator::{Orchestrator, OrchestratorSettings, StatusReport};
pub use strategies::{StrategyKind, StrategyResult};
pub use synthesis::{ResponseSynthesizer, SynthesisMethod};
pub use task::{ComplexityLevel, ImpactLevel, Task, TaskAnalysis, TaskAnalyzer, TaskType};
pub use thinking::{ThinkingMode, ThinkingProfile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
