//! CLI interface for code-council

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::Config;
use crate::error::ErrorPolicy;
use crate::ops;

#[derive(Parser)]
#[command(name = "code-council")]
#[command(about = "Multi-model orchestration engine for coding tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a task without dispatching any backends
    Analyze {
        /// Task description
        task: String,
        /// File paths involved in the task
        #[arg(short, long)]
        files: Vec<String>,
    },
    /// Orchestrate a task across backends
    Orchestrate {
        /// Task description
        task: String,
        /// Strategy override (council | deep_dive)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Inline code context
        #[arg(short, long)]
        code_context: Option<String>,
        /// File paths involved in the task
        #[arg(short, long)]
        files: Vec<String>,
        /// Print the full result JSON instead of just the content
        #[arg(long)]
        json: bool,
    },
    /// Query one backend role directly
    Query {
        /// Backend role (fast | primary | editor | architect)
        role: String,
        /// Task description
        task: String,
        /// Thinking mode (minimal | low | medium | high | max)
        #[arg(short, long, default_value = "medium")]
        thinking: String,
    },
    /// Force a multi-model council review
    Review {
        /// Task description
        task: String,
    },
    /// Single fast call with no escalation
    Quick {
        /// Task description
        task: String,
    },
    /// Show orchestrator status and statistics
    Status,
    /// Show the active configuration
    Config,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        let config = Config::load()?;
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = Config::load()?;
    let orchestrator = config.build_orchestrator()?;

    let (operation, params, content_only) = match cli.command {
        Commands::Analyze { task, files } => (
            "analyze_task",
            json!({"task": task, "file_paths": files}),
            false,
        ),
        Commands::Orchestrate {
            task,
            strategy,
            code_context,
            files,
            json: raw,
        } => {
            let mut params = json!({"task": task, "file_paths": files});
            if let Some(strategy) = strategy {
                params["strategy"] = json!(strategy);
            }
            if let Some(context) = code_context {
                params["code_context"] = json!(context);
            }
            ("orchestrate_task", params, !raw)
        }
        Commands::Query {
            role,
            task,
            thinking,
        } => (
            "query_model",
            json!({"task": task, "role": role, "thinking_mode": thinking}),
            true,
        ),
        Commands::Review { task } => ("multi_model_review", json!({"task": task}), true),
        Commands::Quick { task } => ("quick_model", json!({"task": task}), true),
        Commands::Status => ("get_status", json!({}), false),
        Commands::Config => unreachable!("handled above"),
    };

    let result = match ops::invoke(&orchestrator, operation, params).await {
        Ok(result) => result,
        Err(err) => {
            let policy = ErrorPolicy::default();
            anyhow::bail!("{}", policy.format_user_error(&err));
        }
    };

    if content_only {
        // Task-shaped results carry the text under response.content or
        // content; fall back to the raw JSON
        let content = result
            .pointer("/response/content")
            .or_else(|| result.get("content"))
            .and_then(serde_json::Value::as_str);
        match content {
            Some(text) => println!("{}", text),
            None => println!("{}", serde_json::to_string_pretty(&result)?),
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
