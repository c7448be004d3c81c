//! Claimwise CLI - LLM-assisted payroll claim validation

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use claimwise_core::decode::check_unit_interval;
use claimwise_core::{DomainFacts, OverallStatus, TaskResult, Verdict};
use claimwise_runtime::{
    AdapterRegistry, ExecutionMode, LlmUsage, RuntimeConfig, RuntimeOrchestrator,
};
use serde::Serialize;

/// Exit code for malformed or missing input.
const EXIT_INPUT_ERROR: u8 = 3;

#[derive(Parser)]
#[command(name = "claimwise")]
#[command(author, version, about = "LLM-assisted payroll claim validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Runtime configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log dispatch decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a claim end to end
    Validate {
        /// Facts bundle (YAML or JSON)
        facts: PathBuf,

        /// Run task agents concurrently instead of one at a time
        #[arg(long)]
        concurrent: bool,
    },

    /// Decide a verdict from recorded task results, without calling any model
    Decide {
        /// Task results (YAML or JSON list)
        results: PathBuf,

        /// Claim identifier for the verdict
        #[arg(short, long)]
        subject: String,
    },

    /// List the provider catalog and credential status
    Providers,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_INPUT_ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "claimwise=debug,claimwise_core=debug,claimwise_runtime=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { facts, concurrent } => {
            let facts = DomainFacts::from_file(&facts)
                .with_context(|| format!("Failed to load facts from {}", facts.display()))?;

            let mut orchestrator = RuntimeOrchestrator::from_config(&config);
            if concurrent {
                orchestrator = orchestrator.with_execution_mode(ExecutionMode::Concurrent);
            }

            let result = orchestrator.submit_validation(&facts).await?;
            match cli.format {
                OutputFormat::Json => print_json(&ValidationOutput {
                    verdict: &result.verdict,
                    llm_usage: &result.llm_usage,
                    exhausted_dispatches: result.exhausted_dispatches,
                    exceeded_run_budget: result.exceeded_run_budget,
                })?,
                OutputFormat::Text => {
                    print_verdict(&result.verdict);
                    print_usage(&result.llm_usage, result.exhausted_dispatches);
                    if result.exceeded_run_budget {
                        println!("  validation took longer than the configured run timeout");
                    }
                }
            }
            Ok(exit_code(result.verdict.overall_status))
        }

        Commands::Decide { results, subject } => {
            let task_results = load_results(&results)?;
            let verdict = claimwise_core::decide(subject, task_results);
            match cli.format {
                OutputFormat::Json => print_json(&verdict)?,
                OutputFormat::Text => print_verdict(&verdict),
            }
            Ok(exit_code(verdict.overall_status))
        }

        Commands::Providers => {
            let rows = provider_rows(&config);
            match cli.format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Text => {
                    for row in &rows {
                        println!(
                            "{:<12} {:>4}  {:<45} {:<28} {}",
                            row.task,
                            row.priority,
                            row.provider,
                            row.cost,
                            row.status
                        );
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn load_results(path: &Path) -> Result<Vec<TaskResult>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let results: Vec<TaskResult> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        _ => serde_yaml::from_str(&contents)?,
    };

    for (index, result) in results.iter().enumerate() {
        if let Some(confidence) = result.confidence {
            check_unit_interval("confidence", confidence).with_context(|| {
                format!("Result {} ({}) in {}", index, result.task_type, path.display())
            })?;
        }
    }
    Ok(results)
}

fn exit_code(status: OverallStatus) -> ExitCode {
    ExitCode::from(status_code(status))
}

fn status_code(status: OverallStatus) -> u8 {
    match status {
        OverallStatus::Approved => 0,
        OverallStatus::Flagged => 1,
        OverallStatus::Rejected => 2,
    }
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    verdict: &'a Verdict,
    llm_usage: &'a LlmUsage,
    exhausted_dispatches: u32,
    exceeded_run_budget: bool,
}

#[derive(Serialize, Debug)]
struct ProviderRow {
    task: String,
    priority: u32,
    provider: String,
    cost: String,
    status: String,
}

fn provider_rows(config: &RuntimeConfig) -> Vec<ProviderRow> {
    let catalog = config.build_catalog();
    let registry = AdapterRegistry::with_defaults(&config.endpoints);

    let mut rows = Vec::new();
    for task in catalog.tasks() {
        for entry in catalog.for_task(task) {
            let status = if !registry.has_adapter(entry.family) {
                "not compiled in".to_string()
            } else if !entry.has_credential() {
                format!(
                    "missing {}",
                    entry.family.credential_env().unwrap_or("credential")
                )
            } else {
                match &entry.credential {
                    Some(credential) => format!("ready ({})", credential.source()),
                    None => "ready".to_string(),
                }
            };

            rows.push(ProviderRow {
                task: task.to_string(),
                priority: entry.priority,
                provider: entry.label(),
                cost: entry.cost_model.to_string(),
                status,
            });
        }
    }
    rows
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    println!(
        "Claim {}: {} (confidence {:.2})",
        verdict.subject_id,
        verdict.overall_status.to_string().to_uppercase(),
        verdict.confidence
    );
    println!("Recommendation: {}", verdict.recommendation);
    println!();

    println!("Tasks:");
    for result in &verdict.task_results {
        println!(
            "  {:<12} {:<10} {:>5}  {:<40} {:.2}s",
            result.task_type.as_str(),
            result.status.to_string(),
            result
                .confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".to_string()),
            result.served_by.as_deref().unwrap_or("-"),
            result.duration_seconds
        );
        if result.status.is_error() {
            println!("    {}", result.reasoning);
        }
    }

    if !verdict.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &verdict.issues {
            println!(
                "  [{}] {} ({}): {}",
                issue.severity, issue.title, issue.detected_by, issue.description
            );
        }
    }

    if !verdict.cited_references.is_empty() {
        println!();
        println!("Citations:");
        for reference in &verdict.cited_references {
            println!("  - {}", reference.citation());
        }
    }
}

fn print_usage(usage: &LlmUsage, exhausted: u32) {
    println!();
    println!(
        "LLM usage: {} calls, {} tokens, est. ${:.4}",
        usage.llm_calls, usage.total_tokens, usage.estimated_cost
    );
    if usage.unpriced_calls > 0 {
        println!("  {} calls could not be priced", usage.unpriced_calls);
    }
    if exhausted > 0 {
        println!("  {} tasks found no provider able to answer", exhausted);
    }
}
