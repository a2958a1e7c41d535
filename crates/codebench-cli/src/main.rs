use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use codebench_benchmark::{ApiKeys, BenchmarkRunner};
use codebench_core::{infer_provider, BenchmarkReport, BenchmarkRunConfig, RunEvent, ServiceConfig};
use codebench_scheduler::CronExpr;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codebench")]
#[command(about = "codebench - coding benchmark runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a benchmark locally and write the report as JSON
    Run {
        /// Provider-facing model name (e.g. claude-sonnet-4-20250514, gpt-4.1)
        #[arg(short, long)]
        model: String,

        /// Identifier written into the report (defaults to the model name)
        #[arg(long)]
        model_id: Option<String>,

        /// anthropic, openai or ollama (inferred from the model name if omitted)
        #[arg(short, long)]
        provider: Option<String>,

        /// Number of problems to sample; 0 runs the whole corpus
        #[arg(short, long, default_value = "0")]
        sample: i64,

        /// Where to write the report
        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,
    },

    /// Inspect cron expressions
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },
}

#[derive(Subcommand, Debug)]
enum CronAction {
    /// List the next fire times of an expression
    Next {
        expr: String,

        #[arg(short, long, default_value = "5")]
        count: usize,

        /// RFC 3339 start instant (defaults to now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },

    /// Check whether an expression fires at a given minute
    Check {
        expr: String,

        /// RFC 3339 instant (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            model,
            model_id,
            provider,
            sample,
            output,
        } => cmd_run(&model, model_id, provider, sample, &output).await?,
        Commands::Cron { action } => match action {
            CronAction::Next { expr, count, from } => cmd_cron_next(&expr, count, from)?,
            CronAction::Check { expr, at } => cmd_cron_check(&expr, at)?,
        },
    }

    Ok(())
}

async fn cmd_run(
    model: &str,
    model_id: Option<String>,
    provider: Option<String>,
    sample: i64,
    output: &Path,
) -> Result<()> {
    let config = ServiceConfig::from_env()?;
    let runner = BenchmarkRunner::from_config(&config)?;

    let run_config = BenchmarkRunConfig {
        run_id: uuid::Uuid::new_v4().to_string(),
        model_id: model_id.unwrap_or_else(|| model.to_string()),
        model_name: model.to_string(),
        provider_id: provider.unwrap_or_else(|| infer_provider(model).to_string()),
        sample_size: sample,
        callback_url: None,
    };

    println!();
    println!("Running benchmark...");
    println!("  Model:    {}", run_config.model_name);
    println!("  Provider: {}", run_config.provider_id);
    println!("  Sample:   {}", sample);
    println!();

    let (events, receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(receiver));
    runner.run(&run_config, &ApiKeys::default(), &events).await;
    drop(events);

    match printer.await? {
        Some(RunEvent::Complete(report)) => {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
            print!("{}", format_summary(&report, model, output));
            Ok(())
        }
        Some(RunEvent::Error(failure)) => bail!("Run failed: {}", failure.error),
        _ => bail!("Run ended without a result"),
    }
}

/// Print progress as it arrives; returns the terminal event.
async fn print_events(mut receiver: mpsc::UnboundedReceiver<RunEvent>) -> Option<RunEvent> {
    while let Some(event) = receiver.recv().await {
        match &event {
            RunEvent::Progress(progress) => {
                if let Some(outcome) = &progress.latest_result {
                    let status = match outcome.error_kind {
                        None => "PASS".to_string(),
                        Some(kind) => format!("FAIL ({kind})"),
                    };
                    println!(
                        "[{}/{}] {}: {} ({}ms)",
                        progress.current, progress.total, outcome.problem_id, status, outcome.latency_ms
                    );
                }
            }
            _ => return Some(event),
        }
    }
    None
}

fn format_summary(report: &BenchmarkReport, model: &str, output: &Path) -> String {
    let rule = "=".repeat(50);
    let mut lines = vec![
        String::new(),
        rule.clone(),
        "Benchmark Complete".to_string(),
        rule,
        format!("Model:          {}", model),
        format!(
            "Score:          {:.2}% ({}/{})",
            report.score * 100.0,
            report.passed_count,
            report.total_count
        ),
        format!("Duration:       {}s", report.duration_seconds),
        format!("Input tokens:   {}", group_thousands(report.input_tokens)),
        format!("Output tokens:  {}", group_thousands(report.output_tokens)),
        format!("Input cost:     ${:.4}", report.input_cost),
        format!("Output cost:    ${:.4}", report.output_cost),
        format!("Total cost:     ${:.4}", report.total_cost()),
        format!("Results saved:  {}", output.display()),
    ];
    lines.push(String::new());
    lines.join("\n")
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn cmd_cron_next(expr: &str, count: usize, from: Option<DateTime<Utc>>) -> Result<()> {
    let cron: CronExpr = expr.parse()?;
    let times = upcoming(&cron, from.unwrap_or_else(Utc::now), count);

    if times.is_empty() {
        println!("'{}' does not fire within the next year", cron);
    }
    for at in times {
        println!("{}", at.format("%Y-%m-%d %H:%M UTC (%a)"));
    }
    Ok(())
}

fn upcoming(cron: &CronExpr, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    std::iter::successors(cron.next_after(from), |prev| cron.next_after(*prev))
        .take(count)
        .collect()
}

fn cmd_cron_check(expr: &str, at: Option<DateTime<Utc>>) -> Result<()> {
    let cron: CronExpr = expr.parse()?;
    let at = at.unwrap_or_else(Utc::now);
    let verdict = match cron.matches(at) {
        true => "fires",
        false => "does not fire",
    };
    println!("'{}' {} at {}", cron, verdict, at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}
