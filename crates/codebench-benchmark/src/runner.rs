use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use codebench_core::{
    BenchmarkReport, BenchmarkRunConfig, CodeBenchError, ErrorKind, GenerationResult, PricingTable,
    Problem, ProblemOutcome, ProgressUpdate, RunEvent, RunFailure, RunState, ServiceConfig, TokenUsage,
};
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::code_executor::SandboxExecutor;
use crate::code_extractor::extract_code;
use crate::problem_loader::{JsonlDatasetSource, ProblemSampler};
use crate::prompt::format_prompt;
use crate::provider::{ApiKeys, CompletionRequest, DefaultProviderResolver, ModelProvider, ProviderResolver};
use crate::test_runner::run_test_cases;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Drives a benchmark run: sample problems, generate a solution for each,
/// execute it, and report progress and the final aggregate as [`RunEvent`]s.
pub struct BenchmarkRunner {
    sampler: Arc<ProblemSampler>,
    resolver: Arc<dyn ProviderResolver>,
    executor: SandboxExecutor,
    pricing: PricingTable,
    max_tokens: u32,
}

impl BenchmarkRunner {
    pub fn new(
        sampler: Arc<ProblemSampler>,
        resolver: Arc<dyn ProviderResolver>,
        executor: SandboxExecutor,
        pricing: PricingTable,
    ) -> Self {
        Self {
            sampler,
            resolver,
            executor,
            pricing,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Dataset, providers, sandbox and pricing all come from `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CodeBenchError> {
        let sampler = ProblemSampler::new(Arc::new(JsonlDatasetSource::new(config.dataset.url.clone())));
        let resolver = DefaultProviderResolver::new(config.providers.clone());
        Ok(Self::new(
            Arc::new(sampler),
            Arc::new(resolver),
            SandboxExecutor::from_config(&config.sandbox),
            config.pricing.load_table()?,
        )
        .with_max_tokens(config.providers.max_tokens))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn sampler(&self) -> &Arc<ProblemSampler> {
        &self.sampler
    }

    /// Run to a terminal state. Exactly one `Complete` or `Error` event is
    /// sent, after every `Progress` event; panics inside the run are caught.
    pub async fn run(
        &self,
        config: &BenchmarkRunConfig,
        api_keys: &ApiKeys,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> RunState {
        tracing::info!(
            "Run {} initialized (model={}, provider={}, sample={})",
            config.run_id,
            config.model_name,
            config.provider_id,
            config.sample_size
        );

        let outcome = AssertUnwindSafe(self.execute(config, api_keys, events))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(report)) => {
                tracing::info!(
                    "Run {} completed: {}/{} passed, score {:.3}",
                    config.run_id,
                    report.passed_count,
                    report.total_count,
                    report.score
                );
                let _ = events.send(RunEvent::Complete(report));
                return RunState::Completed;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("Run panicked: {}", panic_message(panic.as_ref())),
        };

        tracing::error!("Run {} failed: {}", config.run_id, error);
        let _ = events.send(RunEvent::Error(RunFailure {
            run_id: config.run_id.clone(),
            error,
        }));
        RunState::Failed
    }

    async fn execute(
        &self,
        config: &BenchmarkRunConfig,
        api_keys: &ApiKeys,
        events: &mpsc::UnboundedSender<RunEvent>,
    ) -> Result<BenchmarkReport, CodeBenchError> {
        let provider = self
            .resolver
            .resolve(&config.provider_id, &config.model_name, api_keys)
            .map_err(|e| CodeBenchError::Provider(e.to_string()))?;

        let problems = self
            .sampler
            .load_problems(config.sample_size)
            .await
            .map_err(|e| CodeBenchError::DatasetLoad(e.to_string()))?;

        let started = Instant::now();
        let total = problems.len() as u32;
        tracing::info!("Run {} running {} problems", config.run_id, total);

        let mut usage = TokenUsage::default();
        let mut outcomes = Vec::with_capacity(problems.len());

        for (idx, problem) in problems.iter().enumerate() {
            let (outcome, generation) = self.evaluate_problem(provider.as_ref(), problem).await;
            if let Some(generation) = &generation {
                usage.add(generation);
            }

            match outcome.error_kind {
                None => tracing::info!("[{}/{}] {} PASS", idx + 1, total, problem.id),
                Some(kind) => tracing::info!("[{}/{}] {} FAIL ({})", idx + 1, total, problem.id, kind),
            }

            let _ = events.send(RunEvent::Progress(ProgressUpdate {
                run_id: config.run_id.clone(),
                current: idx as u32 + 1,
                total,
                latest_result: Some(outcome.clone()),
            }));
            outcomes.push(outcome);
        }

        let pricing = self.pricing.lookup(&config.model_name);
        Ok(BenchmarkReport::build(
            &config.run_id,
            &config.model_id,
            outcomes,
            usage,
            pricing,
            started.elapsed().as_secs(),
            Utc::now(),
        ))
    }

    /// Generate, extract and test one problem. Provider failures become an
    /// `api_error` outcome; the returned generation carries the token usage.
    pub async fn evaluate_problem(
        &self,
        provider: &dyn ModelProvider,
        problem: &Problem,
    ) -> (ProblemOutcome, Option<GenerationResult>) {
        let start = Instant::now();
        let request = CompletionRequest {
            prompt: format_prompt(problem),
            max_tokens: self.max_tokens,
        };

        let generation = match provider.complete(request).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("Generation failed for {}: {}", problem.id, e);
                let latency_ms = start.elapsed().as_millis() as u64;
                return (ProblemOutcome::failed(&problem.id, ErrorKind::ApiError, latency_ms), None);
            }
        };

        let code = extract_code(&generation.content);
        let verdict = run_test_cases(&self.executor, &code, &problem.test_cases()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let outcome = match verdict.error_kind {
            Some(kind) if !verdict.passed => ProblemOutcome::failed(&problem.id, kind, latency_ms),
            _ => ProblemOutcome::passed(&problem.id, latency_ms),
        };
        (outcome, Some(generation))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
