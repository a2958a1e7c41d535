pub mod anthropic;
pub mod code_executor;
pub mod code_extractor;
pub mod notifier;
pub mod ollama;
pub mod openai;
pub mod problem_loader;
pub mod prompt;
pub mod provider;
pub mod runner;
pub mod test_runner;

pub use code_executor::{classify, ExecutionOutput, ResourceLimits, SandboxExecutor, MAX_CAPTURE_BYTES};
pub use code_extractor::extract_code;
pub use notifier::{CallbackNotifier, DeliveryStats};
pub use problem_loader::{
    parse_corpus, sample_problems, DatasetLoadError, DatasetSource, JsonlDatasetSource, ProblemSampler,
    FIXED_RANDOM_SEED,
};
pub use prompt::format_prompt;
pub use provider::{
    ApiKeys, CompletionRequest, DefaultProviderResolver, ModelProvider, ProviderError,
    ProviderResolver,
};
pub use runner::{BenchmarkRunner, DEFAULT_MAX_TOKENS};
pub use test_runner::{outputs_match, run_test_cases, TestRunVerdict};
