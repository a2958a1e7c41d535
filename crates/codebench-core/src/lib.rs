pub mod config;
pub mod error;
pub mod pricing;
pub mod problem;
pub mod report;
pub mod run;

pub use config::{
    DatasetConfig, PricingConfig, ProviderConfig, SandboxConfig, SchedulerConfig, ServerConfig,
    ServiceConfig,
};
pub use error::{CodeBenchError, Result};
pub use pricing::{ModelPricing, PricingTable, DEFAULT_PRICING};
pub use problem::{Problem, TestCase};
pub use report::{BenchmarkReport, ErrorKind, GenerationResult, ProblemOutcome, TokenUsage};
pub use run::{infer_provider, BenchmarkRunConfig, ProgressUpdate, RunEvent, RunFailure, RunState};
