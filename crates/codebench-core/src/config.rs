use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pricing::PricingTable;
use crate::{CodeBenchError, Result};

pub const DEFAULT_DATASET_URL: &str =
    "https://huggingface.co/datasets/livecodebench/code_generation_lite/resolve/main/test.jsonl";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// `http(s)://` URL or local path of a line-delimited JSON corpus.
    pub url: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATASET_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub interpreter: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_memory_bytes: Option<u64>,
    #[serde(default)]
    pub max_cpu_seconds: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 30,
            max_memory_bytes: None,
            max_cpu_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    pub ollama_host: String,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            openai_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl PricingConfig {
    pub fn load_table(&self) -> Result<PricingTable> {
        let mut table = PricingTable::default();
        if let Some(path) = &self.file {
            table.extend_from_file(path)?;
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Endpoint returning the list of configured schedules. The ticker is
    /// disabled when unset.
    #[serde(default)]
    pub schedules_url: Option<String>,
    /// Base URL of the service accepting `POST /run`.
    #[serde(default)]
    pub runner_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedules_url: None,
            runner_url: None,
            callback_url: None,
            tick_interval_secs: 60,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = parse_var(&get, "PORT")? {
            config.server.port = port;
        }

        if let Some(url) = get("DATASET_URL") {
            config.dataset.url = url;
        }

        if let Some(interpreter) = get("SANDBOX_INTERPRETER") {
            config.sandbox.interpreter = interpreter;
        }
        if let Some(secs) = parse_var(&get, "SANDBOX_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(CodeBenchError::Config("SANDBOX_TIMEOUT_SECS must be at least 1".into()));
            }
            config.sandbox.timeout_secs = secs;
        }
        config.sandbox.max_memory_bytes = parse_var(&get, "SANDBOX_MAX_MEMORY_BYTES")?;
        config.sandbox.max_cpu_seconds = parse_var(&get, "SANDBOX_MAX_CPU_SECONDS")?;

        config.providers.anthropic_api_key = get("ANTHROPIC_API_KEY");
        config.providers.openai_api_key = get("OPENAI_API_KEY");
        if let Some(host) = get("OLLAMA_HOST") {
            config.providers.ollama_host = host;
        }
        if let Some(max_tokens) = parse_var(&get, "MAX_TOKENS")? {
            config.providers.max_tokens = max_tokens;
        }

        config.pricing.file = get("PRICING_FILE").map(PathBuf::from);

        config.scheduler.schedules_url = get("SCHEDULES_URL");
        config.scheduler.runner_url = get("RUNNER_URL");
        config.scheduler.callback_url = get("SCHEDULER_CALLBACK_URL");
        if let Some(secs) = parse_var(&get, "SCHEDULER_TICK_SECS")? {
            config.scheduler.tick_interval_secs = secs;
        }

        Ok(config)
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CodeBenchError::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}
