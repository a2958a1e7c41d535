use codebench_benchmark::ApiKeys;
use codebench_core::{BenchmarkRunConfig, RunState};
use codebench_scheduler::ScheduledMinute;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// === Runs ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub sample_size: i64,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub api_keys: ApiKeys,
}

impl RunRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("runId", &self.run_id),
            ("modelId", &self.model_id),
            ("modelName", &self.model_name),
            ("provider", &self.provider),
            ("callbackUrl", &self.callback_url),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::BadRequest(format!("{name} is required")));
        }

        match Url::parse(&self.callback_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(AppError::BadRequest(format!(
                "callbackUrl must be an http(s) URL: {}",
                self.callback_url
            ))),
        }
    }

    pub fn to_config(&self) -> BenchmarkRunConfig {
        BenchmarkRunConfig {
            run_id: self.run_id.clone(),
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            provider_id: self.provider.clone(),
            sample_size: self.sample_size,
            callback_url: Some(self.callback_url.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedResponse {
    pub status: &'static str,
    pub run_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    pub run_id: String,
    pub state: RunState,
}

// === Claims ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub model_id: String,
    pub scheduled_minute: ScheduledMinute,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub claimed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub older_than_minute: ScheduledMinute,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub status: &'static str,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
