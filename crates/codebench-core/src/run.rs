use serde::{Deserialize, Serialize};

use crate::report::{BenchmarkReport, ProblemOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRunConfig {
    pub run_id: String,
    /// Identifier reported back to the results API.
    pub model_id: String,
    /// Provider-facing model name, also the pricing key.
    pub model_name: String,
    pub provider_id: String,
    /// Zero or negative means the full corpus.
    pub sample_size: i64,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Pick a provider from the model name when none is given: `gpt*`, `o1*`
/// and `o3*` go to OpenAI, everything else to Anthropic.
pub fn infer_provider(model_name: &str) -> &'static str {
    match ["gpt", "o1", "o3"].iter().any(|p| model_name.starts_with(p)) {
        true => "openai",
        false => "anthropic",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub run_id: String,
    pub current: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_result: Option<ProblemOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub run_id: String,
    pub error: String,
}

/// Messages delivered to a run's callback URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Progress(ProgressUpdate),
    Complete(BenchmarkReport),
    Error(RunFailure),
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::Progress(p) => &p.run_id,
            RunEvent::Complete(r) => &r.run_id,
            RunEvent::Error(e) => &e.run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Progress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ErrorKind;

    #[test]
    fn test_progress_wire_shape() {
        let event = RunEvent::Progress(ProgressUpdate {
            run_id: "r1".into(),
            current: 2,
            total: 5,
            latest_result: Some(ProblemOutcome::failed("abc", ErrorKind::Timeout, 30_001)),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["runId"], "r1");
        assert_eq!(value["current"], 2);
        assert_eq!(value["latestResult"]["errorKind"], "timeout");
    }

    #[test]
    fn test_error_wire_shape() {
        let event = RunEvent::Error(RunFailure {
            run_id: "r2".into(),
            error: "dataset unavailable".into(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, serde_json::json!({"type": "error", "runId": "r2", "error": "dataset unavailable"}));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_config_accepts_missing_callback() {
        let config: BenchmarkRunConfig = serde_json::from_str(
            r#"{"runId":"r","modelId":"m","modelName":"n","providerId":"anthropic","sampleSize":0}"#,
        )
        .unwrap();
        assert_eq!(config.callback_url, None);
        assert!(!RunState::Running.is_terminal());
    }

    #[test]
    fn test_infer_provider() {
        assert_eq!(infer_provider("gpt-4.1"), "openai");
        assert_eq!(infer_provider("o3"), "openai");
        assert_eq!(infer_provider("claude-sonnet-4-20250514"), "anthropic");
    }
}
