use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::ModelPricing;

// =============================================================================
// Per-problem results
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Runtime,
    WrongAnswer,
    Timeout,
    ApiError,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Runtime => "runtime",
            ErrorKind::WrongAnswer => "wrong_answer",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ApiError => "api_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Text and usage returned by a model provider for one prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemOutcome {
    pub problem_id: String,
    pub passed: bool,
    pub error_kind: Option<ErrorKind>,
    pub latency_ms: u64,
}

impl ProblemOutcome {
    pub fn passed(problem_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            problem_id: problem_id.into(),
            passed: true,
            error_kind: None,
            latency_ms,
        }
    }

    pub fn failed(problem_id: impl Into<String>, error_kind: ErrorKind, latency_ms: u64) -> Self {
        Self {
            problem_id: problem_id.into(),
            passed: false,
            error_kind: Some(error_kind),
            latency_ms,
        }
    }
}

// =============================================================================
// Run aggregate
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub run_id: String,
    pub model_id: String,
    pub run_date: DateTime<Utc>,
    pub sample_size: u32,
    pub score: f64,
    pub passed_count: u32,
    pub total_count: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub duration_seconds: u64,
    pub problems: Vec<ProblemOutcome>,
}

/// Token totals accumulated over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, generation: &GenerationResult) {
        self.input_tokens += generation.input_tokens;
        self.output_tokens += generation.output_tokens;
    }
}

impl BenchmarkReport {
    pub fn build(
        run_id: &str,
        model_id: &str,
        problems: Vec<ProblemOutcome>,
        usage: TokenUsage,
        pricing: ModelPricing,
        duration_seconds: u64,
        run_date: DateTime<Utc>,
    ) -> Self {
        let total_count = problems.len() as u32;
        let passed_count = problems.iter().filter(|p| p.passed).count() as u32;
        let score = match total_count {
            0 => 0.0,
            _ => passed_count as f64 / total_count as f64,
        };
        let (input_cost, output_cost) = pricing.costs(usage.input_tokens, usage.output_tokens);

        Self {
            run_id: run_id.to_string(),
            model_id: model_id.to_string(),
            run_date,
            sample_size: total_count,
            score,
            passed_count,
            total_count,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            input_cost,
            output_cost,
            duration_seconds,
            problems,
        }
    }

    pub fn failed_count(&self) -> u32 {
        self.total_count - self.passed_count
    }

    pub fn total_cost(&self) -> f64 {
        self.input_cost + self.output_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(passed: &[bool]) -> Vec<ProblemOutcome> {
        passed
            .iter()
            .enumerate()
            .map(|(i, &ok)| match ok {
                true => ProblemOutcome::passed(format!("p{i}"), 10),
                false => ProblemOutcome::failed(format!("p{i}"), ErrorKind::WrongAnswer, 10),
            })
            .collect()
    }

    #[test]
    fn test_three_of_four_scores_point_seven_five() {
        let report = BenchmarkReport::build(
            "run-1",
            "model",
            outcomes(&[true, true, false, true]),
            TokenUsage::default(),
            ModelPricing::new(1.0, 1.0),
            3,
            Utc::now(),
        );

        assert_eq!(report.score, 0.75);
        assert_eq!(report.passed_count, 3);
        assert_eq!(report.total_count, 4);
        assert_eq!(report.passed_count + report.failed_count(), report.total_count);
        assert_eq!(report.sample_size, 4);
    }

    #[test]
    fn test_empty_run_scores_zero() {
        let report = BenchmarkReport::build(
            "run-2",
            "model",
            Vec::new(),
            TokenUsage::default(),
            ModelPricing::new(1.0, 1.0),
            0,
            Utc::now(),
        );

        assert_eq!(report.score, 0.0);
        assert_eq!(report.total_count, 0);
    }

    #[test]
    fn test_costs_come_from_usage() {
        let usage = TokenUsage {
            input_tokens: 50_000,
            output_tokens: 10_000,
        };
        let report = BenchmarkReport::build(
            "run-3",
            "model",
            outcomes(&[true]),
            usage,
            ModelPricing::new(15.0, 75.0),
            1,
            Utc::now(),
        );

        assert_eq!(report.input_cost, 0.75);
        assert_eq!(report.output_cost, 0.75);
        assert_eq!(report.total_cost(), 1.5);
    }

    #[test]
    fn test_error_kind_wire_names() {
        let json = serde_json::to_string(&ProblemOutcome::failed("x", ErrorKind::ApiError, 5)).unwrap();
        assert!(json.contains(r#""errorKind":"api_error""#));
        assert!(json.contains(r#""problemId":"x""#));
        assert_eq!(ErrorKind::WrongAnswer.to_string(), "wrong_answer");
    }
}
