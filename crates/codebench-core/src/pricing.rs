use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_price_per_million: f64, output_price_per_million: f64) -> Self {
        Self {
            input_price_per_million,
            output_price_per_million,
        }
    }

    /// Returns `(input_cost, output_cost)` in dollars, rounded to 4 decimals.
    pub fn costs(&self, input_tokens: u64, output_tokens: u64) -> (f64, f64) {
        let input = input_tokens as f64 / 1_000_000.0 * self.input_price_per_million;
        let output = output_tokens as f64 / 1_000_000.0 * self.output_price_per_million;
        (round_cost(input), round_cost(output))
    }
}

pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(5.00, 25.00);

pub fn round_cost(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Per-million-token prices keyed by the provider-facing model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    #[serde(default = "default_rate")]
    default: ModelPricing,
}

fn default_rate() -> ModelPricing {
    DEFAULT_PRICING
}

impl Default for PricingTable {
    fn default() -> Self {
        let models = [
            ("claude-opus-4-5-20251101", ModelPricing::new(5.00, 25.00)),
            ("claude-sonnet-4-20250514", ModelPricing::new(3.00, 15.00)),
            ("gpt-4.1", ModelPricing::new(2.00, 8.00)),
            ("o3", ModelPricing::new(2.00, 8.00)),
        ]
        .into_iter()
        .map(|(name, pricing)| (name.to_string(), pricing))
        .collect();

        Self {
            models,
            default: DEFAULT_PRICING,
        }
    }
}

impl PricingTable {
    pub fn lookup(&self, model_name: &str) -> ModelPricing {
        self.models.get(model_name).copied().unwrap_or(self.default)
    }

    pub fn insert(&mut self, model_name: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model_name.into(), pricing);
    }

    /// Merge a JSON object of `modelName -> {inputPricePerMillion, outputPricePerMillion}`
    /// over the built-in entries.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, ModelPricing> = serde_json::from_str(&content)?;
        self.models.extend(overrides);
        Ok(())
    }
}
