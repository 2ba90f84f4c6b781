//! Model catalog entries and cost estimation.

use crate::model::Usage;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Default currency for pricing.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelInfo {
    /// Vendor model identifier.
    pub id: CompactString,

    /// Human-readable name.
    pub name: String,

    /// Context window size in tokens.
    pub context_length: usize,

    /// Price per input token.
    #[serde(default)]
    pub input_price: f64,

    /// Price per output token.
    #[serde(default)]
    pub output_price: f64,

    /// Currency of the prices.
    #[serde(default = "default_currency")]
    pub currency: CompactString,

    /// Whether the model runs locally.
    #[serde(default)]
    pub local: bool,

    /// Whether a local model is installed.
    #[serde(default)]
    pub installed: bool,
}

impl ModelInfo {
    /// Create a remote model entry with per-token pricing in the default
    /// currency.
    pub fn remote(
        id: impl Into<CompactString>,
        name: impl Into<String>,
        context_length: usize,
        input_price: f64,
        output_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context_length,
            input_price,
            output_price,
            currency: default_currency(),
            local: false,
            installed: false,
        }
    }

    /// Estimate the cost of `usage` on this model.
    pub fn cost(&self, usage: &Usage) -> CostEstimate {
        let input = f64::from(usage.prompt_tokens) * self.input_price;
        let output = f64::from(usage.completion_tokens) * self.output_price;
        CostEstimate {
            input,
            output,
            total: input + output,
            currency: self.currency.clone(),
        }
    }
}

/// Estimated cost of a request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CostEstimate {
    /// Cost of the prompt tokens.
    pub input: f64,

    /// Cost of the completion tokens.
    pub output: f64,

    /// Total cost.
    pub total: f64,

    /// Currency of the estimate.
    pub currency: CompactString,
}

impl CostEstimate {
    /// A zero-valued estimate in the given currency.
    pub fn zero(currency: impl Into<CompactString>) -> Self {
        Self {
            input: 0.0,
            output: 0.0,
            total: 0.0,
            currency: currency.into(),
        }
    }

    /// Look up `model` in `catalog` and price `usage` against it.
    ///
    /// Unknown models yield a zero estimate in `currency`, never an error.
    pub fn from_catalog(catalog: &[ModelInfo], usage: &Usage, model: &str, currency: &str) -> Self {
        catalog
            .iter()
            .find(|m| m.id == model)
            .map(|m| m.cost(usage))
            .unwrap_or_else(|| Self::zero(currency))
    }
}

fn default_currency() -> CompactString {
    CompactString::const_new(DEFAULT_CURRENCY)
}
