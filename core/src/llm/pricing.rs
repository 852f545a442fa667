//! Per-model price table, owned by the LLM adapter and sourced from
//! configuration — strategies never hard-code a price.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Dollars per million tokens, input and output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Maps model id to its price. Falls back to a conservative default price
/// for unconfigured models rather than failing the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    #[serde(default = "default_fallback")]
    fallback: ModelPrice,
}

fn default_fallback() -> ModelPrice {
    ModelPrice {
        input_per_million: 3.0,
        output_per_million: 15.0,
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert(
            "claude-opus-4".to_string(),
            ModelPrice {
                input_per_million: 15.0,
                output_per_million: 75.0,
            },
        );
        prices.insert(
            "claude-sonnet-4".to_string(),
            ModelPrice {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
        );
        prices.insert(
            "claude-haiku-4".to_string(),
            ModelPrice {
                input_per_million: 0.25,
                output_per_million: 1.25,
            },
        );
        prices.insert(
            "gpt-4o".to_string(),
            ModelPrice {
                input_per_million: 2.5,
                output_per_million: 10.0,
            },
        );
        prices.insert(
            "gpt-4o-mini".to_string(),
            ModelPrice {
                input_per_million: 0.15,
                output_per_million: 0.6,
            },
        );
        Self {
            prices,
            fallback: default_fallback(),
        }
    }
}

impl PriceTable {
    pub fn cost_usd(&self, model_id: &str, tokens_prompt: u64, tokens_completion: u64) -> f64 {
        let price = self.prices.get(model_id).copied().unwrap_or(self.fallback);
        let input_cost = (tokens_prompt as f64 / 1_000_000.0) * price.input_per_million;
        let output_cost = (tokens_completion as f64 / 1_000_000.0) * price.output_per_million;
        input_cost + output_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_configured_price() {
        let table = PriceTable::default();
        let cost = table.cost_usd("claude-sonnet-4", 1_000_000, 1_000_000);
        assert_eq!(cost, 18.0);
    }

    #[test]
    fn unknown_model_uses_fallback() {
        let table = PriceTable::default();
        let cost = table.cost_usd("mystery-model", 1_000_000, 0);
        assert_eq!(cost, 3.0);
    }
}
