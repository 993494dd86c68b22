//! Per-model cost table and accounting (§4.3: "per-model (input_$, output_$)
//! per 1M tokens table").

use std::collections::HashMap;

use planning_core::TokenUsage;

/// `(input $ / 1M tokens, output $ / 1M tokens)`.
#[must_use]
pub fn pricing_table() -> HashMap<&'static str, (f64, f64)> {
    HashMap::from([
        ("claude-3-5-haiku-20241022", (0.80, 4.00)),
        ("claude-3-5-sonnet-20241022", (3.00, 15.00)),
        ("claude-3-opus-20240229", (15.00, 75.00)),
        ("gpt-4o", (2.50, 10.00)),
        ("gpt-4o-mini", (0.15, 0.60)),
        ("text-embedding-3-small", (0.02, 0.00)),
        ("text-embedding-3-large", (0.13, 0.00)),
    ])
}

/// `cost = input_tokens/1e6 * input_$ + output_tokens/1e6 * output_$`.
/// Unknown models are priced at `0.0` and should be logged by the caller.
#[must_use]
pub fn estimate_cost(model: &str, usage: TokenUsage, pricing: &HashMap<&'static str, (f64, f64)>) -> f64 {
    let Some((input_rate, output_rate)) = pricing.get(model) else {
        return 0.0;
    };
    (usage.input_tokens as f64 / 1_000_000.0) * input_rate
        + (usage.output_tokens as f64 / 1_000_000.0) * output_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_computes_nonzero_cost() {
        let pricing = pricing_table();
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        };
        let cost = estimate_cost("claude-3-5-haiku-20241022", usage, &pricing);
        assert!((cost - 4.80).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_costs_zero() {
        let pricing = pricing_table();
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 100,
        };
        assert_eq!(estimate_cost("totally-unknown-model", usage, &pricing), 0.0);
    }

    #[test]
    fn embedding_models_have_no_output_rate() {
        let pricing = pricing_table();
        assert_eq!(pricing["text-embedding-3-small"].1, 0.0);
    }
}
