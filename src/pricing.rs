// USD per million tokens: (model prefix, input, output)
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gemini-3-pro", 1.25, 10.0),
    ("gemini-3-flash", 0.15, 0.60),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.0),
    ("gpt-5", 2.00, 8.00),
    ("claude-sonnet-4-5", 3.00, 15.00),
];

/// Estimated cost in USD, or `None` for a model we have no price for.
/// Model ids are matched by prefix so dated and preview variants resolve.
pub fn calculate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    MODEL_PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| {
            (input_tokens as f64 * input + output_tokens as f64 * output) / 1_000_000.0
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_cost() {
        let cost = calculate_cost("gpt-4o-mini", 1_000_000, 1_000_000).unwrap();
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_match_prefers_specific_entry() {
        // gpt-4o-mini must not resolve to the gpt-4o row
        let mini = calculate_cost("gpt-4o-mini", 0, 1_000_000).unwrap();
        let full = calculate_cost("gpt-4o-2024-08-06", 0, 1_000_000).unwrap();
        assert!((mini - 0.60).abs() < 1e-9);
        assert!((full - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_dated_variant_resolves() {
        assert!(calculate_cost("claude-sonnet-4-5-20250929", 10, 10).is_some());
        assert!(calculate_cost("gemini-3-flash-preview", 10, 10).is_some());
        assert!(calculate_cost("mystery-model", 10, 10).is_none());
    }
}
