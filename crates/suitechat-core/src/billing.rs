// Credit cost per model tier.
//
// Ordered from most expensive to cheapest so that "opus" matches before
// "mini" (which could false-match "ge*mini*"). Token matching splits on
// hyphens and underscores first; substring matching is the fallback for
// model names without standard delimiters.

/// (keyword, cost) in priority order.
const MODEL_COSTS: [(&str, i64); 8] = [
    // Opus tier = 3 credits
    ("opus", 3),
    // Sonnet / Pro tier = 2 credits
    ("sonnet", 2),
    ("pro", 2),
    // Haiku / Flash tier = 1 credit
    ("haiku", 1),
    ("flash", 1),
    ("nano", 1),
    ("mini", 1),
    ("lite", 1),
];

/// Credit cost for a model identifier. Pure; unknown models cost 1.
pub fn calculate_cost(model: &str) -> i64 {
    let model_lower = model.to_lowercase();
    let tokens: Vec<&str> = model_lower
        .split(['-', '_'])
        .filter(|t| !t.is_empty())
        .collect();

    for (key, cost) in MODEL_COSTS {
        if tokens.contains(&key) {
            return cost;
        }
    }
    for (key, cost) in MODEL_COSTS {
        if model_lower.contains(key) {
            return cost;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_assignments() {
        assert_eq!(calculate_cost("claude-opus-4-6"), 3);
        assert_eq!(calculate_cost("claude-sonnet-4-5-20250929"), 2);
        assert_eq!(calculate_cost("gemini-2.5-pro"), 2);
        assert_eq!(calculate_cost("claude-haiku-4-5-20251001"), 1);
        assert_eq!(calculate_cost("gemini-2.5-flash"), 1);
        assert_eq!(calculate_cost("gpt-5-nano"), 1);
        assert_eq!(calculate_cost("gpt-4.1-mini"), 1);
        assert_eq!(calculate_cost("gemini-2.5-flash-lite"), 1);
    }

    #[test]
    fn gemini_never_matches_mini() {
        // "gemini" must not substring-match "mini": token matching splits
        // on delimiters first and the fallback walks tiers in priority
        // order, so plain "gemini" lands on the default
        assert_eq!(calculate_cost("gemini"), 1);
        assert_eq!(calculate_cost("gemini-2.0"), 1);
        // whereas gemini-pro is a real tier-2 model
        assert_eq!(calculate_cost("gemini-2.5-pro"), 2);
    }

    #[test]
    fn multi_key_names_resolve_in_priority_order() {
        // opus wins over mini
        assert_eq!(calculate_cost("opus-mini"), 3);
        // sonnet wins over lite
        assert_eq!(calculate_cost("sonnet-lite"), 2);
    }

    #[test]
    fn underscores_and_case_are_normalised() {
        assert_eq!(calculate_cost("CLAUDE_OPUS_4"), 3);
        assert_eq!(calculate_cost("GPT_5_MINI"), 1);
    }

    #[test]
    fn unknown_models_default_to_one_credit() {
        assert_eq!(calculate_cost("o3"), 1);
        assert_eq!(calculate_cost("mystery-model"), 1);
        assert_eq!(calculate_cost(""), 1);
    }

    #[test]
    fn cost_is_a_pure_function_of_the_name() {
        for model in ["claude-opus-4-6", "gpt-5-mini", "gemini-2.5-pro", "o3"] {
            assert_eq!(calculate_cost(model), calculate_cost(model));
        }
    }
}
