// Provider-agnostic LLM adapter
//
// The orchestration core talks to every model through `LlmAdapter`.
// Adapters translate the canonical content-block form (text / tool_use /
// tool_result) into each provider's native shape and back:
// - Anthropic: identity mapping (the canonical form IS the Anthropic form)
// - OpenAI: function calling; tool results become role:"tool" messages
// - Gemini: parts / function calls; tool-use ids are synthesised

pub mod adapter;
pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use adapter::{
    LlmAdapter, LlmError, LlmRequest, LlmResponse, LlmStream, LlmStreamEvent, Result, TokenUsage,
};
pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// Default model per provider.
pub fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("claude-sonnet-4-5-20250929"),
        "openai" => Some("gpt-5.2"),
        "gemini" => Some("gemini-2.5-flash"),
        _ => None,
    }
}

/// Models accepted for a provider. Used by the configuration surface to
/// validate BYOK model overrides before a turn runs.
pub fn valid_models(provider: &str) -> &'static [&'static str] {
    match provider {
        "anthropic" => &[
            "claude-opus-4-6",
            "claude-sonnet-4-5-20250929",
            "claude-haiku-4-5-20251001",
            "claude-opus-4-5-20251101",
            "claude-sonnet-4-20250514",
            "claude-opus-4-20250514",
        ],
        "openai" => &[
            "gpt-5.2",
            "gpt-5.2-pro",
            "gpt-5",
            "gpt-5-mini",
            "gpt-5-nano",
            "gpt-4.1",
            "gpt-4.1-mini",
            "gpt-4.1-nano",
            "o3",
            "o3-mini",
            "o3-pro",
            "o4-mini",
        ],
        "gemini" => &[
            "gemini-2.5-flash",
            "gemini-2.5-flash-lite",
            "gemini-2.5-pro",
            "gemini-2.0-flash",
            "gemini-3-pro-preview",
            "gemini-3-flash-preview",
        ],
        _ => &[],
    }
}

/// Boxed adapter for dynamic dispatch.
pub type BoxedAdapter = std::sync::Arc<dyn LlmAdapter>;

/// Create the adapter for a provider with the given (already decrypted) key.
pub fn adapter_for(provider: &str, api_key: &str) -> Result<BoxedAdapter> {
    match provider {
        "anthropic" => Ok(std::sync::Arc::new(AnthropicAdapter::new(api_key))),
        "openai" => Ok(std::sync::Arc::new(OpenAiAdapter::new(api_key))),
        "gemini" => Ok(std::sync::Arc::new(GeminiAdapter::new(api_key))),
        other => Err(LlmError::config(format!("unsupported AI provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_factory_accepts_known_providers() {
        assert!(adapter_for("anthropic", "k").is_ok());
        assert!(adapter_for("openai", "k").is_ok());
        assert!(adapter_for("gemini", "k").is_ok());
        assert!(adapter_for("ollama", "k").is_err());
    }

    #[test]
    fn default_models_cover_every_provider() {
        for provider in ["anthropic", "openai", "gemini"] {
            let model = default_model(provider).unwrap();
            assert!(valid_models(provider).contains(&model));
        }
    }
}
