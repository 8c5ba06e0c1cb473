// Orchestration configuration. Binaries read the environment; libraries
// receive this by value.

/// Tunables for one chat deployment.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// LLM provider id: anthropic | openai | gemini
    pub provider: String,
    /// Primary model for agents and synthesis
    pub model: String,
    /// Fast model for extraction, routing fallback, and compaction
    pub fast_model: String,
    /// Max tokens per agent/synthesis call
    pub max_tokens: u32,
    /// History window in turns (each turn = 2 messages), capped at 20
    pub max_history_turns: usize,
    /// Outer budget for one turn, in seconds
    pub turn_budget_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            fast_model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 4096,
            max_history_turns: 10,
            turn_budget_secs: 120,
        }
    }
}

impl ChatConfig {
    /// History window in messages, with the 20-turn ceiling applied.
    pub fn history_message_limit(&self) -> i64 {
        (self.max_history_turns.min(20) * 2) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_is_capped_at_twenty_turns() {
        let mut config = ChatConfig::default();
        config.max_history_turns = 50;
        assert_eq!(config.history_message_limit(), 40);

        config.max_history_turns = 5;
        assert_eq!(config.history_message_limit(), 10);
    }
}
