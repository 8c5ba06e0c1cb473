// Agentic chat orchestration core
//
// One chat turn flows: sanitize -> vernacular resolve -> compact history ->
// coordinator (route -> agents -> synthesis) -> persist -> memory update ->
// billing -> audit. Specialist agents are bounded loops over the governed
// tool dispatcher; the coordinator picks them by intent and synthesises
// (or passes through) their outputs.

pub mod agents;
pub mod billing;
pub mod compactor;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod prompts;
pub mod sanitize;
pub mod turn;
pub mod vernacular;

pub use agents::{run_agent, AgentKind, AgentSpec};
pub use billing::calculate_cost;
pub use compactor::{compact_history, COMPACTION_THRESHOLD, KEEP_RECENT};
pub use config::ChatConfig;
pub use coordinator::{classify_intent, Coordinator, CoordinatorOutput, RoutePlan};
pub use error::{CoreError, Result};
pub use memory::{has_correction_signal, maybe_extract_correction};
pub use sanitize::sanitize_user_input;
pub use turn::{TurnOutcome, TurnRunner};
pub use vernacular::resolve_vernacular;
