// Chat turn intents, in router priority order.

use serde::{Deserialize, Serialize};

/// What kind of work a user message is asking for. The lexical classifier
/// evaluates these in declaration order; `Ambiguous` permits an LLM
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    DataQuery,
    WorkspaceDev,
    Documentation,
    Analysis,
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DataQuery => "DATA_QUERY",
            Intent::WorkspaceDev => "WORKSPACE_DEV",
            Intent::Documentation => "DOCUMENTATION",
            Intent::Analysis => "ANALYSIS",
            Intent::Ambiguous => "AMBIGUOUS",
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DATA_QUERY" => Ok(Intent::DataQuery),
            "WORKSPACE_DEV" => Ok(Intent::WorkspaceDev),
            "DOCUMENTATION" => Ok(Intent::Documentation),
            "ANALYSIS" => Ok(Intent::Analysis),
            "AMBIGUOUS" => Ok(Intent::Ambiguous),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
