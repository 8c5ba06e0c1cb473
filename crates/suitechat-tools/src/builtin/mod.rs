// Built-in local tools.
//
// Each tool runs in-process over the shared DB/credential context and is
// reachable only through the governed dispatcher.

pub mod connectivity;
pub mod metadata;
pub mod rag_search;
pub mod save_rule;
pub mod suiteql;
pub mod workspace;

pub use connectivity::ConnectivityTool;
pub use metadata::RefreshMetadataTool;
pub use rag_search::RagSearchTool;
pub use save_rule::SaveLearnedRuleTool;
pub use suiteql::SuiteQlTool;
pub use workspace::{
    WorkspaceListFilesTool, WorkspaceProposePatchTool, WorkspaceReadFileTool, WorkspaceSearchTool,
};

use crate::registry::ToolRegistry;

/// Registry with the full built-in tool set.
pub fn standard_registry() -> ToolRegistry {
    ToolRegistry::builder()
        .register(SuiteQlTool::new())
        .register(ConnectivityTool::new())
        .register(RefreshMetadataTool)
        .register(RagSearchTool)
        .register(SaveLearnedRuleTool)
        .register(WorkspaceListFilesTool)
        .register(WorkspaceReadFileTool)
        .register(WorkspaceSearchTool)
        .register(WorkspaceProposePatchTool)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_exposes_the_expected_tool_names() {
        let registry = standard_registry();
        for name in [
            "netsuite.suiteql",
            "netsuite.connectivity",
            "netsuite.refresh_metadata",
            "rag_search",
            "save_learned_rule",
            "workspace.list_files",
            "workspace.read_file",
            "workspace.search",
            "workspace.propose_patch",
        ] {
            assert!(registry.contains(name), "missing tool {name}");
        }
    }
}
