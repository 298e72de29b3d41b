//! Tool registry — the allow-list between planner output and execution.

use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::types::ProposedAction;
use crate::llm::{ToolCall, ToolDefinition};
use crate::tools::builtin::archive::{
    CopyToFolderTool, MoveToFolderTool, MoveToReviewTool, MoveToUnclassifiedTool,
};
use crate::tools::tool::{Tool, ToolError};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry holding exactly the four archive tools.
    pub fn archive() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MoveToFolderTool));
        registry.register(Arc::new(CopyToFolderTool));
        registry.register(Arc::new(MoveToReviewTool));
        registry.register(Arc::new(MoveToUnclassifiedTool));
        registry
    }

    /// Register a tool. A later registration with the same name is ignored.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "Rejected duplicate tool registration");
            return;
        }
        tracing::debug!("Registered tool: {}", name);
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Parse a model tool call into a proposed action.
    pub fn parse_call(&self, call: &ToolCall) -> Result<ProposedAction, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tool.parse(&call.arguments)
    }

    /// Tool definitions for LLM function calling, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::types::ArchiveAction;
    use serde_json::json;

    struct MockTool {
        name: String,
    }

    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "A mock tool for testing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }
        fn parse(&self, _params: &serde_json::Value) -> Result<ProposedAction, ToolError> {
            Ok(ProposedAction {
                file_id: "mock".into(),
                action: ArchiveAction::unclassified("mock"),
            })
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn test_archive_registry_has_exactly_four_tools() {
        let registry = ToolRegistry::archive();
        assert_eq!(
            registry.list(),
            vec![
                "archive_copy_to_folder",
                "archive_move_to_folder",
                "archive_move_to_review",
                "archive_move_to_unclassified",
            ]
        );
    }

    #[test]
    fn test_tool_definitions_sorted() {
        let defs = ToolRegistry::archive().tool_definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(defs.iter().all(|d| d.parameters["required"].is_array()));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let result =
            ToolRegistry::archive().parse_call(&call("shell", json!({"command": "rm -rf /"})));
        assert_eq!(result, Err(ToolError::UnknownTool("shell".into())));
    }

    #[test]
    fn test_parse_call_dispatches_by_name() {
        let proposed = ToolRegistry::archive()
            .parse_call(&call(
                "archive_move_to_unclassified",
                json!({"file_id": "f", "reason": "unreadable"}),
            ))
            .unwrap();
        assert_eq!(proposed.action, ArchiveAction::unclassified("unreadable"));
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MockTool { name: "a".into() }));
        registry.register(Arc::new(MockTool { name: "a".into() }));
        assert_eq!(registry.count(), 1);
        assert!(registry.has("a"));
        assert!(registry.get("b").is_none());
    }
}
