//! Tool trait: the surface an LLM planner sees.
//!
//! Archive tools do not touch storage. Parsing a call yields a
//! [`ProposedAction`] that the decision protocol validates and executes.

use crate::archive::types::ProposedAction;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// A tool exposed to the model.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Turn call arguments into a proposed action.
    fn parse(&self, params: &serde_json::Value) -> Result<ProposedAction, ToolError>;
}

/// Required non-empty string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{key}' parameter")))
}

/// Optional string parameter; blank counts as absent.
pub fn optional_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<Option<&'a str>, ToolError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then_some(s))
        }
        Some(_) => Err(ToolError::InvalidParameters(format!(
            "'{key}' must be a string"
        ))),
    }
}
