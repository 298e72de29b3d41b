//! Archive tools — the only operations a planner can request.
//!
//! Each tool maps one-to-one onto an [`ArchiveAction`] variant. Parsing
//! validates the arguments; nothing here touches storage.

use serde_json::{Value, json};

use crate::archive::rules::sanitize_filename;
use crate::archive::types::{ArchiveAction, FolderPath, ProposedAction};
use crate::llm::ToolCall;
use crate::tools::tool::{Tool, ToolError, optional_str, require_str};

pub const MOVE_TO_FOLDER: &str = "archive_move_to_folder";
pub const COPY_TO_FOLDER: &str = "archive_copy_to_folder";
pub const MOVE_TO_REVIEW: &str = "archive_move_to_review";
pub const MOVE_TO_UNCLASSIFIED: &str = "archive_move_to_unclassified";

fn folder_schema(path_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_id": {
                "type": "string",
                "description": "Id of the document being archived"
            },
            "path": {
                "type": "string",
                "description": path_description
            },
            "new_name": {
                "type": "string",
                "description": "New file name including extension. Omit to keep the current name."
            }
        },
        "required": ["file_id", "path"]
    })
}

fn parse_path(params: &Value) -> Result<FolderPath, ToolError> {
    // `path` may be empty (the root itself) but must be present.
    let raw = match params.get("path") {
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(ToolError::InvalidParameters(
                "'path' must be a string".to_string(),
            ));
        }
        None => {
            return Err(ToolError::InvalidParameters(
                "missing 'path' parameter".to_string(),
            ));
        }
    };
    FolderPath::parse(raw).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

fn parse_folder_call(
    params: &Value,
    build: fn(FolderPath, Option<String>) -> ArchiveAction,
) -> Result<ProposedAction, ToolError> {
    let file_id = require_str(params, "file_id")?;
    let path = parse_path(params)?;
    // Blank or dot-only names keep the current name.
    let new_name = optional_str(params, "new_name")?
        .map(sanitize_filename)
        .filter(|name| !name.chars().all(|c| c == '.'));
    Ok(ProposedAction {
        file_id: file_id.to_string(),
        action: build(path, new_name),
    })
}

/// Move a document into the archive tree.
pub struct MoveToFolderTool;

impl Tool for MoveToFolderTool {
    fn name(&self) -> &str {
        MOVE_TO_FOLDER
    }

    fn description(&self) -> &str {
        "Move the document into the archive, under a path relative to the archive root \
         such as '2024/2024-01/Banking'. Missing folders are created. Optionally rename it."
    }

    fn parameters_schema(&self) -> Value {
        folder_schema("Folder path relative to the archive root, segments separated by '/'")
    }

    fn parse(&self, params: &Value) -> Result<ProposedAction, ToolError> {
        parse_folder_call(params, |path, new_name| ArchiveAction::MoveTo { path, new_name })
    }
}

/// Copy a document into the archive tree, leaving the original in place.
pub struct CopyToFolderTool;

impl Tool for CopyToFolderTool {
    fn name(&self) -> &str {
        COPY_TO_FOLDER
    }

    fn description(&self) -> &str {
        "Copy the document into the archive under a path relative to the archive root. \
         The original is not moved. A copy must always be followed by a move."
    }

    fn parameters_schema(&self) -> Value {
        folder_schema("Folder path relative to the archive root, segments separated by '/'")
    }

    fn parse(&self, params: &Value) -> Result<ProposedAction, ToolError> {
        parse_folder_call(params, |path, new_name| ArchiveAction::CopyTo { path, new_name })
    }
}

/// Move a document into the review staging area.
pub struct MoveToReviewTool;

impl Tool for MoveToReviewTool {
    fn name(&self) -> &str {
        MOVE_TO_REVIEW
    }

    fn description(&self) -> &str {
        "Move the document into the review area for a human to check, under a path \
         relative to the review root such as '2024/2024-01'. Optionally rename it."
    }

    fn parameters_schema(&self) -> Value {
        folder_schema("Folder path relative to the review root; empty string for the root itself")
    }

    fn parse(&self, params: &Value) -> Result<ProposedAction, ToolError> {
        parse_folder_call(params, |path, new_name| ArchiveAction::MoveToReview {
            path,
            new_name,
        })
    }
}

/// Move a document to the unclassified folder with a reason.
pub struct MoveToUnclassifiedTool;

impl Tool for MoveToUnclassifiedTool {
    fn name(&self) -> &str {
        MOVE_TO_UNCLASSIFIED
    }

    fn description(&self) -> &str {
        "Move the document to the unclassified folder when it cannot be archived. \
         A note with the classification and the reason is written next to it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": {
                    "type": "string",
                    "description": "Id of the document being archived"
                },
                "reason": {
                    "type": "string",
                    "description": "Why the document could not be archived"
                }
            },
            "required": ["file_id", "reason"]
        })
    }

    fn parse(&self, params: &Value) -> Result<ProposedAction, ToolError> {
        let file_id = require_str(params, "file_id")?;
        let reason = require_str(params, "reason")?;
        Ok(ProposedAction {
            file_id: file_id.to_string(),
            action: ArchiveAction::unclassified(reason),
        })
    }
}

impl ArchiveAction {
    /// The tool call that requests this action for `file_id`.
    pub fn to_tool_call(&self, file_id: &str, call_id: impl Into<String>) -> ToolCall {
        let (name, arguments) = match self {
            Self::MoveTo { path, new_name } => (MOVE_TO_FOLDER, folder_args(file_id, path, new_name)),
            Self::CopyTo { path, new_name } => (COPY_TO_FOLDER, folder_args(file_id, path, new_name)),
            Self::MoveToReview { path, new_name } => {
                (MOVE_TO_REVIEW, folder_args(file_id, path, new_name))
            }
            Self::MoveToUnclassified { reason } => (
                MOVE_TO_UNCLASSIFIED,
                json!({"file_id": file_id, "reason": reason}),
            ),
        };
        ToolCall {
            id: call_id.into(),
            name: name.to_string(),
            arguments,
        }
    }
}

fn folder_args(file_id: &str, path: &FolderPath, new_name: &Option<String>) -> Value {
    let mut args = json!({"file_id": file_id, "path": path.to_string()});
    if let Some(name) = new_name {
        args["new_name"] = Value::String(name.clone());
    }
    args
}
