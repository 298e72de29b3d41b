//! Error types for the archiver.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a storage backend call.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage request {operation} failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Storage request {operation} returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Malformed response from {operation}: {reason}")]
    MalformedResponse { operation: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn request(operation: &str, reason: impl std::fmt::Display) -> Self {
        Self::Request {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(operation: &str, reason: impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Upstream classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Classifier request failed: {0}")]
    Failed(String),

    #[error("Classifier reported an error: {0}")]
    Rejected(String),

    #[error("Could not fetch document: {0}")]
    Download(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decision-engine errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("missing metadata: {field}")]
    MissingMetadata { field: String },

    #[error("invalid folder path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("planner failed: {0}")]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ArchiveError {
    pub fn missing(field: &str) -> Self {
        Self::MissingMetadata {
            field: field.to_string(),
        }
    }
}

/// Planner failures. Surface as execution failures of the document.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("no plan after {0} rounds")]
    RoundLimit(usize),

    #[error("{0}")]
    Failed(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the archiver.
pub type Result<T> = std::result::Result<T, Error>;
