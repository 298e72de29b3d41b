//! Per-document processing context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::archive::types::DocumentRef;

/// Context for processing one document within a run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContext {
    /// Run this document belongs to; shared by every document of one pass.
    pub run_id: Uuid,
    pub document: DocumentRef,
    pub started_at: DateTime<Utc>,
}

impl DocumentContext {
    pub fn new(run_id: Uuid, document: DocumentRef) -> Self {
        Self {
            run_id,
            document,
            started_at: Utc::now(),
        }
    }

    /// Context with a fresh run id, for one-off processing and tests.
    pub fn standalone(document: DocumentRef) -> Self {
        Self::new(Uuid::new_v4(), document)
    }

    pub fn file_id(&self) -> &str {
        &self.document.id
    }
}
