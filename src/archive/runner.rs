//! Runner — one pass over the drop folder.
//!
//! Documents are processed one at a time: download to scratch space,
//! classify, run the decision protocol. A failing document never stops the
//! run; only a failure to list the drop folder does.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::folders::FolderIndex;
use crate::archive::protocol::DecisionProtocol;
use crate::archive::rules::sanitize_filename;
use crate::archive::types::{
    ArchiveAction, ArchiveOutcome, ArchiveRoots, ClassificationResult, DocumentRef, DocumentState,
    RunReport,
};
use crate::classifier::Classifier;
use crate::config::FolderNames;
use crate::context::DocumentContext;
use crate::error::{ClassificationError, StorageError};
use crate::storage::{ChildFilter, PDF_MIME_TYPE, StorageBackend};

/// Find or create the working folders under `root_id`.
///
/// The archive root is `root_id` itself.
pub async fn bootstrap_roots(
    storage: Arc<dyn StorageBackend>,
    root_id: &str,
    names: &FolderNames,
) -> Result<ArchiveRoots, StorageError> {
    let index = FolderIndex::new(storage);
    let roots = ArchiveRoots {
        archive: root_id.to_string(),
        drop: index.ensure_folder(root_id, &names.drop).await?,
        unclassified: index.ensure_folder(root_id, &names.unclassified).await?,
        review: index.ensure_folder(root_id, &names.review).await?,
    };
    info!(
        root = %root_id,
        drop = %roots.drop,
        unclassified = %roots.unclassified,
        review = %roots.review,
        "Folder structure ready"
    );
    Ok(roots)
}

/// Plan for one document from a dry run.
#[derive(Debug, Clone)]
pub struct PlannedDocument {
    pub document: DocumentRef,
    /// Validated actions, or why the document would go to unclassified.
    pub plan: Result<Vec<ArchiveAction>, String>,
}

pub struct Archiver {
    storage: Arc<dyn StorageBackend>,
    classifier: Arc<dyn Classifier>,
    protocol: DecisionProtocol,
    drop_folder: String,
    scratch_dir: Option<PathBuf>,
}

impl Archiver {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        classifier: Arc<dyn Classifier>,
        protocol: DecisionProtocol,
        roots: &ArchiveRoots,
    ) -> Self {
        Self {
            storage,
            classifier,
            protocol,
            drop_folder: roots.drop.clone(),
            scratch_dir: None,
        }
    }

    /// Stage downloads under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    /// PDFs currently waiting in the drop folder.
    pub async fn pending(&self) -> Result<Vec<DocumentRef>, StorageError> {
        let entries = self
            .storage
            .list_children(&self.drop_folder, &ChildFilter::of_type(PDF_MIME_TYPE))
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| DocumentRef::new(entry.id, entry.name))
            .collect())
    }

    /// Archive everything in the drop folder.
    pub async fn run(&self) -> Result<RunReport, StorageError> {
        let run_id = Uuid::new_v4();
        let documents = self.pending().await?;
        info!(
            run_id = %run_id,
            count = documents.len(),
            planner = self.protocol.planner_name(),
            backend = self.storage.name(),
            "Starting archive run"
        );

        let mut report = RunReport::default();
        for document in documents {
            let outcome = self.process_document(run_id, document).await;
            report.outcomes.push(outcome);
        }

        info!(
            run_id = %run_id,
            archived = report.count(DocumentState::Archived),
            review = report.count(DocumentState::Review),
            unclassified = report.count(DocumentState::Unclassified),
            failed = report.count(DocumentState::Failed),
            "Archive run complete"
        );
        Ok(report)
    }

    /// Classify and archive a single document.
    pub async fn process_document(&self, run_id: Uuid, document: DocumentRef) -> ArchiveOutcome {
        let ctx = DocumentContext::new(run_id, document);
        info!(file_id = %ctx.file_id(), name = %ctx.document.name, "Processing document");

        let classified = self.classify(&ctx.document).await;
        if let Err(ref e) = classified {
            warn!(file_id = %ctx.file_id(), error = %e, "Classification failed");
        }

        let outcome = self.protocol.process(&ctx, classified).await;
        if outcome.state == DocumentState::Failed {
            error!(file_id = %ctx.file_id(), name = %ctx.document.name, "Document left in place");
        } else {
            info!(
                file_id = %ctx.file_id(),
                state = %outcome.state,
                actions = outcome.executed.len(),
                "Document done"
            );
        }
        outcome
    }

    /// Classify and plan every pending document. Only reads from storage.
    pub async fn dry_plan(&self) -> Result<Vec<PlannedDocument>, StorageError> {
        let run_id = Uuid::new_v4();
        let mut planned = Vec::new();
        for document in self.pending().await? {
            let ctx = DocumentContext::new(run_id, document.clone());
            let plan = match self.classify(&document).await {
                Err(e) => Err(format!("classification failed: {e}")),
                Ok(c) => match c.error() {
                    Some(err) => Err(format!("classification failed: {err}")),
                    None => self.protocol.plan(&ctx, &c).await.map_err(|e| e.to_string()),
                },
            };
            planned.push(PlannedDocument { document, plan });
        }
        Ok(planned)
    }

    /// Download into a scratch directory removed on return, then classify.
    async fn classify(
        &self,
        document: &DocumentRef,
    ) -> Result<ClassificationResult, ClassificationError> {
        let bytes = self.storage.download_file(&document.id).await?;

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("archive-");
            builder
        };
        let scratch = match self.scratch_dir {
            Some(ref dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        let mut file_name = sanitize_filename(&document.name);
        if file_name.is_empty() {
            file_name = format!("{}.pdf", sanitize_filename(&document.id));
        }
        let path = scratch.path().join(file_name);
        tokio::fs::write(&path, &bytes).await?;

        self.classifier.classify(&path).await
    }
}
