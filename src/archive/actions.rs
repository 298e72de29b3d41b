//! Action primitives — the four storage mutations an archive decision can make.
//!
//! Every relocation is a single `update_file` call that adds the destination
//! parent and removes all others, so a file is never left in two places and
//! re-running a primitive converges on the same end state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::folders::FolderIndex;
use crate::archive::types::{ArchiveAction, ArchiveRoot, ArchiveRoots, FolderPath};
use crate::error::{ArchiveError, StorageError};
use crate::storage::{FileUpdate, StorageBackend};

const NOTE_MIME_TYPE: &str = "text/plain";

/// Where a file (or its copy) ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub file_id: String,
    pub folder_id: String,
    pub name: String,
    pub root: ArchiveRoot,
}

/// Companion note name: `invoice.pdf` → `invoice_results.txt`.
pub fn note_name(file_name: &str) -> String {
    let base = match file_name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => file_name,
    };
    format!("{base}_results.txt")
}

/// Companion note body: classification payload, then the reason.
pub fn note_body(payload: &str, reason: &str) -> String {
    format!("{payload}\n\nReason for unclassified: {reason}\n")
}

/// Executes [`ArchiveAction`]s against storage.
pub struct ActionExecutor {
    storage: Arc<dyn StorageBackend>,
    folders: FolderIndex,
    roots: ArchiveRoots,
}

impl ActionExecutor {
    pub fn new(storage: Arc<dyn StorageBackend>, roots: ArchiveRoots) -> Self {
        let folders = FolderIndex::new(Arc::clone(&storage));
        Self {
            storage,
            folders,
            roots,
        }
    }

    pub fn roots(&self) -> &ArchiveRoots {
        &self.roots
    }

    pub fn folders(&self) -> &FolderIndex {
        &self.folders
    }

    /// Dispatch one action. `payload` is the classification text written to
    /// the companion note when the action is a move to unclassified.
    pub async fn execute(
        &self,
        file_id: &str,
        action: &ArchiveAction,
        payload: &str,
    ) -> Result<Placement, ArchiveError> {
        let placement = match action {
            ArchiveAction::MoveTo { path, new_name } => {
                self.move_to_folder(file_id, path, new_name.as_deref()).await?
            }
            ArchiveAction::CopyTo { path, new_name } => {
                self.copy_to_folder(file_id, path, new_name.as_deref()).await?
            }
            ArchiveAction::MoveToReview { path, new_name } => {
                self.move_to_review(file_id, path, new_name.as_deref()).await?
            }
            ArchiveAction::MoveToUnclassified { reason } => {
                self.move_to_unclassified(file_id, payload, reason).await?
            }
        };
        Ok(placement)
    }

    /// Move into the archive tree, optionally renaming.
    pub async fn move_to_folder(
        &self,
        file_id: &str,
        path: &FolderPath,
        new_name: Option<&str>,
    ) -> Result<Placement, StorageError> {
        self.relocate(file_id, ArchiveRoot::Archive, path, new_name)
            .await
    }

    /// Move into the review staging area, optionally renaming.
    pub async fn move_to_review(
        &self,
        file_id: &str,
        path: &FolderPath,
        new_name: Option<&str>,
    ) -> Result<Placement, StorageError> {
        self.relocate(file_id, ArchiveRoot::Review, path, new_name)
            .await
    }

    /// Copy into the archive tree. The original stays where it is.
    pub async fn copy_to_folder(
        &self,
        file_id: &str,
        path: &FolderPath,
        new_name: Option<&str>,
    ) -> Result<Placement, StorageError> {
        let folder_id = self
            .folders
            .resolve_or_create(&self.roots.archive, path)
            .await?;

        let name = match new_name {
            Some(name) => name.to_string(),
            None => self.storage.get_file(file_id).await?.name,
        };

        let copy_id = self.storage.copy_file(file_id, &name, &folder_id).await?;
        info!(
            file_id = %file_id,
            copy_id = %copy_id,
            path = %path,
            name = %name,
            "Copied document"
        );

        Ok(Placement {
            file_id: copy_id,
            folder_id,
            name,
            root: ArchiveRoot::Archive,
        })
    }

    /// Move to the fixed unclassified folder and leave a note next to it.
    ///
    /// Only the move can fail this primitive; a failed note is logged.
    pub async fn move_to_unclassified(
        &self,
        file_id: &str,
        payload: &str,
        reason: &str,
    ) -> Result<Placement, StorageError> {
        let folder_id = self.roots.unclassified.clone();
        let placement = self
            .reparent(file_id, &folder_id, None, ArchiveRoot::Unclassified)
            .await?;

        let note = note_name(&placement.name);
        match self
            .storage
            .upload_file(
                &note,
                &folder_id,
                NOTE_MIME_TYPE,
                note_body(payload, reason).into_bytes(),
            )
            .await
        {
            Ok(note_id) => {
                info!(file_id = %file_id, note_id = %note_id, reason = %reason, "Moved document to unclassified");
            }
            Err(e) => {
                warn!(
                    file_id = %file_id,
                    note = %note,
                    error = %e,
                    "Moved document to unclassified but could not write note"
                );
            }
        }

        Ok(placement)
    }

    async fn relocate(
        &self,
        file_id: &str,
        root: ArchiveRoot,
        path: &FolderPath,
        new_name: Option<&str>,
    ) -> Result<Placement, StorageError> {
        let folder_id = self
            .folders
            .resolve_or_create(self.roots.id_of(root), path)
            .await?;
        let placement = self.reparent(file_id, &folder_id, new_name, root).await?;
        info!(
            file_id = %file_id,
            root = ?root,
            path = %path,
            name = %placement.name,
            "Moved document"
        );
        Ok(placement)
    }

    /// One atomic update: rename, add `folder_id`, drop every other parent.
    async fn reparent(
        &self,
        file_id: &str,
        folder_id: &str,
        new_name: Option<&str>,
        root: ArchiveRoot,
    ) -> Result<Placement, StorageError> {
        let current = self.storage.get_file(file_id).await?;
        let name = new_name.map(str::to_string).unwrap_or(current.name);

        let update = FileUpdate {
            name: Some(name.clone()),
            add_parents: vec![folder_id.to_string()],
            remove_parents: current
                .parents
                .into_iter()
                .filter(|p| p != folder_id)
                .collect(),
        };
        self.storage.update_file(file_id, &update).await?;

        Ok(Placement {
            file_id: file_id.to_string(),
            folder_id: folder_id.to_string(),
            name,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PDF_MIME_TYPE;
    use crate::storage::memory::{MEMORY_ROOT_ID, MemoryStorage, Operation, RecordedOp};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        executor: ActionExecutor,
        roots: ArchiveRoots,
        file: String,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let drop = storage.add_folder("Drop", MEMORY_ROOT_ID).await;
        let review = storage.add_folder("Review", MEMORY_ROOT_ID).await;
        let unclassified = storage.add_folder("Unclassified", MEMORY_ROOT_ID).await;
        let file = storage
            .add_file("scan_001.pdf", &drop, PDF_MIME_TYPE, b"%PDF")
            .await;
        let roots = ArchiveRoots {
            archive: MEMORY_ROOT_ID.to_string(),
            review,
            unclassified,
            drop,
        };
        let executor = ActionExecutor::new(storage.clone(), roots.clone());
        Fixture {
            storage,
            executor,
            roots,
            file,
        }
    }

    fn path(raw: &str) -> FolderPath {
        FolderPath::parse(raw).unwrap()
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name("scan_001.pdf"), "scan_001_results.txt");
        assert_eq!(note_name("archive.tar.gz"), "archive.tar_results.txt");
        assert_eq!(note_name("README"), "README_results.txt");
        assert_eq!(note_name(".hidden"), ".hidden_results.txt");
    }

    #[tokio::test]
    async fn move_renames_and_leaves_single_parent() {
        let fx = fixture().await;
        let placement = fx
            .executor
            .move_to_folder(&fx.file, &path("2024/2024-01/Banking"), Some("new.pdf"))
            .await
            .unwrap();

        let meta = fx.storage.file(&fx.file).await.unwrap();
        assert_eq!(meta.parents, vec![placement.folder_id.clone()]);
        assert_eq!(meta.name, "new.pdf");
        assert_eq!(
            fx.storage
                .find_path(MEMORY_ROOT_ID, "2024/2024-01/Banking")
                .await,
            Some(placement.folder_id)
        );
    }

    #[tokio::test]
    async fn move_without_name_keeps_name() {
        let fx = fixture().await;
        fx.executor
            .move_to_review(&fx.file, &path("2024/2024-01"), None)
            .await
            .unwrap();

        let meta = fx.storage.file(&fx.file).await.unwrap();
        assert_eq!(meta.name, "scan_001.pdf");
        assert_eq!(
            Some(meta.parents[0].clone()),
            fx.storage.find_path(&fx.roots.review, "2024/2024-01").await
        );
    }

    #[tokio::test]
    async fn repeated_move_reaches_same_state() {
        let fx = fixture().await;
        let target = path("2024/2024-02/Taxes");
        let first = fx
            .executor
            .move_to_folder(&fx.file, &target, Some("t.pdf"))
            .await
            .unwrap();
        let second = fx
            .executor
            .move_to_folder(&fx.file, &target, Some("t.pdf"))
            .await
            .unwrap();

        assert_eq!(first, second);
        let meta = fx.storage.file(&fx.file).await.unwrap();
        assert_eq!(meta.parents, vec![first.folder_id]);
    }

    #[tokio::test]
    async fn copy_leaves_original() {
        let fx = fixture().await;
        let placement = fx
            .executor
            .copy_to_folder(&fx.file, &path("2024/2024-03/Taxes"), Some("c.pdf"))
            .await
            .unwrap();

        assert_ne!(placement.file_id, fx.file);
        assert_eq!(
            fx.storage.file(&fx.file).await.unwrap().parents,
            vec![fx.roots.drop.clone()]
        );
        assert_eq!(
            fx.storage.file(&placement.file_id).await.unwrap().name,
            "c.pdf"
        );
    }

    #[tokio::test]
    async fn unclassified_writes_note() {
        let fx = fixture().await;
        fx.executor
            .move_to_unclassified(&fx.file, "document_group: OTHER", "not ours")
            .await
            .unwrap();

        let children = fx.storage.children(&fx.roots.unclassified).await;
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["scan_001.pdf", "scan_001_results.txt"]);

        let note = children.iter().find(|c| c.name.ends_with(".txt")).unwrap();
        let body = String::from_utf8(fx.storage.content(&note.id).await.unwrap()).unwrap();
        assert!(body.starts_with("document_group: OTHER"));
        assert!(body.contains("Reason for unclassified: not ours"));
    }

    #[tokio::test]
    async fn unclassified_does_not_resolve_paths() {
        let fx = fixture().await;
        fx.executor
            .move_to_unclassified(&fx.file, "", "x")
            .await
            .unwrap();
        let ops = fx.storage.ops().await;
        assert!(!ops.iter().any(|op| matches!(
            op,
            RecordedOp::List { .. } | RecordedOp::CreateFolder { .. }
        )));
    }

    #[tokio::test]
    async fn note_failure_is_not_fatal() {
        let fx = fixture().await;
        fx.storage.fail_next(Operation::UploadFile, 1).await;

        let placement = fx
            .executor
            .move_to_unclassified(&fx.file, "payload", "reason")
            .await
            .unwrap();
        assert_eq!(placement.folder_id, fx.roots.unclassified);
    }

    #[tokio::test]
    async fn move_failure_is_reported() {
        let fx = fixture().await;
        fx.storage.fail_next(Operation::UpdateFile, 1).await;

        let result = fx
            .executor
            .execute(
                &fx.file,
                &ArchiveAction::unclassified("reason"),
                "payload",
            )
            .await;
        assert!(matches!(result, Err(ArchiveError::Storage(_))));
        assert_eq!(
            fx.storage.file(&fx.file).await.unwrap().parents,
            vec![fx.roots.drop.clone()]
        );
    }
}
