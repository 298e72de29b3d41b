//! Folder index — resolves folder paths to ids, creating missing segments.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::archive::types::FolderPath;
use crate::error::StorageError;
use crate::storage::{ChildFilter, StorageBackend};

/// Idempotent path → folder-id resolver with a per-run cache.
///
/// The cache lock is held across lookup and creation, so two callers in
/// this process never create the same sibling twice.
pub struct FolderIndex {
    storage: Arc<dyn StorageBackend>,
    /// `(parent_id, name)` → folder id.
    cache: Mutex<HashMap<(String, String), String>>,
}

impl FolderIndex {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `path` under `root_id`, creating any missing folder.
    ///
    /// The empty path resolves to `root_id` without touching storage.
    pub async fn resolve_or_create(
        &self,
        root_id: &str,
        path: &FolderPath,
    ) -> Result<String, StorageError> {
        let mut cache = self.cache.lock().await;
        let mut parent = root_id.to_string();
        for segment in path.segments() {
            parent = self.child_locked(&mut cache, &parent, segment).await?;
        }
        debug!(root = %root_id, path = %path, folder_id = %parent, "Resolved folder path");
        Ok(parent)
    }

    /// Find or create a single folder directly under `parent_id`.
    pub async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String, StorageError> {
        let mut cache = self.cache.lock().await;
        self.child_locked(&mut cache, parent_id, name).await
    }

    /// Number of cached `(parent, name)` pairs.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn child_locked(
        &self,
        cache: &mut HashMap<(String, String), String>,
        parent_id: &str,
        name: &str,
    ) -> Result<String, StorageError> {
        let key = (parent_id.to_string(), name.to_string());
        if let Some(id) = cache.get(&key) {
            return Ok(id.clone());
        }

        let existing = self
            .storage
            .list_children(parent_id, &ChildFilter::folder_named(name))
            .await?;

        // Backends may match names loosely; only an exact folder match counts.
        let id = match existing
            .into_iter()
            .find(|entry| entry.is_folder() && entry.name == name)
        {
            Some(entry) => entry.id,
            None => {
                let id = self.storage.create_folder(name, parent_id).await?;
                info!(parent = %parent_id, name = %name, folder_id = %id, "Created folder");
                id
            }
        };

        cache.insert(key, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MEMORY_ROOT_ID, MemoryStorage, Operation, RecordedOp};

    fn setup() -> (Arc<MemoryStorage>, FolderIndex) {
        let storage = Arc::new(MemoryStorage::new());
        let index = FolderIndex::new(storage.clone());
        (storage, index)
    }

    fn created(ops: &[RecordedOp]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, RecordedOp::CreateFolder { .. }))
            .count()
    }

    #[tokio::test]
    async fn creates_missing_segments() {
        let (storage, index) = setup();
        let path = FolderPath::parse("2024/2024-01/Taxes").unwrap();

        let id = index.resolve_or_create(MEMORY_ROOT_ID, &path).await.unwrap();

        assert_eq!(
            storage.find_path(MEMORY_ROOT_ID, "2024/2024-01/Taxes").await,
            Some(id)
        );
        assert_eq!(created(&storage.ops().await), 3);
    }

    #[tokio::test]
    async fn resolving_twice_yields_same_id_without_duplicates() {
        let (storage, index) = setup();
        let path = FolderPath::parse("2024/2024-01").unwrap();

        let first = index.resolve_or_create(MEMORY_ROOT_ID, &path).await.unwrap();
        let second = index.resolve_or_create(MEMORY_ROOT_ID, &path).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(created(&storage.ops().await), 2);
        assert_eq!(storage.children(MEMORY_ROOT_ID).await.len(), 1);
    }

    #[tokio::test]
    async fn fresh_index_reuses_existing_folders() {
        let storage = Arc::new(MemoryStorage::new());
        let year = storage.add_folder("2024", MEMORY_ROOT_ID).await;
        let month = storage.add_folder("2024-01", &year).await;

        let index = FolderIndex::new(storage.clone());
        let id = index
            .resolve_or_create(MEMORY_ROOT_ID, &FolderPath::parse("2024/2024-01").unwrap())
            .await
            .unwrap();

        assert_eq!(id, month);
        assert_eq!(created(&storage.ops().await), 0);
    }

    #[tokio::test]
    async fn first_existing_match_wins() {
        let storage = Arc::new(MemoryStorage::new());
        let first = storage.add_folder("Banking", MEMORY_ROOT_ID).await;
        storage.add_folder("Banking", MEMORY_ROOT_ID).await;

        let index = FolderIndex::new(storage.clone());
        let id = index.ensure_folder(MEMORY_ROOT_ID, "Banking").await.unwrap();
        assert_eq!(id, first);
    }

    #[tokio::test]
    async fn root_path_touches_nothing() {
        let (storage, index) = setup();
        let id = index
            .resolve_or_create("review-root", &FolderPath::root())
            .await
            .unwrap();
        assert_eq!(id, "review-root");
        assert!(storage.ops().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolution_creates_once() {
        let (storage, index) = setup();
        let index = Arc::new(index);
        let path = FolderPath::parse("2024/2024-06/Banking").unwrap();

        let a = {
            let index = index.clone();
            let path = path.clone();
            tokio::spawn(async move { index.resolve_or_create(MEMORY_ROOT_ID, &path).await })
        };
        let b = {
            let index = index.clone();
            let path = path.clone();
            tokio::spawn(async move { index.resolve_or_create(MEMORY_ROOT_ID, &path).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(created(&storage.ops().await), 3);
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced_and_not_cached() {
        let (storage, index) = setup();
        storage.fail_next(Operation::List, 1).await;
        let path = FolderPath::parse("2024").unwrap();

        assert!(index.resolve_or_create(MEMORY_ROOT_ID, &path).await.is_err());
        assert_eq!(index.cached().await, 0);
        assert!(index.resolve_or_create(MEMORY_ROOT_ID, &path).await.is_ok());
    }
}
