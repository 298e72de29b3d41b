//! In-process storage backend.
//!
//! Keeps a folder/file tree in memory, records every call in an operation
//! log and can be told to fail the next N calls of a given operation.
//! Used by the test suites and by dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::storage::traits::{
    ChildFilter, FOLDER_MIME_TYPE, FileMetadata, FileUpdate, StorageBackend, StorageEntry,
};

/// Id of the folder every `MemoryStorage` starts with.
pub const MEMORY_ROOT_ID: &str = "root";

/// Backend operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    CreateFolder,
    GetFile,
    UpdateFile,
    CopyFile,
    UploadFile,
    DownloadFile,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    List {
        parent: String,
    },
    Get {
        file_id: String,
    },
    Download {
        file_id: String,
    },
    CreateFolder {
        id: String,
        name: String,
        parent: String,
    },
    Update {
        file_id: String,
        name: Option<String>,
        add_parents: Vec<String>,
        remove_parents: Vec<String>,
    },
    Copy {
        source: String,
        new_id: String,
        name: String,
        parent: String,
        /// Where the source lived when it was copied.
        source_parents: Vec<String>,
    },
    Upload {
        id: String,
        name: String,
        parent: String,
        mime_type: String,
    },
}

impl RecordedOp {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::List { .. } | Self::Get { .. } | Self::Download { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    mime_type: String,
    parents: Vec<String>,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    next_id: u64,
    log: Vec<RecordedOp>,
    failures: HashMap<Operation, usize>,
}

impl State {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn take_failure(&mut self, op: Operation) -> Result<(), StorageError> {
        if let Some(remaining) = self.failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StorageError::request(
                &format!("{op:?}"),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn require_folder(&self, id: &str) -> Result<(), StorageError> {
        match self.nodes.get(id) {
            Some(node) if node.mime_type == FOLDER_MIME_TYPE => Ok(()),
            _ => Err(StorageError::NotFound {
                kind: "Folder".to_string(),
                id: id.to_string(),
            }),
        }
    }

    fn metadata(&self, id: &str) -> Result<FileMetadata, StorageError> {
        self.nodes
            .get(id)
            .map(|node| FileMetadata {
                id: id.to_string(),
                name: node.name.clone(),
                mime_type: node.mime_type.clone(),
                parents: node.parents.clone(),
            })
            .ok_or_else(|| StorageError::NotFound {
                kind: "File".to_string(),
                id: id.to_string(),
            })
    }

    fn insert(&mut self, prefix: &str, node: Node) -> String {
        let id = self.allocate(prefix);
        self.nodes.insert(id.clone(), node);
        id
    }
}

/// In-memory [`StorageBackend`].
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    /// Create a store holding only the root folder.
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            MEMORY_ROOT_ID.to_string(),
            Node {
                name: "My Drive".to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                parents: Vec::new(),
                content: Vec::new(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn root_id(&self) -> &str {
        MEMORY_ROOT_ID
    }

    /// Seed a folder without recording it.
    pub async fn add_folder(&self, name: &str, parent_id: &str) -> String {
        let mut state = self.state.lock().await;
        state.insert(
            "folder",
            Node {
                name: name.to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                parents: vec![parent_id.to_string()],
                content: Vec::new(),
            },
        )
    }

    /// Seed a file without recording it.
    pub async fn add_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        content: &[u8],
    ) -> String {
        let mut state = self.state.lock().await;
        state.insert(
            "file",
            Node {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                parents: vec![parent_id.to_string()],
                content: content.to_vec(),
            },
        )
    }

    /// Make the next `times` calls of `op` fail.
    pub async fn fail_next(&self, op: Operation, times: usize) {
        self.state.lock().await.failures.insert(op, times);
    }

    /// Every recorded call, oldest first.
    pub async fn ops(&self) -> Vec<RecordedOp> {
        self.state.lock().await.log.clone()
    }

    /// Recorded calls that changed the tree.
    pub async fn mutations(&self) -> Vec<RecordedOp> {
        self.ops()
            .await
            .into_iter()
            .filter(RecordedOp::is_mutation)
            .collect()
    }

    pub async fn file(&self, id: &str) -> Option<FileMetadata> {
        self.state.lock().await.metadata(id).ok()
    }

    pub async fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .nodes
            .get(id)
            .map(|node| node.content.clone())
    }

    /// All children of a folder, in creation order.
    pub async fn children(&self, parent_id: &str) -> Vec<StorageEntry> {
        let state = self.state.lock().await;
        state
            .nodes
            .iter()
            .filter(|(_, node)| node.parents.iter().any(|p| p == parent_id))
            .map(|(id, node)| StorageEntry {
                id: id.clone(),
                name: node.name.clone(),
                mime_type: node.mime_type.clone(),
            })
            .collect()
    }

    /// Walk `a/b/c` from `root_id` by folder name, first match per level.
    pub async fn find_path(&self, root_id: &str, path: &str) -> Option<String> {
        let mut current = root_id.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let next = self
                .children(&current)
                .await
                .into_iter()
                .find(|entry| entry.is_folder() && entry.name == segment)?;
            current = next.id;
        }
        Some(current)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ChildFilter,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        let mut state = self.state.lock().await;
        state.log.push(RecordedOp::List {
            parent: parent_id.to_string(),
        });
        state.take_failure(Operation::List)?;
        state.require_folder(parent_id)?;

        Ok(state
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.parents.iter().any(|p| p == parent_id)
                    && filter.matches(&node.name, &node.mime_type)
            })
            .map(|(id, node)| StorageEntry {
                id: id.clone(),
                name: node.name.clone(),
                mime_type: node.mime_type.clone(),
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::CreateFolder)?;
        state.require_folder(parent_id)?;

        let id = state.insert(
            "folder",
            Node {
                name: name.to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                parents: vec![parent_id.to_string()],
                content: Vec::new(),
            },
        );
        state.log.push(RecordedOp::CreateFolder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
        });
        Ok(id)
    }

    async fn get_file(&self, file_id: &str) -> Result<FileMetadata, StorageError> {
        let mut state = self.state.lock().await;
        state.log.push(RecordedOp::Get {
            file_id: file_id.to_string(),
        });
        state.take_failure(Operation::GetFile)?;
        state.metadata(file_id)
    }

    async fn update_file(
        &self,
        file_id: &str,
        update: &FileUpdate,
    ) -> Result<FileMetadata, StorageError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::UpdateFile)?;
        state.metadata(file_id)?;
        for parent in &update.add_parents {
            state.require_folder(parent)?;
        }

        if let Some(node) = state.nodes.get_mut(file_id) {
            node.parents.retain(|p| !update.remove_parents.contains(p));
            for parent in &update.add_parents {
                if !node.parents.contains(parent) {
                    node.parents.push(parent.clone());
                }
            }
            if let Some(ref name) = update.name {
                node.name = name.clone();
            }
        }

        state.log.push(RecordedOp::Update {
            file_id: file_id.to_string(),
            name: update.name.clone(),
            add_parents: update.add_parents.clone(),
            remove_parents: update.remove_parents.clone(),
        });
        state.metadata(file_id)
    }

    async fn copy_file(
        &self,
        file_id: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, StorageError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::CopyFile)?;
        state.require_folder(parent_id)?;
        let source = state.nodes.get(file_id).cloned().ok_or_else(|| {
            StorageError::NotFound {
                kind: "File".to_string(),
                id: file_id.to_string(),
            }
        })?;

        let new_id = state.insert(
            "file",
            Node {
                name: name.to_string(),
                mime_type: source.mime_type.clone(),
                parents: vec![parent_id.to_string()],
                content: source.content.clone(),
            },
        );
        state.log.push(RecordedOp::Copy {
            source: file_id.to_string(),
            new_id: new_id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
            source_parents: source.parents,
        });
        Ok(new_id)
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StorageError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::UploadFile)?;
        state.require_folder(parent_id)?;

        let id = state.insert(
            "file",
            Node {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                parents: vec![parent_id.to_string()],
                content,
            },
        );
        state.log.push(RecordedOp::Upload {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.to_string(),
            mime_type: mime_type.to_string(),
        });
        Ok(id)
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let mut state = self.state.lock().await;
        state.log.push(RecordedOp::Download {
            file_id: file_id.to_string(),
        });
        state.take_failure(Operation::DownloadFile)?;
        state
            .nodes
            .get(file_id)
            .map(|node| node.content.clone())
            .ok_or_else(|| StorageError::NotFound {
                kind: "File".to_string(),
                id: file_id.to_string(),
            })
    }
}
