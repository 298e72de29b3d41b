//! Backend-agnostic storage trait for the hierarchical folder/file store.
//!
//! Everything is keyed by opaque string identifiers. Authentication,
//! pagination and transport retries belong to the implementations.

use async_trait::async_trait;

use crate::error::StorageError;

/// Mime type the backend uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Mime type of the documents picked up from the drop folder.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// One child entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl StorageEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Metadata of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

/// Filter for [`StorageBackend::list_children`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildFilter {
    pub mime_type: Option<String>,
    pub name: Option<String>,
}

impl ChildFilter {
    /// Folders with exactly this name.
    pub fn folder_named(name: &str) -> Self {
        Self {
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            name: Some(name.to_string()),
        }
    }

    /// All entries of one mime type.
    pub fn of_type(mime_type: &str) -> Self {
        Self {
            mime_type: Some(mime_type.to_string()),
            name: None,
        }
    }

    pub fn matches(&self, name: &str, mime_type: &str) -> bool {
        self.mime_type.as_deref().is_none_or(|m| m == mime_type)
            && self.name.as_deref().is_none_or(|n| n == name)
    }
}

/// A single atomic metadata update: rename plus parent changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

/// Operations the archiver needs from the storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &str;

    /// List the children of a folder matching `filter`.
    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ChildFilter,
    ) -> Result<Vec<StorageEntry>, StorageError>;

    /// Create a folder and return its id.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError>;

    /// Fetch name, type and current parents of a file.
    async fn get_file(&self, file_id: &str) -> Result<FileMetadata, StorageError>;

    /// Apply a rename / reparent in one call.
    async fn update_file(
        &self,
        file_id: &str,
        update: &FileUpdate,
    ) -> Result<FileMetadata, StorageError>;

    /// Copy a file into `parent_id` under `name`; returns the new file id.
    async fn copy_file(
        &self,
        file_id: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, StorageError>;

    /// Upload bytes as a new file; returns its id.
    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Download the content of a file.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_name_and_type() {
        let filter = ChildFilter::folder_named("2024");
        assert!(filter.matches("2024", FOLDER_MIME_TYPE));
        assert!(!filter.matches("2024", PDF_MIME_TYPE));
        assert!(!filter.matches("2025", FOLDER_MIME_TYPE));
        assert!(ChildFilter::default().matches("anything", "text/plain"));
    }
}
