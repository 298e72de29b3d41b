//! Storage layer — the hierarchical folder/file store documents are archived into.

pub mod drive;
pub mod memory;
pub mod traits;

pub use drive::DriveStorage;
pub use memory::MemoryStorage;
pub use traits::{
    ChildFilter, FOLDER_MIME_TYPE, FileMetadata, FileUpdate, PDF_MIME_TYPE, StorageBackend,
    StorageEntry,
};
