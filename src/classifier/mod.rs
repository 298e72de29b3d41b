//! Document classification — turns a PDF into structured metadata.
//!
//! The classifier itself is an external service; this module only defines
//! the seam and an HTTP client for it.

mod http;

pub use http::HttpClassifier;

use std::path::Path;

use async_trait::async_trait;

use crate::archive::types::ClassificationResult;
use crate::error::ClassificationError;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a local copy of a document.
    ///
    /// A result whose `error` field is set is still `Ok`: the service ran
    /// and reported that it could not classify.
    async fn classify(&self, path: &Path) -> Result<ClassificationResult, ClassificationError>;
}
