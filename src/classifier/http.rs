use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};

use crate::archive::types::ClassificationResult;
use crate::classifier::Classifier;
use crate::error::ClassificationError;
use crate::storage::PDF_MIME_TYPE;

/// Posts the document as multipart form data (`file` field) and reads a
/// JSON classification back.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => ["error", "erro", "detail", "message"]
            .iter()
            .find_map(|key| match json.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.chars().take(500).collect(),
    }
}

/// Parse a successful response body.
fn parse_response(body: &str) -> Result<ClassificationResult, ClassificationError> {
    serde_json::from_str(body).map_err(|e| {
        ClassificationError::Failed(format!("unreadable classifier response: {e}"))
    })
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, path: &Path) -> Result<ClassificationResult, ClassificationError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        debug!(file = %file_name, size = bytes.len(), "Sending document to classifier");

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(PDF_MIME_TYPE)
            .map_err(|e| ClassificationError::Failed(e.to_string()))?;
        let form = Form::new().part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClassificationError::Failed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassificationError::Failed(e.to_string()))?;

        if !status.is_success() {
            return Err(ClassificationError::Rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_message(&body)
            )));
        }

        let result = parse_response(&body)?;
        info!(
            file = %file_name,
            group = %result.document_group,
            document_type = result.document_type().unwrap_or("-"),
            "Document classified"
        );
        Ok(result)
    }
}
