//! Google Drive v3 REST backend.
//!
//! Thin `reqwest` client over the `files` resource. Authentication is a
//! bearer access token obtained outside this crate.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::StorageError;
use crate::storage::traits::{
    ChildFilter, FOLDER_MIME_TYPE, FileMetadata, FileUpdate, StorageBackend, StorageEntry,
};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FILE_FIELDS: &str = "id,name,mimeType,parents";
const UPLOAD_BOUNDARY: &str = "agentic_archive_upload_boundary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build the `q` parameter for a child listing.
fn child_query(parent_id: &str, filter: &ChildFilter) -> String {
    let mut clauses = vec![
        format!("'{}' in parents", escape_query(parent_id)),
        "trashed = false".to_string(),
    ];
    if let Some(ref mime_type) = filter.mime_type {
        clauses.push(format!("mimeType = '{}'", escape_query(mime_type)));
    }
    if let Some(ref name) = filter.name {
        clauses.push(format!("name = '{}'", escape_query(name)));
    }
    clauses.join(" and ")
}

/// Drive-backed [`StorageBackend`].
pub struct DriveStorage {
    client: Client,
    token: SecretString,
    api_base: String,
    upload_base: String,
}

impl DriveStorage {
    pub fn new(token: SecretString) -> Self {
        Self {
            client: Client::new(),
            token,
            api_base: DRIVE_API.to_string(),
            upload_base: DRIVE_UPLOAD_API.to_string(),
        }
    }

    /// Point at a different API host (proxies, emulators).
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(self.token.expose_secret())
            .query(&[("supportsAllDrives", "true")])
    }

    async fn send(operation: &str, builder: RequestBuilder) -> Result<Response, StorageError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StorageError::request(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(response)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, StorageError> {
        Self::send(operation, builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StorageError::malformed(operation, e))
    }
}

fn into_metadata(operation: &str, file: DriveFile) -> Result<FileMetadata, StorageError> {
    Ok(FileMetadata {
        id: file
            .id
            .ok_or_else(|| StorageError::malformed(operation, "file without id"))?,
        name: file.name.unwrap_or_default(),
        mime_type: file.mime_type.unwrap_or_default(),
        parents: file.parents,
    })
}

#[async_trait]
impl StorageBackend for DriveStorage {
    fn name(&self) -> &str {
        "drive"
    }

    async fn list_children(
        &self,
        parent_id: &str,
        filter: &ChildFilter,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        let query = child_query(parent_id, filter);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .authorized(self.client.get(format!("{}/files", self.api_base)))
                .query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("includeItemsFromAllDrives", "true"),
                    ("fields", "nextPageToken, files(id, name, mimeType)"),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = Self::send_json("files.list", request).await?;
            for file in page.files {
                let Some(id) = file.id else {
                    return Err(StorageError::malformed("files.list", "entry without id"));
                };
                entries.push(StorageEntry {
                    id,
                    name: file.name.unwrap_or_default(),
                    mime_type: file.mime_type.unwrap_or_default(),
                });
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(parent = %parent_id, count = entries.len(), "Listed children");
        Ok(entries)
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError> {
        let request = self
            .authorized(self.client.post(format!("{}/files", self.api_base)))
            .query(&[("fields", "id")])
            .json(&serde_json::json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }));

        let file: DriveFile = Self::send_json("files.create", request).await?;
        file.id
            .ok_or_else(|| StorageError::malformed("files.create", "folder without id"))
    }

    async fn get_file(&self, file_id: &str) -> Result<FileMetadata, StorageError> {
        let request = self
            .authorized(
                self.client
                    .get(format!("{}/files/{}", self.api_base, file_id)),
            )
            .query(&[("fields", FILE_FIELDS)]);

        let file: DriveFile = Self::send_json("files.get", request).await?;
        into_metadata("files.get", file)
    }

    async fn update_file(
        &self,
        file_id: &str,
        update: &FileUpdate,
    ) -> Result<FileMetadata, StorageError> {
        let mut body = serde_json::Map::new();
        if let Some(ref name) = update.name {
            body.insert("name".into(), serde_json::Value::String(name.clone()));
        }

        let add = update.add_parents.join(",");
        let remove = update.remove_parents.join(",");
        let mut params = vec![("fields", FILE_FIELDS)];
        if !add.is_empty() {
            params.push(("addParents", add.as_str()));
        }
        if !remove.is_empty() {
            params.push(("removeParents", remove.as_str()));
        }

        let request = self
            .authorized(
                self.client
                    .patch(format!("{}/files/{}", self.api_base, file_id)),
            )
            .query(&params)
            .json(&serde_json::Value::Object(body));

        let file: DriveFile = Self::send_json("files.update", request).await?;
        into_metadata("files.update", file)
    }

    async fn copy_file(
        &self,
        file_id: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, StorageError> {
        let request = self
            .authorized(
                self.client
                    .post(format!("{}/files/{}/copy", self.api_base, file_id)),
            )
            .query(&[("fields", "id")])
            .json(&serde_json::json!({
                "name": name,
                "parents": [parent_id],
            }));

        let file: DriveFile = Self::send_json("files.copy", request).await?;
        file.id
            .ok_or_else(|| StorageError::malformed("files.copy", "copy without id"))
    }

    async fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, StorageError> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
            "mimeType": mime_type,
        });

        // Drive wants multipart/related: JSON metadata part, then the media part.
        let mut body = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(
            format!(
                "--{UPLOAD_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{UPLOAD_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&content);
        body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}--\r\n").as_bytes());

        let request = self
            .authorized(self.client.post(format!("{}/files", self.upload_base)))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(body);

        let file: DriveFile = Self::send_json("files.upload", request).await?;
        file.id
            .ok_or_else(|| StorageError::malformed("files.upload", "upload without id"))
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let request = self
            .authorized(
                self.client
                    .get(format!("{}/files/{}", self.api_base, file_id)),
            )
            .query(&[("alt", "media")]);

        let bytes = Self::send("files.download", request)
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::request("files.download", e))?;
        Ok(bytes.to_vec())
    }
}
