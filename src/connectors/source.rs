//! Source connector for the cloud storage provider
//!
//! Reads file metadata and content from the storage API given a file id
//! and a bearer token.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::MediaSource;
use crate::config::PlatformConfig;
use crate::errors::JobError;

/// Metadata plus raw bytes of a file fetched from cloud storage.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[derive(Clone)]
pub struct StorageConnector {
    client: Client,
    config: PlatformConfig,
}

impl StorageConnector {
    pub fn new(client: Client, config: PlatformConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_metadata(&self, file_id: &str, token: &str) -> Result<FileMetadata, JobError> {
        let url = format!(
            "{}/files/{}?fields=id,name,mimeType",
            self.config.storage_api_base, file_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| JobError::source_fetch(format!("metadata request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(JobError::source_fetch(format!(
                "file {file_id} not found in storage"
            )));
        }

        if !response.status().is_success() {
            return Err(JobError::source_fetch(format!(
                "metadata request returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<FileMetadata>()
            .await
            .map_err(|e| JobError::source_fetch(format!("malformed metadata response: {e}")))
    }
}

#[async_trait]
impl MediaSource for StorageConnector {
    /// Fetch metadata and content for a stored file.
    async fn fetch_file(&self, file_id: &str, token: &str) -> Result<SourceFile, JobError> {
        let metadata = self.fetch_metadata(file_id, token).await?;

        debug!(
            "Downloading source file '{}' ({}) from storage",
            metadata.name, metadata.id
        );

        let url = format!(
            "{}/files/{}?alt=media",
            self.config.storage_api_base, file_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| JobError::source_fetch(format!("content request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(JobError::source_fetch(format!(
                "content request returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| JobError::source_fetch(format!("content read failed: {e}")))?;

        info!(
            "Fetched source file '{}' ({} bytes) from storage",
            metadata.name,
            bytes.len()
        );

        Ok(SourceFile {
            id: metadata.id,
            name: metadata.name,
            mime_type: metadata.mime_type,
            bytes: bytes.to_vec(),
        })
    }
}
