//! Destination connector for the hosting platform and storage sink
//!
//! Publishes media with metadata to the video platform, and stores
//! downloaded queue media back into cloud storage. Also performs the
//! dedupe lookup against storage before a queue job downloads anything.

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::MediaDestination;
use crate::config::PlatformConfig;
use crate::errors::JobError;

/// A video created on the hosting platform.
#[derive(Debug, Clone)]
pub struct PublishedVideo {
    pub asset_id: String,
    pub url: String,
}

/// A file stored (or found) in cloud storage.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub asset_id: String,
    pub url: String,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileListEntry>,
}

#[derive(Debug, Deserialize)]
struct FileListEntry {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
    size: Option<String>,
}

#[derive(Clone)]
pub struct VideoPlatformConnector {
    client: Client,
    config: PlatformConfig,
}

impl VideoPlatformConnector {
    pub fn new(client: Client, config: PlatformConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MediaDestination for VideoPlatformConnector {
    /// Upload media plus metadata to the hosting platform.
    async fn publish_media(
        &self,
        title: &str,
        description: Option<&str>,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<PublishedVideo, JobError> {
        info!("Publishing '{}' ({} bytes) to hosting platform", title, bytes.len());

        let metadata = json!({
            "snippet": {
                "title": title,
                "description": description.unwrap_or(""),
            },
            "status": {
                "privacyStatus": "public",
            },
        });

        let form = multipart::Form::new()
            .part(
                "metadata",
                multipart::Part::text(metadata.to_string()).mime_str("application/json")
                    .map_err(|e| JobError::destination_upload(e.to_string()))?,
            )
            .part(
                "media",
                multipart::Part::bytes(bytes).mime_str("video/mp4")
                    .map_err(|e| JobError::destination_upload(e.to_string()))?,
            );

        let url = format!(
            "{}/videos?uploadType=multipart&part=snippet,status",
            self.config.hosting_api_base
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| JobError::destination_upload(format!("upload request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::destination_upload(format!(
                "upload returned HTTP {status}: {body}"
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| JobError::destination_upload(format!("malformed upload response: {e}")))?;

        let watch_url = format!("{}{}", self.config.watch_url_base, uploaded.id);

        info!("Published video {} -> {}", uploaded.id, watch_url);

        Ok(PublishedVideo {
            asset_id: uploaded.id,
            url: watch_url,
        })
    }

    /// Dedupe lookup: find a file already stored under the given name.
    async fn find_existing(
        &self,
        file_name: &str,
        token: &str,
    ) -> Result<Option<StoredFile>, JobError> {
        let query = format!("name='{}' and trashed=false", file_name.replace('\'', "\\'"));
        let url = format!(
            "{}/files?q={}&fields=files(id,webViewLink,size)",
            self.config.storage_api_base,
            urlencode(&query)
        );

        debug!("Checking storage for existing file '{}'", file_name);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| JobError::destination_upload(format!("dedupe lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(JobError::destination_upload(format!(
                "dedupe lookup returned HTTP {}",
                response.status()
            )));
        }

        let list: FileListResponse = response
            .json()
            .await
            .map_err(|e| JobError::destination_upload(format!("malformed list response: {e}")))?;

        Ok(list.files.into_iter().next().map(|entry| StoredFile {
            url: entry
                .web_view_link
                .unwrap_or_else(|| format!("{}/files/{}", self.config.storage_api_base, entry.id)),
            size: entry.size.and_then(|s| s.parse().ok()),
            asset_id: entry.id,
        }))
    }

    /// Store downloaded media bytes in cloud storage under a file name.
    async fn store_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<StoredFile, JobError> {
        let size = bytes.len() as i64;

        info!("Storing '{}' ({} bytes) in cloud storage", file_name, size);

        let metadata = json!({ "name": file_name });

        let form = multipart::Form::new()
            .part(
                "metadata",
                multipart::Part::text(metadata.to_string()).mime_str("application/json")
                    .map_err(|e| JobError::destination_upload(e.to_string()))?,
            )
            .part(
                "media",
                multipart::Part::bytes(bytes).mime_str("video/mp4")
                    .map_err(|e| JobError::destination_upload(e.to_string()))?,
            );

        let url = format!(
            "{}/files?uploadType=multipart",
            self.config.storage_api_base
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| JobError::destination_upload(format!("store request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::destination_upload(format!(
                "store returned HTTP {status}: {body}"
            )));
        }

        let stored: UploadResponse = response
            .json()
            .await
            .map_err(|e| JobError::destination_upload(format!("malformed store response: {e}")))?;

        Ok(StoredFile {
            url: format!("{}/files/{}", self.config.storage_api_base, stored.id),
            asset_id: stored.id,
            size: Some(size),
        })
    }
}

/// Minimal percent-encoding for the storage list query parameter.
fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
