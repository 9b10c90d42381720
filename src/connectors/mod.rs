//! Connectors to the cloud storage provider and the hosting platform.
//!
//! The processor talks to both through the `MediaSource` and
//! `MediaDestination` traits so the network-facing connectors can be
//! swapped out in tests.

use async_trait::async_trait;

use crate::errors::JobError;

pub mod destination;
pub mod source;

pub use destination::{PublishedVideo, StoredFile, VideoPlatformConnector};
pub use source::{SourceFile, StorageConnector};

/// Read side: file metadata and content from cloud storage.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_file(&self, file_id: &str, token: &str) -> Result<SourceFile, JobError>;
}

/// Write side: the hosting platform upload plus the storage sink used by
/// the ingestion queue, including its dedupe lookup.
#[async_trait]
pub trait MediaDestination: Send + Sync {
    async fn publish_media(
        &self,
        title: &str,
        description: Option<&str>,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<PublishedVideo, JobError>;

    async fn find_existing(
        &self,
        file_name: &str,
        token: &str,
    ) -> Result<Option<StoredFile>, JobError>;

    async fn store_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<StoredFile, JobError>;
}
