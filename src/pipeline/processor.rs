//! Single-job processor
//!
//! Executes one claimed job end-to-end through the credential resolver,
//! the connectors and the provider chain, then records the outcome on the
//! job row and in the audit log. Every step failure is classified into the
//! `JobError` taxonomy here and never propagates to sibling jobs.

use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use crate::config::{PlatformConfig, ProcessingConfig};
use crate::connectors::{MediaDestination, MediaSource, PublishedVideo, StoredFile};
use crate::credentials::CredentialResolver;
use crate::database::Database;
use crate::errors::JobError;
use crate::models::{JobOutcome, JobStatus, PublishJob, QueueJob};
use crate::providers::{download_media, ProviderChain};
use crate::utils::text::{derive_queue_filename, normalize_title};

pub struct JobProcessor {
    database: Database,
    credentials: CredentialResolver,
    source: Arc<dyn MediaSource>,
    destination: Arc<dyn MediaDestination>,
    chain: Arc<ProviderChain>,
    client: Client,
    platform_config: PlatformConfig,
    processing_config: ProcessingConfig,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database: Database,
        credentials: CredentialResolver,
        source: Arc<dyn MediaSource>,
        destination: Arc<dyn MediaDestination>,
        chain: Arc<ProviderChain>,
        client: Client,
        platform_config: PlatformConfig,
        processing_config: ProcessingConfig,
    ) -> Self {
        Self {
            database,
            credentials,
            source,
            destination,
            chain,
            client,
            platform_config,
            processing_config,
        }
    }

    /// Run a claimed publish job to completion or failure.
    pub async fn process_publish_job(&self, job: &PublishJob) -> JobOutcome {
        info!("Processing publish job {} (owner '{}')", job.id, job.owner);

        match self.run_publish(job).await {
            Ok(published) => {
                if let Err(e) = self
                    .database
                    .complete_publish_job(job.id, &published.asset_id, &published.url)
                    .await
                {
                    error!("Failed to record completion of publish job {}: {}", job.id, e);
                }
                self.append_audit(job.id, &job.owner, Some(&published.url), JobStatus::Completed, None)
                    .await;

                info!("Publish job {} completed: {}", job.id, published.url);
                JobOutcome::completed(job.id)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(db_err) = self.database.fail_publish_job(job.id, &message).await {
                    error!("Failed to record failure of publish job {}: {}", job.id, db_err);
                }
                self.append_audit(job.id, &job.owner, None, JobStatus::Failed, Some(&message))
                    .await;

                error!("Publish job {} failed: {}", job.id, message);
                JobOutcome::failed(job.id, message)
            }
        }
    }

    /// Run a claimed ingestion queue job to completion or failure.
    pub async fn process_queue_job(&self, job: &QueueJob) -> JobOutcome {
        info!("Processing queue job {} (owner '{}')", job.id, job.owner);

        match self.run_queue(job).await {
            Ok(stored) => {
                if let Err(e) = self
                    .database
                    .complete_queue_job(job.id, &stored.asset_id, &stored.url, stored.size)
                    .await
                {
                    error!("Failed to record completion of queue job {}: {}", job.id, e);
                }
                self.append_audit(job.id, &job.owner, Some(&stored.url), JobStatus::Completed, None)
                    .await;

                info!("Queue job {} completed: {}", job.id, stored.url);
                JobOutcome::completed(job.id)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(db_err) = self.database.fail_queue_job(job.id, &message).await {
                    error!("Failed to record failure of queue job {}: {}", job.id, db_err);
                }
                self.append_audit(job.id, &job.owner, None, JobStatus::Failed, Some(&message))
                    .await;

                error!("Queue job {} failed: {}", job.id, message);
                JobOutcome::failed(job.id, message)
            }
        }
    }

    async fn run_publish(&self, job: &PublishJob) -> Result<PublishedVideo, JobError> {
        // Fail fast before any network call
        if job.source_file_id.trim().is_empty() {
            return Err(JobError::validation("source_file_id is required"));
        }
        if job.title.trim().is_empty() && job.source_file_name.trim().is_empty() {
            return Err(JobError::validation("a title or source file name is required"));
        }

        let token = self
            .credentials
            .resolve(&job.owner, job.account_id.as_deref())
            .await?;

        let file = self.source.fetch_file(&job.source_file_id, &token).await?;

        let raw_title = if job.title.trim().is_empty() {
            &job.source_file_name
        } else {
            &job.title
        };
        let title = normalize_title(
            raw_title,
            &self.platform_config.required_title_tag,
            self.platform_config.max_title_length,
        );

        self.destination
            .publish_media(&title, job.description.as_deref(), file.bytes, &token)
            .await
    }

    async fn run_queue(&self, job: &QueueJob) -> Result<StoredFile, JobError> {
        if job.source_url.trim().is_empty() {
            return Err(JobError::validation("source_url is required"));
        }
        if Url::parse(&job.source_url).is_err() {
            return Err(JobError::validation(format!(
                "source_url is not a valid URL: {}",
                job.source_url
            )));
        }

        let token = self
            .credentials
            .resolve(&job.owner, job.account_id.as_deref())
            .await?;

        // Dedupe: the same source item always maps to the same file name,
        // so an existing match means the work was already done.
        let file_name = derive_queue_filename(&job.source_url);
        if let Some(existing) = self.destination.find_existing(&file_name, &token).await? {
            info!(
                "Queue job {} deduplicated: '{}' already stored as {}",
                job.id, file_name, existing.asset_id
            );
            return Ok(existing);
        }

        let candidate = self.chain.resolve(&job.source_url).await?;
        let bytes = download_media(
            &self.client,
            &candidate,
            self.processing_config.min_download_bytes,
        )
        .await?;

        self.destination.store_file(&file_name, bytes, &token).await
    }

    async fn append_audit(
        &self,
        job_id: uuid::Uuid,
        owner: &str,
        result_ref: Option<&str>,
        status: JobStatus,
        error_message: Option<&str>,
    ) {
        if let Err(e) = self
            .database
            .append_audit_entry(job_id, owner, result_ref, status, error_message)
            .await
        {
            error!("Failed to append audit entry for job {}: {}", job_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connectors::SourceFile;
    use crate::models::QueueJobCreateRequest;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct UnusedSource;

    #[async_trait]
    impl MediaSource for UnusedSource {
        async fn fetch_file(&self, _file_id: &str, _token: &str) -> Result<SourceFile, JobError> {
            Err(JobError::source_fetch("not used in this test".to_string()))
        }
    }

    /// Destination stub that reports a pre-existing stored file and counts
    /// store calls.
    struct RecordingDestination {
        existing: Option<StoredFile>,
        stores: AtomicUsize,
    }

    #[async_trait]
    impl MediaDestination for RecordingDestination {
        async fn publish_media(
            &self,
            _title: &str,
            _description: Option<&str>,
            _bytes: Vec<u8>,
            _token: &str,
        ) -> Result<PublishedVideo, JobError> {
            Err(JobError::destination_upload("not used in this test".to_string()))
        }

        async fn find_existing(
            &self,
            _file_name: &str,
            _token: &str,
        ) -> Result<Option<StoredFile>, JobError> {
            Ok(self.existing.clone())
        }

        async fn store_file(
            &self,
            _file_name: &str,
            _bytes: Vec<u8>,
            _token: &str,
        ) -> Result<StoredFile, JobError> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            Err(JobError::destination_upload("store should not run".to_string()))
        }
    }

    async fn test_processor(
        database: Database,
        destination: Arc<RecordingDestination>,
    ) -> JobProcessor {
        let config = Config::default();
        let client = Client::new();
        let credentials = CredentialResolver::new(
            database.clone(),
            client.clone(),
            config.platform.clone(),
        );

        JobProcessor::new(
            database,
            credentials,
            Arc::new(UnusedSource),
            destination,
            Arc::new(ProviderChain::new(Vec::new())),
            client,
            config.platform.clone(),
            config.processing.clone(),
        )
    }

    #[tokio::test]
    async fn test_queue_job_reuses_existing_stored_file() {
        let database = Database::new_in_memory().await.unwrap();
        database.migrate().await.unwrap();
        database
            .save_token(
                "alice",
                "acct-1",
                "valid-token",
                "refresh",
                Utc::now() + Duration::hours(2),
            )
            .await
            .unwrap();

        let job = database
            .create_queue_job(&QueueJobCreateRequest {
                owner: "alice".to_string(),
                account_id: None,
                source_url: "https://example.com/video/abc123".to_string(),
                priority: 0,
            })
            .await
            .unwrap();
        assert!(database.claim_queue_job(job.id).await.unwrap());

        let destination = Arc::new(RecordingDestination {
            existing: Some(StoredFile {
                asset_id: "existing-1".to_string(),
                url: "https://storage.example.com/files/existing-1".to_string(),
                size: Some(2048),
            }),
            stores: AtomicUsize::new(0),
        });

        let processor = test_processor(database.clone(), destination.clone()).await;
        let claimed = database.get_queue_job(job.id).await.unwrap().unwrap();
        let outcome = processor.process_queue_job(&claimed).await;

        // Existing file short-circuits the run: completed without storing
        // again, and without touching the (empty) provider chain.
        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(destination.stores.load(Ordering::SeqCst), 0);

        let stored = database.get_queue_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.result_asset_id.as_deref(), Some("existing-1"));
        assert_eq!(stored.file_size, Some(2048));
    }

    #[tokio::test]
    async fn test_queue_job_without_existing_file_consults_providers() {
        let database = Database::new_in_memory().await.unwrap();
        database.migrate().await.unwrap();
        database
            .save_token(
                "alice",
                "acct-1",
                "valid-token",
                "refresh",
                Utc::now() + Duration::hours(2),
            )
            .await
            .unwrap();

        let job = database
            .create_queue_job(&QueueJobCreateRequest {
                owner: "alice".to_string(),
                account_id: None,
                source_url: "https://example.com/video/xyz789".to_string(),
                priority: 0,
            })
            .await
            .unwrap();
        assert!(database.claim_queue_job(job.id).await.unwrap());

        let destination = Arc::new(RecordingDestination {
            existing: None,
            stores: AtomicUsize::new(0),
        });

        let processor = test_processor(database.clone(), destination).await;
        let claimed = database.get_queue_job(job.id).await.unwrap().unwrap();
        let outcome = processor.process_queue_job(&claimed).await;

        // No dedupe match means the provider chain runs; the empty chain
        // fails resolution, proving the short-circuit did not fire.
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome
            .error
            .unwrap()
            .contains("all download providers failed"));
    }
}
