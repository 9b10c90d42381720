use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states shared by both job kinds.
///
/// Transitions are monotonic: pending -> processing -> {completed, failed}.
/// The only way back is the explicit reprocess action (failed -> pending);
/// the store layer enforces this with guarded conditional updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A publish job moves a video from cloud storage to the hosting platform
/// at a scheduled future time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: Uuid,
    pub owner: String,
    /// Sub-account to publish under; the owner's default account when None
    pub account_id: Option<String>,
    pub status: JobStatus,
    pub source_file_id: String,
    pub source_file_name: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub result_asset_id: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
}

/// A queue job resolves an external source link, downloads the media and
/// stores it in cloud storage. Higher priority runs sooner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: Uuid,
    pub owner: String,
    pub account_id: Option<String>,
    pub status: JobStatus,
    pub source_url: String,
    pub priority: i64,
    pub result_asset_id: Option<String>,
    pub result_url: Option<String>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
}

/// Per-account OAuth credential record. Exactly one row exists per
/// (owner, account_id); refreshes update the row in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountToken {
    pub owner: String,
    pub account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    pub last_network_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Daily processing counters (singleton row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub processed_today: i64,
    pub failed_today: i64,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub last_reset_date: NaiveDate,
}

/// Append-only audit record written after every terminal job outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub owner: String,
    pub result_ref: Option<String>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJobCreateRequest {
    pub owner: String,
    pub account_id: Option<String>,
    pub source_file_id: String,
    pub source_file_name: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJobCreateRequest {
    pub owner: String,
    pub account_id: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub priority: i64,
}

/// Batch import payload for the ingestion queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueImportRequest {
    pub owner: String,
    pub account_id: Option<String>,
    pub source_urls: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

/// Credential registration payload for a connected account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRegisterRequest {
    pub owner: String,
    pub account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of one job within a trigger run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            error: None,
        }
    }

    pub fn failed(job_id: Uuid, error: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            error: Some(error),
        }
    }
}

/// Structured summary returned by the trigger endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub processed_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<JobOutcome>,
}

impl TriggerSummary {
    pub fn empty() -> Self {
        Self {
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            results: Vec::new(),
        }
    }

    pub fn from_results(results: Vec<JobOutcome>) -> Self {
        let success_count = results
            .iter()
            .filter(|r| r.status == JobStatus::Completed)
            .count();
        Self {
            processed_count: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }
}
