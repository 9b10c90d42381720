use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::{JobStatus, PublishJob, PublishJobCreateRequest};

const PUBLISH_JOB_COLUMNS: &str = "id, owner, account_id, status, source_file_id, \
     source_file_name, title, description, scheduled_at, result_asset_id, result_url, \
     error_message, created_at, updated_at, processing_started_at";

fn map_publish_row(row: &SqliteRow) -> Result<PublishJob> {
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown job status: {}", status_str))?;

    let scheduled_at: String = row.get("scheduled_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let processing_started_at: Option<String> = row.get("processing_started_at");

    Ok(PublishJob {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        owner: row.get("owner"),
        account_id: row.get("account_id"),
        status,
        source_file_id: row.get("source_file_id"),
        source_file_name: row.get("source_file_name"),
        title: row.get("title"),
        description: row.get("description"),
        scheduled_at: parse_datetime(&scheduled_at)?,
        result_asset_id: row.get("result_asset_id"),
        result_url: row.get("result_url"),
        error_message: row.get("error_message"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        processing_started_at: processing_started_at
            .map(|s| parse_datetime(&s))
            .transpose()?,
    })
}

impl Database {
    pub async fn create_publish_job(&self, req: &PublishJobCreateRequest) -> Result<PublishJob> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        info!(
            "Creating publish job {} for owner '{}' scheduled at {}",
            id,
            req.owner,
            req.scheduled_at.to_rfc3339()
        );

        sqlx::query(
            "INSERT INTO publish_jobs (id, owner, account_id, status, source_file_id,
             source_file_name, title, description, scheduled_at, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&req.owner)
        .bind(&req.account_id)
        .bind(&req.source_file_id)
        .bind(&req.source_file_name)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.scheduled_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool())
        .await?;

        self.get_publish_job(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Publish job {} vanished after insert", id))
    }

    pub async fn get_publish_job(&self, id: Uuid) -> Result<Option<PublishJob>> {
        let row = sqlx::query(&format!(
            "SELECT {PUBLISH_JOB_COLUMNS} FROM publish_jobs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool())
        .await?;

        row.as_ref().map(map_publish_row).transpose()
    }

    pub async fn list_publish_jobs(&self, owner: Option<&str>) -> Result<Vec<PublishJob>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {PUBLISH_JOB_COLUMNS} FROM publish_jobs
                     WHERE owner = ? ORDER BY scheduled_at ASC"
                ))
                .bind(owner)
                .fetch_all(&self.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {PUBLISH_JOB_COLUMNS} FROM publish_jobs ORDER BY scheduled_at ASC"
                ))
                .fetch_all(&self.pool())
                .await?
            }
        };

        rows.iter().map(map_publish_row).collect()
    }

    /// Pending publish jobs due before `to`, earliest first. No lower
    /// bound: overdue pending jobs (missed runs, late reprocessed
    /// failures) stay eligible no matter how old their scheduled time is.
    pub async fn list_pending_publish_jobs_before(
        &self,
        to: DateTime<Utc>,
    ) -> Result<Vec<PublishJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {PUBLISH_JOB_COLUMNS} FROM publish_jobs
             WHERE status = 'pending' AND scheduled_at < ?
             ORDER BY scheduled_at ASC"
        ))
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool())
        .await?;

        rows.iter().map(map_publish_row).collect()
    }

    /// Atomic pending -> processing transition. Exactly one concurrent
    /// caller wins; everyone else observes zero rows affected.
    pub async fn claim_publish_job(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE publish_jobs
             SET status = 'processing', processing_started_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn complete_publish_job(
        &self,
        id: Uuid,
        result_asset_id: &str,
        result_url: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE publish_jobs
             SET status = 'completed', result_asset_id = ?, result_url = ?,
                 error_message = NULL, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(result_asset_id)
        .bind(result_url)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn fail_publish_job(&self, id: Uuid, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE publish_jobs
             SET status = 'failed', error_message = ?, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Explicit manual reprocess: failed -> pending, one more attempt.
    pub async fn reprocess_publish_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE publish_jobs
             SET status = 'pending', error_message = NULL,
                 processing_started_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'failed'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Cancellation is only possible while the job is still unclaimed.
    pub async fn cancel_publish_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM publish_jobs WHERE id = ? AND status = 'pending'")
            .bind(id.to_string())
            .execute(&self.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
