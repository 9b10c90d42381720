use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::{JobStatus, QueueJob, QueueJobCreateRequest};

const QUEUE_JOB_COLUMNS: &str = "id, owner, account_id, status, source_url, priority, \
     result_asset_id, result_url, file_size, error_message, created_at, updated_at, \
     processing_started_at";

fn map_queue_row(row: &SqliteRow) -> Result<QueueJob> {
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown job status: {}", status_str))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let processing_started_at: Option<String> = row.get("processing_started_at");

    Ok(QueueJob {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        owner: row.get("owner"),
        account_id: row.get("account_id"),
        status,
        source_url: row.get("source_url"),
        priority: row.get("priority"),
        result_asset_id: row.get("result_asset_id"),
        result_url: row.get("result_url"),
        file_size: row.get("file_size"),
        error_message: row.get("error_message"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        processing_started_at: processing_started_at
            .map(|s| parse_datetime(&s))
            .transpose()?,
    })
}

impl Database {
    pub async fn create_queue_job(&self, req: &QueueJobCreateRequest) -> Result<QueueJob> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        info!(
            "Creating queue job {} for owner '{}' (priority {})",
            id, req.owner, req.priority
        );

        sqlx::query(
            "INSERT INTO queue_jobs (id, owner, account_id, status, source_url, priority,
             created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&req.owner)
        .bind(&req.account_id)
        .bind(&req.source_url)
        .bind(req.priority)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool())
        .await?;

        self.get_queue_job(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Queue job {} vanished after insert", id))
    }

    pub async fn get_queue_job(&self, id: Uuid) -> Result<Option<QueueJob>> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUE_JOB_COLUMNS} FROM queue_jobs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool())
        .await?;

        row.as_ref().map(map_queue_row).transpose()
    }

    pub async fn list_queue_jobs(&self, owner: Option<&str>) -> Result<Vec<QueueJob>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {QUEUE_JOB_COLUMNS} FROM queue_jobs
                     WHERE owner = ? ORDER BY priority DESC, created_at ASC"
                ))
                .bind(owner)
                .fetch_all(&self.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {QUEUE_JOB_COLUMNS} FROM queue_jobs
                     ORDER BY priority DESC, created_at ASC"
                ))
                .fetch_all(&self.pool())
                .await?
            }
        };

        rows.iter().map(map_queue_row).collect()
    }

    /// Pending queue jobs in dispatch order: priority descending, then
    /// oldest first within a priority level.
    pub async fn list_pending_queue_jobs(&self, limit: usize) -> Result<Vec<QueueJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUE_JOB_COLUMNS} FROM queue_jobs
             WHERE status = 'pending'
             ORDER BY priority DESC, created_at ASC
             LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool())
        .await?;

        rows.iter().map(map_queue_row).collect()
    }

    /// Atomic pending -> processing transition (same contract as
    /// `claim_publish_job`).
    pub async fn claim_queue_job(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE queue_jobs
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

    pub async fn complete_queue_job(
        &self,
        id: Uuid,
        result_asset_id: &str,
        result_url: &str,
        file_size: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_jobs
             SET status = 'completed', result_asset_id = ?, result_url = ?, file_size = ?,
                 error_message = NULL, updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(result_asset_id)
        .bind(result_url)
        .bind(file_size)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn fail_queue_job(&self, id: Uuid, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_jobs
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

    pub async fn reprocess_queue_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_jobs
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

    pub async fn cancel_queue_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queue_jobs WHERE id = ? AND status = 'pending'")
            .bind(id.to_string())
            .execute(&self.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
