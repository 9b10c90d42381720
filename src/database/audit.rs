use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::{AuditEntry, JobStatus};

fn map_audit_row(row: &SqliteRow) -> Result<AuditEntry> {
    let status_str: String = row.get("status");
    let status = JobStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown job status: {}", status_str))?;
    let created_at: String = row.get("created_at");

    Ok(AuditEntry {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        job_id: Uuid::parse_str(&row.get::<String, _>("job_id"))?,
        owner: row.get("owner"),
        result_ref: row.get("result_ref"),
        status,
        error_message: row.get("error_message"),
        created_at: parse_datetime(&created_at)?,
    })
}

impl Database {
    /// Append-only; audit rows are never updated or deleted.
    pub async fn append_audit_entry(
        &self,
        job_id: Uuid,
        owner: &str,
        result_ref: Option<&str>,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, job_id, owner, result_ref, status, error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(job_id.to_string())
        .bind(owner)
        .bind(result_ref)
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool())
        .await?;

        Ok(())
    }

    pub async fn list_recent_audit_entries(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, job_id, owner, result_ref, status, error_message, created_at
             FROM audit_log ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool())
        .await?;

        rows.iter().map(map_audit_row).collect()
    }
}
