use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sqlx::Row;

use super::{parse_datetime, Database};
use crate::models::ProcessingStats;

impl Database {
    pub async fn read_stats(&self) -> Result<ProcessingStats> {
        let row = sqlx::query(
            "SELECT processed_today, failed_today, last_batch_at, last_reset_date
             FROM processing_stats WHERE id = 1",
        )
        .fetch_one(&self.pool())
        .await?;

        let last_batch_at: Option<String> = row.get("last_batch_at");
        let last_reset_date: String = row.get("last_reset_date");

        Ok(ProcessingStats {
            processed_today: row.get("processed_today"),
            failed_today: row.get("failed_today"),
            last_batch_at: last_batch_at.map(|s| parse_datetime(&s)).transpose()?,
            last_reset_date: NaiveDate::parse_from_str(&last_reset_date, "%Y-%m-%d")?,
        })
    }

    /// Zero the daily counters when the stored reset date is not today.
    /// The date guard in the WHERE clause makes the reset happen exactly
    /// once per day even with concurrent callers.
    pub async fn reset_stats_if_stale(&self, today: NaiveDate) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE processing_stats
             SET processed_today = 0, failed_today = 0, last_reset_date = ?
             WHERE id = 1 AND last_reset_date <> ?",
        )
        .bind(today.format("%Y-%m-%d").to_string())
        .bind(today.format("%Y-%m-%d").to_string())
        .execute(&self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomic counter increments; never read-modify-write.
    pub async fn apply_stats_delta(&self, succeeded: i64, failed: i64) -> Result<()> {
        sqlx::query(
            "UPDATE processing_stats
             SET processed_today = processed_today + ?,
                 failed_today = failed_today + ?,
                 last_batch_at = ?
             WHERE id = 1",
        )
        .bind(succeeded)
        .bind(failed)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool())
        .await?;

        Ok(())
    }
}
