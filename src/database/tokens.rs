use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, warn};

use super::{parse_datetime, Database};
use crate::models::AccountToken;

const TOKEN_COLUMNS: &str = "owner, account_id, access_token, refresh_token, expires_at, \
     is_valid, last_network_error, created_at, updated_at";

fn map_token_row(row: &SqliteRow) -> Result<AccountToken> {
    let expires_at: String = row.get("expires_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(AccountToken {
        owner: row.get("owner"),
        account_id: row.get("account_id"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: parse_datetime(&expires_at)?,
        is_valid: row.get("is_valid"),
        last_network_error: row.get("last_network_error"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl Database {
    pub async fn get_token(&self, owner: &str, account_id: &str) -> Result<Option<AccountToken>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM account_tokens WHERE owner = ? AND account_id = ?"
        ))
        .bind(owner)
        .bind(account_id)
        .fetch_optional(&self.pool())
        .await?;

        row.as_ref().map(map_token_row).transpose()
    }

    /// First valid token for an owner, used when a job does not name a
    /// specific sub-account.
    pub async fn get_default_token(&self, owner: &str) -> Result<Option<AccountToken>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM account_tokens
             WHERE owner = ? AND is_valid = 1
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(owner)
        .fetch_optional(&self.pool())
        .await?;

        row.as_ref().map(map_token_row).transpose()
    }

    /// Upsert keyed on (owner, account_id): one row per account, refreshed
    /// in place, never duplicated.
    pub async fn save_token(
        &self,
        owner: &str,
        account_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = Utc::now();

        debug!("Saving token for owner '{}' account '{}'", owner, account_id);

        sqlx::query(
            "INSERT INTO account_tokens (owner, account_id, access_token, refresh_token,
             expires_at, is_valid, last_network_error, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, NULL, ?, ?)
             ON CONFLICT (owner, account_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at,
                 is_valid = 1,
                 last_network_error = NULL,
                 updated_at = excluded.updated_at",
        )
        .bind(owner)
        .bind(account_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool())
        .await?;

        Ok(())
    }

    /// Persist only the refreshed access token fields.
    pub async fn update_access_token(
        &self,
        owner: &str,
        account_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE account_tokens
             SET access_token = ?, expires_at = ?, is_valid = 1,
                 last_network_error = NULL, updated_at = ?
             WHERE owner = ? AND account_id = ?",
        )
        .bind(access_token)
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(owner)
        .bind(account_id)
        .execute(&self.pool())
        .await?;

        Ok(())
    }

    /// Note a transient network failure without touching `is_valid`; the
    /// token stays usable for the next attempt.
    pub async fn record_token_network_error(
        &self,
        owner: &str,
        account_id: &str,
        network_error: &str,
    ) -> Result<()> {
        debug!(
            "Recording network error for owner '{}' account '{}': {}",
            owner, account_id, network_error
        );

        sqlx::query(
            "UPDATE account_tokens
             SET last_network_error = ?, updated_at = ?
             WHERE owner = ? AND account_id = ?",
        )
        .bind(network_error)
        .bind(Utc::now().to_rfc3339())
        .bind(owner)
        .bind(account_id)
        .execute(&self.pool())
        .await?;

        Ok(())
    }

    /// Mark a token unusable after a rejected refresh. The account needs
    /// manual re-authentication from the dashboard.
    pub async fn invalidate_token(
        &self,
        owner: &str,
        account_id: &str,
        network_error: &str,
    ) -> Result<()> {
        warn!(
            "Invalidating token for owner '{}' account '{}': {}",
            owner, account_id, network_error
        );

        sqlx::query(
            "UPDATE account_tokens
             SET is_valid = 0, last_network_error = ?, updated_at = ?
             WHERE owner = ? AND account_id = ?",
        )
        .bind(network_error)
        .bind(Utc::now().to_rfc3339())
        .bind(owner)
        .bind(account_id)
        .execute(&self.pool())
        .await?;

        Ok(())
    }
}
