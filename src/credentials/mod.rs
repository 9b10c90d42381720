//! Credential resolver for platform accounts
//!
//! Looks up the stored OAuth token for an account and refreshes it against
//! the platform token endpoint when it is expired or close to expiry. A
//! rejected refresh marks the stored token invalid and surfaces an auth
//! failure that callers must treat as requiring manual re-authentication;
//! it is never auto-retried. A transport failure reaching the endpoint is
//! only recorded and leaves the token valid for the next attempt.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::PlatformConfig;
use crate::database::Database;
use crate::errors::JobError;
use crate::models::AccountToken;

/// Refresh when the token expires within this margin.
const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}

/// Decide whether a token needs a refresh before use.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now + Duration::seconds(EXPIRY_MARGIN_SECS)
}

#[derive(Clone)]
pub struct CredentialResolver {
    database: Database,
    client: Client,
    config: PlatformConfig,
}

impl CredentialResolver {
    pub fn new(database: Database, client: Client, config: PlatformConfig) -> Self {
        Self {
            database,
            client,
            config,
        }
    }

    /// Return a valid access token for the owner, refreshing in place when
    /// needed. `account_id` selects a sub-account; the owner's default
    /// (first valid) token row is used when absent.
    pub async fn resolve(
        &self,
        owner: &str,
        account_id: Option<&str>,
    ) -> Result<String, JobError> {
        let token = match account_id {
            Some(account_id) => self
                .database
                .get_token(owner, account_id)
                .await
                .map_err(|e| JobError::auth(format!("token lookup failed: {e}")))?,
            None => self
                .database
                .get_default_token(owner)
                .await
                .map_err(|e| JobError::auth(format!("token lookup failed: {e}")))?,
        };

        let Some(token) = token else {
            return Err(JobError::auth(format!(
                "no connected account for owner '{owner}'"
            )));
        };

        if !token.is_valid {
            return Err(JobError::auth(format!(
                "account '{}' requires re-authentication",
                token.account_id
            )));
        }

        if !needs_refresh(token.expires_at, Utc::now()) {
            debug!(
                "Token for owner '{}' account '{}' still valid until {}",
                owner,
                token.account_id,
                token.expires_at.to_rfc3339()
            );
            return Ok(token.access_token);
        }

        self.refresh(&token).await
    }

    async fn refresh(&self, token: &AccountToken) -> Result<String, JobError> {
        info!(
            "Refreshing access token for owner '{}' account '{}'",
            token.owner, token.account_id
        );

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", token.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                // Transient transport failure: the grant itself was not
                // rejected, so the token stays valid for the next attempt.
                let message = format!("token endpoint unreachable: {e}");
                self.note_network_error(token, &message).await;
                return Err(JobError::auth(message));
            }
        };

        if !response.status().is_success() {
            // Rejected refresh (revoked grant, bad client credentials)
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("refresh rejected: HTTP {status} {body}");
            self.invalidate(token, &message).await;
            return Err(JobError::auth(message));
        }

        let refreshed: TokenRefreshResponse = response.json().await.map_err(|e| {
            JobError::auth(format!("malformed token endpoint response: {e}"))
        })?;

        let expires_at = Utc::now() + Duration::seconds(refreshed.expires_in);

        if let Err(e) = self
            .database
            .update_access_token(
                &token.owner,
                &token.account_id,
                &refreshed.access_token,
                expires_at,
            )
            .await
        {
            return Err(JobError::auth(format!(
                "failed to persist refreshed token: {e}"
            )));
        }

        Ok(refreshed.access_token)
    }

    async fn note_network_error(&self, token: &AccountToken, message: &str) {
        if let Err(e) = self
            .database
            .record_token_network_error(&token.owner, &token.account_id, message)
            .await
        {
            warn!(
                "Failed to record network error for owner '{}' account '{}': {}",
                token.owner, token.account_id, e
            );
        }
    }

    async fn invalidate(&self, token: &AccountToken, message: &str) {
        if let Err(e) = self
            .database
            .invalidate_token(&token.owner, &token.account_id, message)
            .await
        {
            warn!(
                "Failed to mark token invalid for owner '{}' account '{}': {}",
                token.owner, token.account_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = Utc::now();
        assert!(needs_refresh(now + Duration::seconds(60), now));
        assert!(needs_refresh(now - Duration::seconds(1), now));
    }

    #[test]
    fn test_no_refresh_outside_margin() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::seconds(3600), now));
    }
}
