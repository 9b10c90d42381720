//! Error type definitions for the vidqueue application
//!
//! Two layers: `AppError` covers request handling and maps onto HTTP
//! responses, while `JobError` is the per-job failure taxonomy written
//! onto job records by the processor.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-level error type; rendered as `{"error": "..."}` JSON bodies.
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors on incoming requests
    #[error("{message}")]
    Validation { message: String },

    /// Resource not found
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// Missing or wrong trigger credential
    #[error("{message}")]
    Unauthorized { message: String },

    /// The requested transition is not legal from the job's current state
    #[error("{message}")]
    Conflict { message: String },

    /// The same operation ran too recently
    #[error("{message}")]
    RateLimited { message: String },

    /// Generic internal errors
    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Per-job failure taxonomy
///
/// Every step of the single-job processor maps its failures into one of
/// these variants; the variant's rendered message is what ends up in the
/// job's `error_message` column.
#[derive(Error, Debug)]
pub enum JobError {
    /// No valid or refreshable token for the owning account.
    /// Never auto-retried; requires manual re-authentication.
    #[error("no valid token: {message}")]
    Auth { message: String },

    /// Source file missing or inaccessible in cloud storage
    #[error("source fetch failed: {message}")]
    SourceFetch { message: String },

    /// Every download provider strategy was exhausted
    #[error("all download providers failed: {summary}")]
    ProviderResolution { summary: String },

    /// Downloaded payload failed size/content validation
    #[error("download rejected: {message}")]
    Download { message: String },

    /// Upload to the hosting platform or storage sink failed
    #[error("destination upload failed: {message}")]
    DestinationUpload { message: String },

    /// Required field missing; fails fast before any network call
    #[error("validation failed: {message}")]
    Validation { message: String },
}

impl JobError {
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn source_fetch<S: Into<String>>(message: S) -> Self {
        Self::SourceFetch {
            message: message.into(),
        }
    }

    pub fn provider_resolution<S: Into<String>>(summary: S) -> Self {
        Self::ProviderResolution {
            summary: summary.into(),
        }
    }

    pub fn download<S: Into<String>>(message: S) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    pub fn destination_upload<S: Into<String>>(message: S) -> Self {
        Self::DestinationUpload {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
