use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::{
    PublishJobCreateRequest, QueueImportRequest, QueueJobCreateRequest, TokenRegisterRequest,
    TriggerSummary,
};

/// Validate the bearer credential carried by an external trigger call.
fn check_trigger_auth(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == secret => Ok(()),
        _ => Err(AppError::unauthorized("invalid trigger credential")),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// --- Pipeline triggers ---

pub async fn trigger_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<TriggerSummary>> {
    check_trigger_auth(&headers, &state.config.trigger.secret)?;

    if !state.throttle.try_acquire("trigger:publish").await {
        return Err(AppError::rate_limited("publish pipeline ran too recently"));
    }

    // Individual job failures are reported per-item inside the summary;
    // only a pipeline-wide failure becomes a 500.
    let summary = state.scheduler.run().await?;
    Ok(Json(summary))
}

pub async fn trigger_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<TriggerSummary>> {
    check_trigger_auth(&headers, &state.config.trigger.secret)?;

    if !state.throttle.try_acquire("trigger:queue").await {
        return Err(AppError::rate_limited("queue pipeline ran too recently"));
    }

    let summary = state.dispatcher.run().await?;
    Ok(Json(summary))
}

// --- Publish jobs ---

#[derive(Debug, Deserialize)]
pub struct OwnerFilter {
    pub owner: Option<String>,
}

pub async fn list_publish_jobs(
    State(state): State<AppState>,
    Query(filter): Query<OwnerFilter>,
) -> AppResult<Json<Value>> {
    let jobs = state
        .database
        .list_publish_jobs(filter.owner.as_deref())
        .await?;

    Ok(Json(json!({ "jobs": jobs })))
}

pub async fn create_publish_job(
    State(state): State<AppState>,
    Json(req): Json<PublishJobCreateRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.owner.trim().is_empty() {
        return Err(AppError::validation("owner is required"));
    }
    if req.source_file_id.trim().is_empty() {
        return Err(AppError::validation("source_file_id is required"));
    }

    let job = state.database.create_publish_job(&req).await?;

    Ok((StatusCode::CREATED, Json(json!({ "job": job }))))
}

pub async fn get_publish_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let job = state
        .database
        .get_publish_job(id)
        .await?
        .ok_or_else(|| AppError::not_found("publish job", id.to_string()))?;

    Ok(Json(json!({ "job": job })))
}

pub async fn cancel_publish_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let cancelled = state.database.cancel_publish_job(id).await?;

    if cancelled {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        // Either unknown or already claimed; claimed jobs run to completion
        Err(AppError::conflict(
            "job is not pending and cannot be cancelled",
        ))
    }
}

pub async fn reprocess_publish_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let reset = state.database.reprocess_publish_job(id).await?;

    if reset {
        Ok(Json(json!({ "reprocessed": true })))
    } else {
        Err(AppError::conflict("only failed jobs can be reprocessed"))
    }
}

// --- Ingestion queue jobs ---

pub async fn list_queue_jobs(
    State(state): State<AppState>,
    Query(filter): Query<OwnerFilter>,
) -> AppResult<Json<Value>> {
    let jobs = state
        .database
        .list_queue_jobs(filter.owner.as_deref())
        .await?;

    Ok(Json(json!({ "jobs": jobs })))
}

pub async fn create_queue_job(
    State(state): State<AppState>,
    Json(req): Json<QueueJobCreateRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.owner.trim().is_empty() {
        return Err(AppError::validation("owner is required"));
    }
    if req.source_url.trim().is_empty() {
        return Err(AppError::validation("source_url is required"));
    }

    let job = state.database.create_queue_job(&req).await?;

    Ok((StatusCode::CREATED, Json(json!({ "job": job }))))
}

pub async fn import_queue_jobs(
    State(state): State<AppState>,
    Json(req): Json<QueueImportRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.owner.trim().is_empty() {
        return Err(AppError::validation("owner is required"));
    }
    if req.source_urls.is_empty() {
        return Err(AppError::validation("source_urls must not be empty"));
    }

    let mut created = Vec::new();
    for source_url in &req.source_urls {
        if source_url.trim().is_empty() {
            continue;
        }

        let job = state
            .database
            .create_queue_job(&QueueJobCreateRequest {
                owner: req.owner.clone(),
                account_id: req.account_id.clone(),
                source_url: source_url.clone(),
                priority: req.priority,
            })
            .await?;

        created.push(job);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "imported": created.len(), "jobs": created })),
    ))
}

pub async fn cancel_queue_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let cancelled = state.database.cancel_queue_job(id).await?;

    if cancelled {
        Ok(Json(json!({ "cancelled": true })))
    } else {
        Err(AppError::conflict(
            "job is not pending and cannot be cancelled",
        ))
    }
}

pub async fn reprocess_queue_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let reset = state.database.reprocess_queue_job(id).await?;

    if reset {
        Ok(Json(json!({ "reprocessed": true })))
    } else {
        Err(AppError::conflict("only failed jobs can be reprocessed"))
    }
}

// --- Account tokens ---

/// Register (or replace) the stored credential for an account. The upsert
/// keeps exactly one row per (owner, account_id).
pub async fn register_account_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.owner.trim().is_empty() {
        return Err(AppError::validation("owner is required"));
    }
    if req.account_id.trim().is_empty() {
        return Err(AppError::validation("account_id is required"));
    }
    if req.access_token.trim().is_empty() || req.refresh_token.trim().is_empty() {
        return Err(AppError::validation(
            "access_token and refresh_token are required",
        ));
    }

    state
        .database
        .save_token(
            &req.owner,
            &req.account_id,
            &req.access_token,
            &req.refresh_token,
            req.expires_at,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "registered": true,
            "owner": req.owner,
            "account_id": req.account_id,
        })),
    ))
}

// --- Reporting ---

pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let stats = state.database.read_stats().await?;
    Ok(Json(json!({ "stats": stats })))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<Value>> {
    let entries = state
        .database
        .list_recent_audit_entries(query.limit.unwrap_or(100))
        .await?;

    Ok(Json(json!({ "entries": entries })))
}
