use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::config::{HISTORY_DEFAULT_LIMIT, HISTORY_MAX_LIMIT};
use crate::error::AuditError;
use crate::job::is_valid_audit_id;
use crate::model::ApiResponse;
use crate::routes::not_found;
use crate::state::SharedState;
use crate::storage::Viewport;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    HISTORY_DEFAULT_LIMIT
}

fn invalid_id(id: &str) -> AuditError {
    AuditError::Validation(format!("Invalid audit id: {id}"))
}

/// GET /audits/history
pub async fn audit_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AuditError> {
    let entries = state
        .store
        .history(query.limit.min(HISTORY_MAX_LIMIT))
        .await
        .map_err(|e| AuditError::Internal(format!("history query failed: {e}")))?;
    Ok(Json(ApiResponse::ok(entries)).into_response())
}

/// GET /audits/active: audits in flight and the stage each is in.
pub async fn active_audits(State(state): State<SharedState>) -> Response {
    Json(ApiResponse::ok(state.tracker.active().await)).into_response()
}

/// GET /audits/{id}/report
pub async fn audit_report(
    State(state): State<SharedState>,
    Path(audit_id): Path<String>,
) -> Result<Response, AuditError> {
    if !is_valid_audit_id(&audit_id) {
        return Err(invalid_id(&audit_id));
    }
    match state.store.load_report(&audit_id).await {
        Ok(Some(report)) => Ok(Json(ApiResponse::ok(report)).into_response()),
        Ok(None) => Ok(not_found(format!("No report for {audit_id}"))),
        Err(e) => Err(AuditError::Internal(format!("report load failed: {e}"))),
    }
}

/// GET /audits/{id}/{file}: stored screenshots.
pub async fn audit_file(
    State(state): State<SharedState>,
    Path((audit_id, file)): Path<(String, String)>,
) -> Result<Response, AuditError> {
    if !is_valid_audit_id(&audit_id) {
        return Err(invalid_id(&audit_id));
    }
    if ![Viewport::Desktop, Viewport::Mobile]
        .iter()
        .any(|v| v.file_name() == file)
    {
        return Ok(not_found(format!("Unknown file {file}")));
    }

    match state.store.read_file(&audit_id, &file).await {
        Ok(Some(bytes)) => Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response()),
        Ok(None) => Ok(not_found(format!("{file} not stored for {audit_id}"))),
        Err(e) => Err(AuditError::Internal(format!("file read failed: {e}"))),
    }
}
