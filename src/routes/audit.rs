use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MAX_PAGES_PER_REQUEST;
use crate::error::AuditError;
use crate::job::TargetJob;
use crate::log_capture::{LogLevel, LogSource};
use crate::model::{ApiResponse, AuditReport, PageLabel};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PageRequest {
    pub url: String,
    #[serde(default)]
    pub label: PageLabel,
}

/// Either `{ pages: [...] }` or the older single-page `{ url }`.
#[derive(Debug, Deserialize)]
pub struct AuditRequest {
    pub url: Option<String>,
    pub pages: Option<Vec<PageRequest>>,
}

#[derive(Debug, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub code: &'static str,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MultiPageResult {
    pub reports: Vec<AuditReport>,
    pub failures: Vec<PageFailure>,
}

/// Validate the body and turn it into one job per page. Any invalid URL
/// rejects the whole request before anything runs.
pub fn parse_request(request: AuditRequest) -> Result<Vec<TargetJob>, AuditError> {
    match (request.pages, request.url) {
        (Some(pages), _) => {
            if pages.is_empty() || pages.len() > MAX_PAGES_PER_REQUEST {
                return Err(AuditError::Validation(format!(
                    "pages must contain between 1 and {MAX_PAGES_PER_REQUEST} entries"
                )));
            }
            pages
                .iter()
                .map(|p| TargetJob::new(&p.url, p.label))
                .collect()
        }
        (None, Some(url)) => Ok(vec![TargetJob::new(&url, PageLabel::Homepage)?]),
        (None, None) => Err(AuditError::Validation("url is required".to_string())),
    }
}

/// POST /audit
pub async fn create_audit(
    State(state): State<SharedState>,
    payload: Result<Json<AuditRequest>, JsonRejection>,
) -> Result<Response, AuditError> {
    let Json(request) =
        payload.map_err(|e| AuditError::Validation(format!("Invalid request body: {}", e.body_text())))?;
    let legacy = request.pages.is_none();
    let jobs = parse_request(request)?;

    info!(pages = jobs.len(), "Audit requested");
    for job in &jobs {
        state
            .logs
            .emit_for(
                &job.audit_id,
                LogSource::Http,
                LogLevel::Info,
                format!("Audit requested for {}", job.url),
            )
            .await;
    }

    let budget = state.config.audit_budget;
    if legacy {
        let report = state.pipeline.run_within(&jobs[0], budget).await?;
        return Ok(Json(ApiResponse::ok(report)).into_response());
    }

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    let mut last_error = None;
    for (job, outcome) in jobs.iter().zip(state.pipeline.run_pages(&jobs, budget).await) {
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                failures.push(PageFailure {
                    url: job.url.clone(),
                    code: e.code(),
                    error: e.to_string(),
                });
                last_error = Some(e);
            }
        }
    }

    if reports.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }
    Ok(Json(ApiResponse::ok(MultiPageResult { reports, failures })).into_response())
}
