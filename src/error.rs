use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::model::ApiResponse;

/// One required collector that failed or timed out.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedUnit {
    pub name: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("{0}")]
    Validation(String),

    #[error("Too many requests. Please wait a moment and try again.")]
    RateLimited,

    #[error("Required collectors failed: {}", format_failed(.failed))]
    RequiredCollectors { failed: Vec<FailedUnit> },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

fn format_failed(failed: &[FailedUnit]) -> String {
    failed
        .iter()
        .map(|f| format!("{}: {}", f.name, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AuditError {
    /// Stable machine-readable code, one per user-visible failure class.
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::Validation(_) => "invalid_input",
            AuditError::RateLimited => "rate_limited",
            AuditError::RequiredCollectors { .. } => "required_data_unavailable",
            AuditError::Timeout(_) => "audit_timeout",
            AuditError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuditError::Validation(_) => StatusCode::BAD_REQUEST,
            AuditError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuditError::RequiredCollectors { .. } => StatusCode::BAD_GATEWAY,
            AuditError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AuditError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuditError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match &self {
            AuditError::RequiredCollectors { failed } => {
                (self.to_string(), serde_json::to_value(failed).ok())
            }
            // Don't leak internals
            AuditError::Internal(msg) => {
                tracing::error!("Unexpected audit error: {}", msg);
                (
                    "An unexpected error occurred. Please try again.".to_string(),
                    None,
                )
            }
            _ => (self.to_string(), None),
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
            code: Some(self.code().to_string()),
            details,
        };

        (status, axum::Json(body)).into_response()
    }
}
