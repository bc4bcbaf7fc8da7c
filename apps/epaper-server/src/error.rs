//! Error types for the ePaper server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use epaper_core::{EpaperError, Notice};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("No PDF available for edition {0}")]
    DownloadUnavailable(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServerError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", what),
            ),
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ServerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Please sign in to download ePapers".to_string(),
            ),
            ServerError::DownloadUnavailable(_) => (
                StatusCode::NOT_FOUND,
                "DOWNLOAD_NOT_AVAILABLE",
                Notice::download_unavailable().description,
            ),
            // Details stay in the log; the client sees the same message for
            // every pipeline failure.
            ServerError::DownloadFailed(detail) => {
                error!("Download failed: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "DOWNLOAD_FAILED",
                    Notice::download_failed().description,
                )
            }
            ServerError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EpaperError> for ServerError {
    fn from(err: EpaperError) -> Self {
        match err {
            EpaperError::Validation(msg) => ServerError::InvalidRequest(msg),
            EpaperError::DownloadUnavailable(id) => ServerError::DownloadUnavailable(id),
            e if e.is_pipeline_failure() => ServerError::DownloadFailed(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (EpaperError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                EpaperError::DownloadUnavailable("1".into()),
                StatusCode::NOT_FOUND,
            ),
            (EpaperError::SourceFetch("503".into()), StatusCode::BAD_GATEWAY),
            (
                EpaperError::MalformedDocument("eof".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EpaperError::SessionStorage("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
