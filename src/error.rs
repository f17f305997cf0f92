use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Unified error taxonomy for the commit-and-thumbnail pipeline.
///
/// Every variant carries a stable machine-readable code and maps to an HTTP
/// status at the API boundary. Worker-side errors additionally classify as
/// permanent or retryable, which the job queue uses to decide whether a
/// failed attempt is worth redelivering.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("key is not under the staging prefix: {0}")]
    InvalidPrefix(String),

    #[error("asserted key does not match the stored object: asserted={asserted}, stored={stored}")]
    KeyMismatch { asserted: String, stored: String },

    #[error("asserted size does not match the stored object: asserted={asserted}, stored={stored}")]
    SizeMismatch { asserted: i64, stored: i64 },

    #[error("not a valid glTF key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("invalid glTF document: {0}")]
    InvalidDocument(String),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("copy to final location failed: {0}")]
    CopyFailed(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable business code, surfaced in error bodies and job records.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidPrefix(_) => "KEY_INCORRECT",
            PipelineError::KeyMismatch { .. } => "KEY_MISMATCH",
            PipelineError::SizeMismatch { .. } => "SIZE_MISMATCH",
            PipelineError::InvalidKey(_) => "INVALID_KEY",
            PipelineError::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            PipelineError::InvalidDocument(_) => "INVALID_DOCUMENT",
            PipelineError::RenderFailed(_) => "RENDER_FAILED",
            PipelineError::CopyFailed(_) => "COPY_FAILED",
            PipelineError::Storage(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidPrefix(_)
            | PipelineError::KeyMismatch { .. }
            | PipelineError::SizeMismatch { .. }
            | PipelineError::InvalidKey(_)
            | PipelineError::InvalidDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::CopyFailed(_) => StatusCode::BAD_GATEWAY,
            PipelineError::RenderFailed(_) | PipelineError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True when re-attempting the same job would fail identically, so the
    /// queue should not burn its retry budget on it.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidPrefix(_)
                | PipelineError::KeyMismatch { .. }
                | PipelineError::SizeMismatch { .. }
                | PipelineError::InvalidKey(_)
                | PipelineError::ObjectNotFound(_)
                | PipelineError::InvalidDocument(_)
        )
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal failures get logged in full but never leak detail.
        let message = match &self {
            PipelineError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                "Internal Server Error".to_string()
            }
            PipelineError::RenderFailed(msg) => {
                tracing::error!("Render error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "ok": false,
            "message": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_422() {
        let err = PipelineError::SizeMismatch {
            asserted: 100,
            stored: 120,
        };
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "SIZE_MISMATCH");
        assert!(err.is_permanent());
    }

    #[test]
    fn test_render_failures_are_retryable() {
        let err = PipelineError::RenderFailed("timed out".to_string());
        assert!(!err.is_permanent());
        assert_eq!(err.code(), "RENDER_FAILED");
    }

    #[test]
    fn test_copy_failure_is_a_server_error() {
        let err = PipelineError::CopyFailed("upstream refused".to_string());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "COPY_FAILED");
    }
}
