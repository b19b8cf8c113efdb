use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::repository::StoreError;
use crate::services::gateway::GatewayError;

/// Errors crossing the pipeline boundary into handlers and scheduler jobs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Upstream(#[from] GatewayError),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::NotFound(_) => "NotFoundError",
            PipelineError::Conflict(_) => "ConflictError",
            PipelineError::Precondition(_) => "PreconditionError",
            PipelineError::Upstream(_) => "UpstreamError",
            PipelineError::Persistence(_) => "PersistenceError",
        }
    }

    pub fn credentials_missing() -> Self {
        PipelineError::Precondition(
            "eSSL ADMS credentials are not configured. Set ESSL_ADMS_API_URL and ESSL_ADMS_TOKEN"
                .to_string(),
        )
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Conflict(_) => StatusCode::CONFLICT,
            PipelineError::Precondition(_) => StatusCode::SERVICE_UNAVAILABLE,
            // the vendor's own message goes back to the operator
            PipelineError::Upstream(_) => StatusCode::BAD_REQUEST,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            PipelineError::Persistence(_) => "Database operation failed".to_string(),
            other => other.to_string(),
        };

        if let PipelineError::Persistence(e) = self {
            tracing::error!(error = %e, "Request failed on the database");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": message,
            "error": self.kind(),
        }))
    }
}
