//! Error types for the worker
//!
//! Every failure a request can hit is a [`GateError`]. Startup variants are
//! fatal and abort the binary before the job endpoint is bound; all others are
//! turned into an `{"error": ...}` value for the caller.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The backend process could not be started
    #[error("failed to spawn backend `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The backend never answered its health check within the retry budget
    #[error("backend at {url} did not become healthy after {attempts} attempts")]
    BackendNotReady { url: String, attempts: u32 },
    /// The job payload failed validation
    #[error("{0}")]
    InvalidInput(String),
    /// The backend answered with a non-success status
    #[error("backend returned status {status}: {body}")]
    BackendError { status: u16, body: String },
    /// The backend could not be reached or the body could not be read
    #[error("backend request failed: {0}")]
    BackendUnavailable(String),
    /// A streaming body failed part way
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("handler exception: {0}")]
    Unexpected(String),
}

/// Result type for worker operations
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GateError::InvalidInput(message.into())
    }

    /// Startup failures abort the worker; everything else is per request.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            GateError::SpawnFailed { .. } | GateError::BackendNotReady { .. }
        )
    }

    /// The `{"error": ...}` value handed back to the caller.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

impl ResponseError for GateError {
    fn status_code(&self) -> StatusCode {
        match self {
            GateError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GateError::BackendError { .. }
            | GateError::BackendUnavailable(_)
            | GateError::StreamError(_) => StatusCode::BAD_GATEWAY,
            GateError::SpawnFailed { .. } | GateError::BackendNotReady { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GateError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_json())
    }
}
