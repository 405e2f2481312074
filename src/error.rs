use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use crate::store::StoreError;

/// Failure of a single engine operation.
///
/// Every variant is local to the call that produced it: the roster, the ledger
/// and the permission table are left exactly as they were before the call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input (empty reason, non-positive radius, bad shift window).
    #[error("{0}")]
    Validation(String),

    /// The operation would break an invariant; re-read state before retrying.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Record store or location source failure.
    #[error("{0}")]
    External(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::Conflict(_) => "conflict_error",
            EngineError::NotFound(_) => "not_found_error",
            EngineError::External(_) => "external_error",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::External(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::External(format!("record encoding failed: {err}"))
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::External(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": self.to_string()
        }))
    }
}
