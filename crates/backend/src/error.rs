// =============================================================================
// Riparian API - Error Types
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use riparian_geo::{
    FigureError, ImportError, OverrideError, StoreError, SummaryError, ViewError,
};

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upload rejected; the message is shown to the uploader as-is
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<OverrideError> for ApiError {
    fn from(e: OverrideError) -> Self {
        match e {
            OverrideError::UnknownParcel(_) => ApiError::NotFound(e.to_string()),
            OverrideError::UnknownField(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<ViewError> for ApiError {
    fn from(e: ViewError) -> Self {
        ApiError::NotFound(e.to_string())
    }
}

impl From<SummaryError> for ApiError {
    fn from(e: SummaryError) -> Self {
        ApiError::NotFound(e.to_string())
    }
}

impl From<FigureError> for ApiError {
    fn from(e: FigureError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Io(..) => ApiError::Internal(e.to_string()),
            other => {
                tracing::warn!("Upload rejected: {}", other);
                ApiError::Unprocessable(other.user_message())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Override(e) => e.into(),
            StoreError::Import(e) => e.into(),
            StoreError::UnknownUploadTarget(_) => ApiError::NotFound(e.to_string()),
            StoreError::NoConservationTable => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
