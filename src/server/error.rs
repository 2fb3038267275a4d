use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gitmark_core::{StoreError, SyncError};
use serde::Serialize;

/// Error body returned by every API endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, &'static str),
    BadRequest(String),
    NotFound(String),
    Sync(SyncError),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError::Sync(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Sync(SyncError::StoreFailure(e))
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(code, _) => (StatusCode::UNAUTHORIZED, code),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Sync(e) => match e {
                SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                SyncError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
                SyncError::Rejected { .. } => (StatusCode::CONFLICT, "conflict"),
                SyncError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "remote_unavailable"),
                SyncError::StoreFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                SyncError::Unmodified(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unmodified"),
                SyncError::NotOpen(_) => (StatusCode::BAD_REQUEST, "not_open"),
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized(_, message) => write!(f, "{}", message),
            ApiError::BadRequest(message) => write!(f, "{}", message),
            ApiError::NotFound(message) => write!(f, "{}", message),
            ApiError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        if status.is_server_error() {
            tracing::error!(code = error, "{}", self);
        }
        (
            status,
            Json(ErrorBody {
                error,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
