use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::CredentialRejection;
use crate::store::StoreError;
use crate::validate::ValidationError;

pub const MSG_INVALID_PAYLOAD: &str = "Invalid payload";
pub const MSG_SAVE_FAILED: &str = "Failed to save response";
pub const MSG_LOAD_FAILED: &str = "Failed to load responses";
pub const MSG_INVALID_QUERY: &str = "Invalid query";

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything an ingestion route can fail with. Each variant maps to one
/// status code and a `{ "error": ... }` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] CredentialRejection),

    #[error("{0}")]
    InvalidPayload(#[from] ValidationError),

    #[error("malformed JSON body: {0}")]
    MalformedJson(String),

    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    #[error("storage failure on write: {0}")]
    StorageWrite(StoreError),

    #[error("storage failure on read: {0}")]
    StorageRead(StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidPayload(_) | ApiError::MalformedJson(_) | ApiError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::StorageWrite(_) | ApiError::StorageRead(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Label used for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(r) => r.as_label(),
            ApiError::InvalidPayload(_) => "invalid_payload",
            ApiError::MalformedJson(_) => "malformed_json",
            ApiError::InvalidQuery(_) => "invalid_query",
            ApiError::StorageWrite(_) | ApiError::StorageRead(_) => "storage_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::Unauthorized(r) => json!({ "error": r.public_message() }),
            ApiError::InvalidPayload(e) => json!({
                "error": MSG_INVALID_PAYLOAD,
                "details": e.messages(),
            }),
            ApiError::MalformedJson(msg) => json!({
                "error": MSG_INVALID_PAYLOAD,
                "details": [msg],
            }),
            ApiError::InvalidQuery(msg) => json!({
                "error": MSG_INVALID_QUERY,
                "details": [msg],
            }),
            ApiError::StorageWrite(_) => json!({ "error": MSG_SAVE_FAILED }),
            ApiError::StorageRead(_) => json!({ "error": MSG_LOAD_FAILED }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::MalformedJson(err.to_string())
    }
}
