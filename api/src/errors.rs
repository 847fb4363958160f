use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use validator::ValidationErrors;

use crate::{images::ImageStoreError, storage::StorageError};

/// One entry of a structured validation failure, surfaced to clients
/// in the `data` field of a 422 response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    Authentication(String),
    InvalidCredentials,
    EmailTaken,
    Authorization(String),
    NotFound(String),
    Upload(String),
    Storage(StorageError),
    Internal(String),
}

impl ApiError {
    /// Flattens `validator` output into field-level messages.
    pub fn from_validation(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter()
                    .map(|e| FieldError {
                        field: field.clone(),
                        message: e
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("Invalid value for {field}")),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        ApiError::Validation(fields)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(err: ImageStoreError) -> Self {
        ApiError::Upload(err.to_string())
    }
}

/// Convert our custom errors to HTTP responses.
///
/// Every error body carries a stable `message`; validation failures
/// additionally carry the offending fields under `data`. Internal details
/// are logged, never leaked.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            ApiError::Validation(fields) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({
                      "message": "Validation failed, entered data is incorrect",
                      "data": fields
                    })),
                )
                    .into_response();
            }
            ApiError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".into())
            }
            ApiError::EmailTaken => (
                StatusCode::CONFLICT,
                "E-mail address already in use".into(),
            ),
            ApiError::Authorization(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upload(msg) => {
                error!("Image upload failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Image upload failed".into())
            }
            ApiError::Storage(err) => {
                error!("Document store failure: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (
            status,
            Json(serde_json::json!({
              "message": message
            })),
        )
            .into_response()
    }
}
