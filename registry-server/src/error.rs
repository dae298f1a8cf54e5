//! # Error Handling and Response Types
//!
//! Every handler returns [`AppResult`]. Errors are classified by
//! [`ErrorCode`], which decides the HTTP status, and rendered as the npm
//! client's error envelope:
//!
//! ```json
//! { "error": "Human-readable error message" }
//! ```
//!
//! ## Error Classifications
//!
//! - **Validation Errors** (400): bad names, malformed documents, attachment
//!   mismatches, malformed archives
//! - **Conflicts** (400): the version is already published
//! - **Unsupported Media Type** (415): attachment content type is not
//!   `application/octet-stream`
//! - **Not Found** (404): unknown packages or tarballs
//! - **Auth Errors** (401 missing credentials, 403 unknown key)
//! - **Internal Errors** (500): storage and database failures. The message
//!   sent to the client is generic; the real cause is only logged.

use crate::inspect::InspectError;
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use registry_store::StoreError;
use serde::{Deserialize, Serialize};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Error envelope returned by every failing endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    Conflict,
    UnsupportedMediaType,
    NotFound,
    Unauthorized,
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::Conflict => "conflict",
            ErrorCode::UnsupportedMediaType => "unsupported_media_type",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            // npm clients expect a plain 400 for "cannot publish over existing version"
            ErrorCode::ValidationError | ErrorCode::Conflict => StatusCode::BAD_REQUEST,
            ErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 attachment data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest(_)
            | AppError::Json(_)
            | AppError::Base64(_)
            | AppError::Inspect(_) => ErrorCode::ValidationError,
            AppError::UnsupportedMediaType(_) => ErrorCode::UnsupportedMediaType,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Unauthorized(_) => ErrorCode::Unauthorized,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::Storage(StorageError::NotFound(_)) => ErrorCode::NotFound,
            AppError::Storage(_) => ErrorCode::InternalError,
            AppError::Store(e) if e.is_conflict() => ErrorCode::Conflict,
            AppError::Store(StoreError::NotFound(_)) => ErrorCode::NotFound,
            AppError::Store(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to show to the client
    pub fn public_message(&self) -> String {
        match self.error_code() {
            ErrorCode::InternalError => INTERNAL_ERROR_MESSAGE.to_string(),
            ErrorCode::NotFound => match self {
                AppError::Storage(_) => "Tarball not found".to_string(),
                AppError::Store(StoreError::NotFound(_)) => "Package not found".to_string(),
                _ => self.to_string(),
            },
            ErrorCode::Conflict => match self {
                AppError::Store(StoreError::VersionExists { package, version }) => {
                    version_exists_message(package, version)
                }
                _ => self.to_string(),
            },
            _ => self.to_string(),
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.public_message(),
        }
    }
}

/// Conflict message shared by the fast-path check and the store's guard.
pub fn version_exists_message(package: &str, version: &str) -> String {
    format!(
        "Cannot publish over existing version {} of {}",
        version, package
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
