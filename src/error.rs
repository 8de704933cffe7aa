//! Error types for the fee ledger
//!
//! A closed taxonomy shared by the event store, the cache engine and the
//! fee service. Each variant maps to a machine-readable code, a status class
//! and an `expose` flag telling the boundary whether the message is safe to
//! return to clients.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Generic message returned to clients in place of internal details.
const INTERNAL_MESSAGE: &str = "Internal server error";

static INTERNAL_SEQ: AtomicU64 = AtomicU64::new(0);

// == Error Class ==
/// Externally visible classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Client-caused, malformed parameters
    BadRequest,
    /// Referenced entity does not exist
    NotFound,
    /// A dependency is temporarily unreachable; retryable
    Unavailable,
    /// Unexpected failure
    Internal,
}

impl ErrorClass {
    /// Transport status for this class.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::Unavailable => 503,
            ErrorClass::Internal => 500,
        }
    }
}

// == Api Error Enum ==
/// Unified error type for the fee ledger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Malformed request parameters
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// Referenced entity (event id, contract) does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Event store or cache backing store unreachable
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// A dependency of the fee computation failed (price feed, timeout)
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Invariant violation; `detail` is never sent to clients
    #[error("Internal error {code}: {detail}")]
    Internal { code: String, detail: String },
}

impl ApiError {
    // == Constructors ==
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ApiError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ApiError::StorageUnavailable {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        ApiError::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error with a fresh correlation code.
    ///
    /// The detail is logged immediately so the code returned to the client
    /// can be matched against server logs.
    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let seq = INTERNAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        let code = format!("INT-{:x}-{}", millis, seq);
        error!(code = %code, detail = %detail, "internal error");
        ApiError::Internal { code, detail }
    }

    // == Accessors ==
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::NotFound { .. } => "not_found",
            ApiError::StorageUnavailable { .. } => "storage_unavailable",
            ApiError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ApiError::Internal { .. } => "internal_error",
        }
    }

    /// Human-readable message, safe to return when `expose()` is true.
    ///
    /// For `Internal` this is a generic message carrying only the
    /// correlation code.
    pub fn message(&self) -> String {
        match self {
            ApiError::Internal { code, .. } => format!("{} ({})", INTERNAL_MESSAGE, code),
            other => other.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Validation { .. } => ErrorClass::BadRequest,
            ApiError::NotFound { .. } => ErrorClass::NotFound,
            ApiError::StorageUnavailable { .. } | ApiError::UpstreamUnavailable { .. } => {
                ErrorClass::Unavailable
            }
            ApiError::Internal { .. } => ErrorClass::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        self.class().http_status()
    }

    /// Whether the underlying message text may be shown to the client.
    pub fn expose(&self) -> bool {
        !matches!(self, ApiError::Internal { .. })
    }

    /// Storage and upstream failures are transient; everything else is
    /// deterministic for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Unavailable)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::storage(err.to_string())
    }
}

// == Extractor Rejections ==
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.is_retryable() {
            warn!(code = self.code(), "{}", self);
        }

        let body = Json(ErrorResponse::new(self.code(), self.message()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the fee ledger.
pub type Result<T> = std::result::Result<T, ApiError>;
