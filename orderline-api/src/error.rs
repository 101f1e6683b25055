//! Error Types for the orderline HTTP layer
//!
//! [`ApiError`] is the JSON error body returned by every handler. Store and
//! decode failures are logged in full and collapsed into a generic message so
//! internal details do not leak to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orderline_core::{OrderError, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error categories for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Requested order does not exist
    OrderNotFound,

    /// Database query or transaction failed
    DatabaseError,

    /// Database could not be reached within the retry bound
    ServiceUnavailable,

    /// Anything else
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::OrderNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::OrderNotFound => "order not found",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn order_not_found() -> Self {
        Self::from_code(ErrorCode::OrderNotFound)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        tracing::error!(error = %err, "Order lookup failed");

        match err {
            OrderError::Store(StoreError::ConnectFailed { .. }) => {
                ApiError::from_code(ErrorCode::ServiceUnavailable)
            }
            OrderError::Store(_) => ApiError::from_code(ErrorCode::DatabaseError),
            _ => ApiError::from_code(ErrorCode::InternalError),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        OrderError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::DecodeError;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::order_not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::internal_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_are_generic() {
        let err: ApiError = StoreError::QueryFailed {
            reason: "relation \"orders\" does not exist".to_string(),
        }
        .into();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("relation"));
    }

    #[test]
    fn test_connect_failure_is_unavailable() {
        let err: ApiError = StoreError::ConnectFailed {
            attempts: 5,
            reason: "connection refused".to_string(),
        }
        .into();

        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_non_store_error_is_internal() {
        let err: ApiError = OrderError::from(DecodeError::Malformed {
            reason: "eof".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn test_serialized_code() {
        let json = serde_json::to_value(ApiError::order_not_found()).unwrap();
        assert_eq!(json["code"], "ORDER_NOT_FOUND");
        assert_eq!(json["message"], "order not found");
    }
}
