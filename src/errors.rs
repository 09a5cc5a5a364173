use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::{error::DbErr, TransactionError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

/// Reasons a coupon cannot be applied, in the order they are checked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon is not yet active")]
    NotYetActive,
    #[error("Coupon usage limit has been reached")]
    UsageExceeded,
    #[error("You have already used this coupon")]
    AlreadyUsedByUser,
    #[error("Minimum order amount of {minimum} required for this coupon")]
    BelowMinimum { minimum: Decimal },
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Insufficient stock for {product}, available: {available}")]
    InsufficientStock { product: String, available: i32 },

    #[error("{0}")]
    CouponRejected(CouponRejection),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Order cannot be cancelled: {0}")]
    NotCancellable(String),

    #[error("Payment has not succeeded yet (status: {0})")]
    PaymentNotSucceeded(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<CouponRejection> for ServiceError {
    fn from(rejection: CouponRejection) -> Self {
        ServiceError::CouponRejected(rejection)
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db) => ServiceError::DatabaseError(db),
            TransactionError::Transaction(inner) => inner,
        }
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CouponRejected(CouponRejection::NotFound) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::BadRequest(_)
            | Self::ProductUnavailable(_)
            | Self::InsufficientStock { .. }
            | Self::CouponRejected(_)
            | Self::InvalidTransition { .. }
            | Self::NotCancellable(_)
            | Self::PaymentNotSucceeded(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InvariantViolation(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InvariantViolation(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::ConcurrentModification(id) => {
                format!("Order {} was modified concurrently, retry the request", id)
            }
            _ => self.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::DatabaseError(db) => matches!(db, DbErr::ConnectionAcquire(_) | DbErr::Conn(_)),
            _ => false,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.response_message();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn engine_errors_map_to_client_statuses() {
        assert_eq!(
            ServiceError::InsufficientStock {
                product: "Lavender Dream".into(),
                available: 3
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                from: "delivered".into(),
                to: "cancelled".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::CouponRejected(CouponRejection::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::CouponRejected(CouponRejection::UsageExceeded).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ConcurrentModification(Uuid::new_v4()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn insufficient_stock_message_names_product_and_available_quantity() {
        let err = ServiceError::InsufficientStock {
            product: "Lavender Dream".into(),
            available: 3,
        };
        assert_eq!(
            err.response_message(),
            "Insufficient stock for Lavender Dream, available: 3"
        );
    }

    #[test]
    fn coupon_rejection_messages_are_user_facing() {
        let err: ServiceError = CouponRejection::BelowMinimum { minimum: dec!(200) }.into();
        assert_eq!(
            err.response_message(),
            "Minimum order amount of 200 required for this coupon"
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        assert_eq!(
            ServiceError::InvariantViolation("stock below zero".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).response_message(),
            "Database error"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ServiceError::ServiceUnavailable("timeout".into()).is_retryable());
        assert!(!ServiceError::PaymentNotSucceeded("processing".into()).is_retryable());
        assert!(!ServiceError::ExternalServiceError("bad payload".into()).is_retryable());
    }
}
