//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shopledger_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Operator endpoints are disabled")]
    AdminDisabled,

    // Validation
    #[error("Validation error: {0}")]
    Validation(String),

    // Resources
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),

    // Ledger policy
    #[error("{0}")]
    BelowMinimum(String),
    #[error("{0}")]
    InsufficientBalance(String),
    #[error("{0}")]
    PayoutNotEligible(String),
    #[error("{0}")]
    InvalidTransition(String),

    // Plan gating
    #[error("{0}")]
    BlockedByPlan(String),
    #[error("{0}")]
    QuotaExceeded(String),

    // Upstream
    #[error("{0}")]
    ProcessorError(String),
    #[error("{0}")]
    ServiceUnavailable(String),

    // Internal
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::AdminDisabled => (StatusCode::FORBIDDEN, "ADMIN_DISABLED", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),

            // Resources
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Ledger policy
            ApiError::BelowMinimum(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "BELOW_MINIMUM", msg.clone()),
            ApiError::InsufficientBalance(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_BALANCE", msg.clone()),
            ApiError::PayoutNotEligible(msg) => (StatusCode::FORBIDDEN, "PAYOUT_NOT_ELIGIBLE", msg.clone()),
            ApiError::InvalidTransition(msg) => (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone()),

            // Plan gating
            ApiError::BlockedByPlan(msg) => (StatusCode::PAYMENT_REQUIRED, "BLOCKED_BY_PLAN", msg.clone()),
            ApiError::QuotaExceeded(msg) => (StatusCode::PAYMENT_REQUIRED, "QUOTA_EXCEEDED", msg.clone()),

            // Upstream
            ApiError::ProcessorError(msg) => (StatusCode::BAD_GATEWAY, "PROCESSOR_ERROR", msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.clone()),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let message = err.to_string();
        match err {
            BillingError::WebhookSignatureInvalid => ApiError::InvalidSignature,
            BillingError::BelowMinimum { .. } => ApiError::BelowMinimum(message),
            BillingError::InsufficientBalance { .. } => ApiError::InsufficientBalance(message),
            BillingError::BlockedByPlan { .. } => ApiError::BlockedByPlan(message),
            BillingError::QuotaExceeded { .. } => ApiError::QuotaExceeded(message),
            BillingError::InvalidPayoutTransition { .. } => ApiError::InvalidTransition(message),
            BillingError::PayoutNotEligible(_) => ApiError::PayoutNotEligible(message),
            BillingError::AlreadyExists(_) => ApiError::Conflict(message),
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),

            BillingError::GatewayUnavailable(_) | BillingError::ConcurrentModification(_) => {
                tracing::warn!(error = %message, "Retryable failure");
                ApiError::ServiceUnavailable(message)
            }
            BillingError::Gateway(msg) => ApiError::ProcessorError(msg),

            // A missing path resource is the caller's mistake
            BillingError::AccountNotFound(_)
            | BillingError::StorefrontNotFound(_)
            | BillingError::OrderNotFound(_)
            | BillingError::PayoutNotFound(_) => ApiError::NotFound(message),

            BillingError::UnknownPlan(_)
            | BillingError::InvalidMetadata(_)
            | BillingError::Database(_)
            | BillingError::Config(_)
            | BillingError::Internal(_) => {
                tracing::error!(error = %message, "Request failed");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
