//! Billing error types

use thiserror::Error;
use uuid::Uuid;

/// Billing-specific errors
///
/// Variants fall into three groups: policy rejections (expected outcomes the
/// caller reports back), upstream failures (retryable), and invariant
/// violations (fatal to the enclosing operation, surfaced for manual review).
#[derive(Debug, Error)]
pub enum BillingError {
    // Policy rejections
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Withdrawal of {requested_minor} is below the minimum of {minimum_minor}")]
    BelowMinimum {
        requested_minor: i64,
        minimum_minor: i64,
    },

    #[error("Withdrawal of {requested_minor} exceeds available balance of {available_minor}")]
    InsufficientBalance {
        requested_minor: i64,
        available_minor: i64,
    },

    #[error("Feature '{feature}' is not available on the {tier} plan")]
    BlockedByPlan { feature: String, tier: String },

    #[error("Usage quota exhausted for '{feature}' ({used}/{limit})")]
    QuotaExceeded {
        feature: String,
        used: i64,
        limit: u64,
    },

    #[error("Invalid payout status transition: {from} -> {to}")]
    InvalidPayoutTransition { from: String, to: String },

    #[error("Payout not allowed: {0}")]
    PayoutNotEligible(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Upstream failures
    #[error("Payment processor unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment processor error: {0}")]
    Gateway(String),

    // Invariant violations
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Storefront not found: {0}")]
    StorefrontNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Payout request not found: {0}")]
    PayoutNotFound(Uuid),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Malformed payment metadata: {0}")]
    InvalidMetadata(String),

    #[error("Concurrent modification detected: {0}")]
    ConcurrentModification(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Expected, non-fatal outcome to report back to the caller
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            BillingError::WebhookSignatureInvalid
                | BillingError::BelowMinimum { .. }
                | BillingError::InsufficientBalance { .. }
                | BillingError::BlockedByPlan { .. }
                | BillingError::QuotaExceeded { .. }
                | BillingError::InvalidPayoutTransition { .. }
                | BillingError::PayoutNotEligible(_)
                | BillingError::AlreadyExists(_)
                | BillingError::InvalidInput(_)
        )
    }

    /// Upstream was unavailable; the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::GatewayUnavailable(_) | BillingError::ConcurrentModification(_)
        )
    }

    /// Fatal to the enclosing operation and needs manual reconciliation
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            BillingError::AccountNotFound(_)
                | BillingError::StorefrontNotFound(_)
                | BillingError::OrderNotFound(_)
                | BillingError::UnknownPlan(_)
                | BillingError::InvalidMetadata(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            BillingError::GatewayUnavailable(err.to_string())
        } else {
            BillingError::Gateway(err.to_string())
        }
    }
}

impl From<shopledger_shared::ShopError> for BillingError {
    fn from(err: shopledger_shared::ShopError) -> Self {
        BillingError::InvalidInput(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
