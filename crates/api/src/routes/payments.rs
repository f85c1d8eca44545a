//! Payment confirmation and checkout endpoints
//!
//! Both the verify path and the webhook path end in the same idempotent
//! reconciliation, so either may arrive first.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use shopledger_billing::{BillingError, CheckoutSession, ReconcileOutcome};
use shopledger_shared::BillingCycle;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Header carrying the hex HMAC-SHA512 of the raw body
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Invariant violations answer 500 so the processor redelivers
fn reconcile_error(err: BillingError) -> ApiError {
    if err.is_invariant_violation() {
        ApiError::Internal
    } else {
        err.into()
    }
}

/// Processor webhook; the body is kept raw for signature verification
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ReconcileOutcome>> {
    tracing::info!(body_len = body.len(), "Payment webhook received");

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state
        .billing
        .reconciler
        .reconcile_webhook(&body, signature)
        .await
        .map_err(reconcile_error)?;

    tracing::info!(outcome = ?outcome, "Payment webhook processed");
    Ok(Json(outcome))
}

/// Customer returned from checkout; ask the processor and settle
pub async fn verify(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let outcome = state
        .billing
        .reconciler
        .reconcile_verification(&reference)
        .await
        .map_err(reconcile_error)?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct OrderCheckoutRequest {
    pub email: String,
}

pub async fn initialize_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<OrderCheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    let session = state
        .billing
        .checkout
        .initialize_order_payment(order_id, &req.email)
        .await?;

    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCheckoutRequest {
    pub account_id: Uuid,
    pub plan_id: String,
    pub billing_cycle: BillingCycle,
    pub email: String,
}

pub async fn initialize_subscription(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionCheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    let session = state
        .billing
        .checkout
        .initialize_subscription_payment(req.account_id, &req.plan_id, req.billing_cycle, &req.email)
        .await?;

    Ok(Json(session))
}
