//! Operator endpoints (bearer `ADMIN_API_TOKEN`)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shopledger_billing::{SubscriptionEvent, SubscriptionEventReason};
use shopledger_shared::{KycStatus, PayoutRequest, PayoutStatus};
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

/// Payouts awaiting operator action, oldest first
pub async fn list_pending_payouts(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PayoutRequest>>> {
    Ok(Json(state.billing.payouts.list_pending().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePayoutBody {
    pub status: PayoutStatus,
    pub notes: Option<String>,
}

pub async fn update_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
    Json(req): Json<UpdatePayoutBody>,
) -> ApiResult<Json<PayoutRequest>> {
    let updated = state
        .billing
        .payouts
        .update_status(payout_id, req.status, req.notes)
        .await?;

    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct IdentityResultBody {
    pub status: KycStatus,
    pub account_name: Option<String>,
}

/// Record the identity verification result for a storefront
pub async fn record_identity(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
    Json(req): Json<IdentityResultBody>,
) -> ApiResult<StatusCode> {
    state
        .billing
        .store
        .record_identity_verification(storefront_id, req.status, req.account_name.as_deref())
        .await?;

    tracing::info!(
        storefront_id = %storefront_id,
        status = ?req.status,
        "Identity verification recorded"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ExtendBody {
    pub days: i64,
}

pub async fn extend_subscription(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<ExtendBody>,
) -> ApiResult<Json<SubscriptionEvent>> {
    let event = state
        .billing
        .subscriptions
        .extend(account_id, req.days, SubscriptionEventReason::AdminExtension)
        .await?;

    Ok(Json(event))
}

#[derive(Debug, Serialize)]
pub struct RewardedResponse {
    pub referral_id: Uuid,
    pub changed: bool,
}

pub async fn mark_referral_rewarded(
    State(state): State<AppState>,
    Path(referral_id): Path<Uuid>,
) -> ApiResult<Json<RewardedResponse>> {
    let changed = state.billing.referrals.mark_rewarded(referral_id).await?;
    Ok(Json(RewardedResponse {
        referral_id,
        changed,
    }))
}
