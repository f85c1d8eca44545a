//! Subscription status endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use shopledger_billing::{SubscriptionEvent, SubscriptionSummary};
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionSummary>> {
    Ok(Json(state.billing.subscriptions.summary(account_id).await?))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubscriptionEvent>>> {
    Ok(Json(state.billing.subscriptions.history(account_id).await?))
}

#[derive(Debug, Serialize)]
pub struct TrialResponse {
    pub granted: bool,
    pub event: Option<SubscriptionEvent>,
    pub subscription: SubscriptionSummary,
}

/// Grant the signup trial; a second call is a no-op
pub async fn start_trial(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<TrialResponse>> {
    let subscriptions = &state.billing.subscriptions;
    let event = subscriptions.start_trial(account_id).await?;

    Ok(Json(TrialResponse {
        granted: event.is_some(),
        event,
        subscription: subscriptions.summary(account_id).await?,
    }))
}
