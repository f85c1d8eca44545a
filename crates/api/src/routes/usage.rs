//! Feature usage endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use shopledger_billing::UsageCheck;
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

/// Whether the account may use a feature right now
pub async fn check_usage(
    State(state): State<AppState>,
    Path((account_id, feature)): Path<(Uuid, String)>,
) -> ApiResult<Json<UsageCheck>> {
    Ok(Json(state.billing.usage.check(account_id, &feature).await?))
}

#[derive(Debug, Serialize)]
pub struct RecordedUsage {
    pub feature: String,
    pub current_usage: i64,
    pub max_usage: Option<u64>,
    pub period: String,
}

/// Record one confirmed use of a feature
///
/// Denied with 402 when the plan blocks the feature or the quota is spent.
pub async fn record_usage(
    State(state): State<AppState>,
    Path((account_id, feature)): Path<(Uuid, String)>,
) -> ApiResult<Json<RecordedUsage>> {
    let usage = &state.billing.usage;
    let check = usage.authorize(account_id, &feature).await?;
    let current_usage = usage.increment(account_id, &feature).await?;

    Ok(Json(RecordedUsage {
        feature,
        current_usage,
        max_usage: check.max_usage,
        period: check.period,
    }))
}
