//! Referral ambassador endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use shopledger_billing::ReferralEvaluation;
use shopledger_shared::ReferralTierGrant;
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

pub async fn evaluate(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<ReferralEvaluation>> {
    Ok(Json(state.billing.referrals.evaluate(account_id).await?))
}

pub async fn list_grants(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReferralTierGrant>>> {
    Ok(Json(state.billing.referrals.grants(account_id).await?))
}
