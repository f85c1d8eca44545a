//! Seller endpoints: balance, payouts, revenue, split-payment setup

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shopledger_billing::SubaccountSetup;
use shopledger_shared::{BankDetails, PayoutRequest, RevenueTransaction};
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub storefront_id: Uuid,
    pub available_minor: i64,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
) -> ApiResult<Json<BalanceResponse>> {
    let available_minor = state.billing.payouts.available_balance(storefront_id).await?;
    Ok(Json(BalanceResponse {
        storefront_id,
        available_minor,
    }))
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PayoutRequest>>> {
    Ok(Json(state.billing.payouts.history(storefront_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequestBody {
    pub amount_minor: i64,
    pub bank_details: BankDetails,
}

/// Request a withdrawal; needs a verified identity on the storefront
pub async fn request_payout(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
    Json(req): Json<PayoutRequestBody>,
) -> ApiResult<(StatusCode, Json<PayoutRequest>)> {
    let payouts = &state.billing.payouts;
    payouts.ensure_eligible(storefront_id).await?;

    let request = payouts
        .request_payout(storefront_id, req.amount_minor, req.bank_details)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_revenue(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RevenueTransaction>>> {
    Ok(Json(state.billing.payouts.revenue(storefront_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubaccountBody {
    pub bank_code: String,
    pub account_number: String,
}

pub async fn create_subaccount(
    State(state): State<AppState>,
    Path(storefront_id): Path<Uuid>,
    Json(req): Json<SubaccountBody>,
) -> ApiResult<(StatusCode, Json<SubaccountSetup>)> {
    let setup = state
        .billing
        .subaccounts
        .create_subaccount(storefront_id, &req.bank_code, &req.account_number)
        .await?;

    Ok((StatusCode::CREATED, Json(setup)))
}
