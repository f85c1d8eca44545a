//! Bank directory endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shopledger_billing::{Bank, ResolvedAccount};

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct BankListQuery {
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "nigeria".to_string()
}

/// Never fails; serves the cached list when the processor is down
pub async fn list_banks(
    State(state): State<AppState>,
    Query(query): Query<BankListQuery>,
) -> Json<Vec<Bank>> {
    Json(state.billing.subaccounts.list_banks(&query.country).await)
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub account_number: String,
    pub bank_code: String,
}

pub async fn resolve_account(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<Json<ResolvedAccount>> {
    let resolved = state
        .billing
        .subaccounts
        .resolve_account(&query.account_number, &query.bank_code)
        .await?;

    Ok(Json(resolved))
}
