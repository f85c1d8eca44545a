//! Seller settlement accounts
//!
//! Bank listing and account-name resolution, and the split-payment
//! subaccount that routes a seller's share of each order. A storefront's
//! subaccount is set exactly once.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::client::{Bank, PaymentGateway, ResolvedAccount, SubaccountRequest};
use crate::error::{BillingError, BillingResult};
use crate::store::LedgerStore;

/// Result of linking a storefront to a subaccount
#[derive(Debug, Clone, Serialize)]
pub struct SubaccountSetup {
    pub storefront_id: Uuid,
    pub subaccount_code: String,
    /// Name registered on the settlement bank account
    pub account_name: String,
}

#[derive(Clone)]
pub struct SubaccountService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<PaymentGateway>,
}

impl SubaccountService {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Banks for a country; never fails, falls back to the cached list
    pub async fn list_banks(&self, country: &str) -> Vec<Bank> {
        self.gateway.list_banks_or_cached(country).await
    }

    pub async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> BillingResult<ResolvedAccount> {
        if account_number.len() != 10 || !account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(BillingError::InvalidInput(
                "Account number must be 10 digits".to_string(),
            ));
        }
        self.gateway.resolve_account(account_number, bank_code).await
    }

    /// Create the processor subaccount for a storefront and store its code
    pub async fn create_subaccount(
        &self,
        storefront_id: Uuid,
        bank_code: &str,
        account_number: &str,
    ) -> BillingResult<SubaccountSetup> {
        let storefront = self
            .store
            .get_storefront(storefront_id)
            .await?
            .ok_or(BillingError::StorefrontNotFound(storefront_id))?;

        if storefront.payment_subaccount_reference.is_some() {
            return Err(BillingError::AlreadyExists(format!(
                "storefront {} already has a subaccount",
                storefront_id
            )));
        }

        let resolved = self.resolve_account(account_number, bank_code).await?;

        let subaccount = self
            .gateway
            .create_subaccount(&SubaccountRequest {
                business_name: storefront.name.clone(),
                settlement_bank: bank_code.to_string(),
                account_number: account_number.to_string(),
                percentage_charge: storefront.commission_percent,
            })
            .await?;

        let stored = self
            .store
            .set_subaccount_reference(storefront_id, &subaccount.subaccount_code)
            .await?;

        let subaccount_code = if stored {
            tracing::info!(
                storefront_id = %storefront_id,
                subaccount = %subaccount.subaccount_code,
                "Subaccount linked to storefront"
            );
            subaccount.subaccount_code
        } else {
            // A concurrent request linked first; keep the stored code
            let existing = self
                .store
                .get_storefront(storefront_id)
                .await?
                .and_then(|s| s.payment_subaccount_reference)
                .ok_or(BillingError::StorefrontNotFound(storefront_id))?;
            tracing::warn!(
                storefront_id = %storefront_id,
                orphaned = %subaccount.subaccount_code,
                kept = %existing,
                "Subaccount already linked, discarding the new one"
            );
            existing
        };

        Ok(SubaccountSetup {
            storefront_id,
            subaccount_code,
            account_name: resolved.account_name,
        })
    }
}
