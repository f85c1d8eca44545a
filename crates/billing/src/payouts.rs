//! Payout ledger
//!
//! Balance is derived, never stored: revenue minus every payout that is
//! pending, processing or completed. A request reserves its amount the moment
//! it is created, and the balance check and insert run as one critical
//! section per storefront inside the ledger store.

use std::sync::Arc;

use shopledger_shared::{
    BankDetails, KycStatus, PayoutRequest, PayoutStatus, RevenueTransaction, Storefront,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::email::{BillingEmailService, Notification};
use crate::error::{BillingError, BillingResult};
use crate::store::{LedgerStore, NewPayout, PayoutCreation, PayoutTransition};

/// Smallest withdrawal a seller may request (₦1,000)
pub const MIN_WITHDRAWAL_MINOR: i64 = 100_000;

/// Statuses awaiting operator action
const AWAITING_OPERATOR: [PayoutStatus; 2] = [PayoutStatus::Pending, PayoutStatus::Processing];

#[derive(Clone)]
pub struct PayoutLedger {
    store: Arc<dyn LedgerStore>,
    email: BillingEmailService,
}

impl PayoutLedger {
    pub fn new(store: Arc<dyn LedgerStore>, email: BillingEmailService) -> Self {
        Self { store, email }
    }

    async fn storefront(&self, storefront_id: Uuid) -> BillingResult<Storefront> {
        self.store
            .get_storefront(storefront_id)
            .await?
            .ok_or(BillingError::StorefrontNotFound(storefront_id))
    }

    pub async fn available_balance(&self, storefront_id: Uuid) -> BillingResult<i64> {
        self.storefront(storefront_id).await?;
        self.store.available_balance(storefront_id).await
    }

    /// Payouts require a verified identity on the storefront
    pub async fn ensure_eligible(&self, storefront_id: Uuid) -> BillingResult<()> {
        let storefront = self.storefront(storefront_id).await?;
        match storefront.kyc_status {
            KycStatus::Verified => Ok(()),
            KycStatus::Pending => Err(BillingError::PayoutNotEligible(
                "identity verification is still pending".to_string(),
            )),
            KycStatus::Failed => Err(BillingError::PayoutNotEligible(
                "identity verification failed".to_string(),
            )),
        }
    }

    /// Create a pending payout request reserving `amount_minor`
    pub async fn request_payout(
        &self,
        storefront_id: Uuid,
        amount_minor: i64,
        bank_details: BankDetails,
    ) -> BillingResult<PayoutRequest> {
        if amount_minor < MIN_WITHDRAWAL_MINOR {
            return Err(BillingError::BelowMinimum {
                requested_minor: amount_minor,
                minimum_minor: MIN_WITHDRAWAL_MINOR,
            });
        }
        if bank_details.bank_code.trim().is_empty() || bank_details.account_number.trim().is_empty()
        {
            return Err(BillingError::InvalidInput(
                "Bank code and account number are required".to_string(),
            ));
        }

        let creation = self
            .store
            .create_payout_if_funded(NewPayout {
                storefront_id,
                amount_minor,
                bank_details,
                now: OffsetDateTime::now_utc(),
            })
            .await?;

        match creation {
            PayoutCreation::Created(request) => {
                tracing::info!(
                    storefront_id = %storefront_id,
                    payout_id = %request.id,
                    amount_minor,
                    "Payout requested"
                );
                Ok(request)
            }
            PayoutCreation::InsufficientBalance { available_minor } => {
                tracing::warn!(
                    storefront_id = %storefront_id,
                    amount_minor,
                    available_minor,
                    "Payout rejected: insufficient balance"
                );
                Err(BillingError::InsufficientBalance {
                    requested_minor: amount_minor,
                    available_minor,
                })
            }
        }
    }

    /// Requests awaiting operator action, oldest first
    pub async fn list_pending(&self) -> BillingResult<Vec<PayoutRequest>> {
        self.store.list_payouts_by_status(&AWAITING_OPERATOR).await
    }

    /// Operator status change; validates the state machine and applies it
    /// only if nobody changed the request in between
    pub async fn update_status(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        notes: Option<String>,
    ) -> BillingResult<PayoutRequest> {
        let current = self
            .store
            .get_payout(payout_id)
            .await?
            .ok_or(BillingError::PayoutNotFound(payout_id))?;

        if !current.status.can_transition_to(status) {
            return Err(BillingError::InvalidPayoutTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let updated = self
            .store
            .transition_payout(PayoutTransition {
                payout_id,
                from: current.status,
                to: status,
                notes,
                now: OffsetDateTime::now_utc(),
            })
            .await?
            .ok_or_else(|| {
                BillingError::ConcurrentModification(format!(
                    "payout {} changed while updating",
                    payout_id
                ))
            })?;

        tracing::info!(
            payout_id = %payout_id,
            storefront_id = %updated.storefront_id,
            from = %current.status,
            to = %updated.status,
            "Payout status updated"
        );

        self.notify_seller(&updated).await;
        Ok(updated)
    }

    async fn notify_seller(&self, payout: &PayoutRequest) {
        let owner = match self.store.get_storefront(payout.storefront_id).await {
            Ok(Some(storefront)) => self.store.get_account(storefront.account_id).await,
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match owner {
            Ok(Some(account)) => self.email.dispatch(Notification::PayoutStatusChanged {
                to: account.email,
                amount_minor: payout.amount_minor,
                status: payout.status,
                notes: payout.admin_notes.clone(),
            }),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                payout_id = %payout.id,
                error = %e,
                "Could not look up seller for payout notification"
            ),
        }
    }

    /// Payout history for a storefront, newest first
    pub async fn history(&self, storefront_id: Uuid) -> BillingResult<Vec<PayoutRequest>> {
        self.storefront(storefront_id).await?;
        self.store.list_payouts(storefront_id).await
    }

    /// Revenue history for a storefront, newest first
    pub async fn revenue(&self, storefront_id: Uuid) -> BillingResult<Vec<RevenueTransaction>> {
        self.storefront(storefront_id).await?;
        self.store.revenue_for_storefront(storefront_id).await
    }
}
