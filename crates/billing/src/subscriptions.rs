//! Subscription lifecycle
//!
//! Expiry dates only ever move through [`extended_expiry`]: the new expiry is
//! `max(now, current) + days`, so back-to-back renewals stack and a renewal
//! after lapse never credits time that has already passed.

use std::sync::Arc;

use serde::Serialize;
use shopledger_shared::{Account, BillingCycle, PlanTier, SubscriptionStatus};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::{Plan, SubscriptionConfig};
use crate::entitlement::Entitlement;
use crate::error::{BillingError, BillingResult};
use crate::events::{SubscriptionEvent, SubscriptionEventReason};
use crate::store::{ExtensionOutcome, LedgerStore, SubscriptionExtension};

/// Longest extension a single operator call may grant
pub const MAX_EXTENSION_DAYS: i64 = 3_650;

const SECONDS_PER_DAY: i64 = 86_400;

/// New expiry after adding `days` to the later of `now` and `current`
///
/// Fails with `InvalidInput` instead of overflowing the calendar.
pub fn extended_expiry(
    current: Option<OffsetDateTime>,
    now: OffsetDateTime,
    days: i64,
) -> BillingResult<OffsetDateTime> {
    let base = match current {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    days.checked_mul(SECONDS_PER_DAY)
        .map(Duration::seconds)
        .and_then(|added| base.checked_add(added))
        .ok_or_else(|| {
            BillingError::InvalidInput(format!("Extending by {} days is out of range", days))
        })
}

/// Subscription state as shown to the account owner
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub account_id: Uuid,
    pub status: SubscriptionStatus,
    pub plan_tier: PlanTier,
    pub effective_tier: PlanTier,
    pub is_subscribed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// Whole days left, 0 once expired
    pub days_remaining: i64,
}

impl SubscriptionSummary {
    pub fn from_account(account: &Account, config: &SubscriptionConfig, now: OffsetDateTime) -> Self {
        let entitlement = Entitlement::compute(account, config, now);
        let days_remaining = account
            .subscription_expires_at
            .map(|expiry| (expiry - now).whole_days().max(0))
            .unwrap_or(0);

        Self {
            account_id: account.id,
            status: entitlement.status,
            plan_tier: entitlement.plan_tier,
            effective_tier: entitlement.effective_tier,
            is_subscribed: account.is_subscribed,
            expires_at: account.subscription_expires_at,
            days_remaining,
        }
    }
}

/// A confirmed plan payment to apply
#[derive(Debug, Clone)]
pub struct PlanPayment<'a> {
    pub account_id: Uuid,
    pub plan: &'a Plan,
    pub cycle: BillingCycle,
    pub payment_reference: &'a str,
    pub now: OffsetDateTime,
}

/// Subscription lifecycle manager
#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn LedgerStore>,
    config: SubscriptionConfig,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn LedgerStore>, config: SubscriptionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    async fn account(&self, account_id: Uuid) -> BillingResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(BillingError::AccountNotFound(account_id))
    }

    /// Current subscription state of an account
    pub async fn summary(&self, account_id: Uuid) -> BillingResult<SubscriptionSummary> {
        let account = self.account(account_id).await?;
        Ok(SubscriptionSummary::from_account(
            &account,
            &self.config,
            OffsetDateTime::now_utc(),
        ))
    }

    pub async fn entitlement(&self, account_id: Uuid, now: OffsetDateTime) -> BillingResult<Entitlement> {
        let account = self.account(account_id).await?;
        Ok(Entitlement::compute(&account, &self.config, now))
    }

    /// Grant the signup trial; `None` if the account already had an expiry
    pub async fn start_trial(&self, account_id: Uuid) -> BillingResult<Option<SubscriptionEvent>> {
        let event = self
            .store
            .start_trial(account_id, self.config.trial_days, OffsetDateTime::now_utc())
            .await?;

        match &event {
            Some(event) => tracing::info!(
                account_id = %account_id,
                expires_at = %event.new_expires_at,
                "Trial started"
            ),
            None => tracing::debug!(account_id = %account_id, "Trial not granted, account already has an expiry"),
        }

        Ok(event)
    }

    /// Apply a confirmed plan payment, settling its reference
    pub async fn apply_plan_payment(&self, payment: PlanPayment<'_>) -> BillingResult<ExtensionOutcome> {
        let days = payment.cycle.days();
        let outcome = self
            .store
            .extend_subscription(SubscriptionExtension {
                account_id: payment.account_id,
                added_days: days,
                reason: SubscriptionEventReason::PaymentRenewal,
                payment_reference: Some(payment.payment_reference.to_string()),
                plan_id: Some(payment.plan.id.clone()),
                plan_tier: Some(payment.plan.tier),
                now: payment.now,
            })
            .await?;

        if let ExtensionOutcome::Applied(event) = &outcome {
            tracing::info!(
                account_id = %payment.account_id,
                plan_id = %payment.plan.id,
                cycle = %payment.cycle,
                reference = %payment.payment_reference,
                previous_expires_at = ?event.previous_expires_at,
                new_expires_at = %event.new_expires_at,
                "Subscription extended by payment"
            );
        }

        Ok(outcome)
    }

    /// Operator extension without payment
    pub async fn extend(
        &self,
        account_id: Uuid,
        days: i64,
        reason: SubscriptionEventReason,
    ) -> BillingResult<SubscriptionEvent> {
        if days <= 0 {
            return Err(BillingError::InvalidInput(
                "Extension must add at least one day".to_string(),
            ));
        }
        if days > MAX_EXTENSION_DAYS {
            return Err(BillingError::InvalidInput(format!(
                "Extension of {} days exceeds the limit of {}",
                days, MAX_EXTENSION_DAYS
            )));
        }

        let outcome = self
            .store
            .extend_subscription(SubscriptionExtension {
                account_id,
                added_days: days,
                reason,
                payment_reference: None,
                plan_id: None,
                plan_tier: None,
                now: OffsetDateTime::now_utc(),
            })
            .await?;

        match outcome {
            ExtensionOutcome::Applied(event) => {
                tracing::info!(
                    account_id = %account_id,
                    days,
                    reason = %reason,
                    new_expires_at = %event.new_expires_at,
                    "Subscription extended"
                );
                Ok(event)
            }
            // Only reachable with a payment reference
            ExtensionOutcome::AlreadySettled => Err(BillingError::Internal(
                "Unreferenced extension reported as already settled".to_string(),
            )),
        }
    }

    /// Audit trail of expiry changes, newest first
    pub async fn history(&self, account_id: Uuid) -> BillingResult<Vec<SubscriptionEvent>> {
        self.account(account_id).await?;
        self.store.subscription_history(account_id).await
    }
}
