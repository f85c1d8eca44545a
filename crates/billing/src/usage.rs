//! Feature usage gate
//!
//! Answers "can this account use feature X right now?" from the effective
//! tier and the calendar-month usage counter, and records confirmed uses.

use std::sync::Arc;

use serde::Serialize;
use shopledger_shared::{PlanTier, SubscriptionStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::{FeatureLimit, PlanCatalog};
use crate::error::{BillingError, BillingResult};
use crate::store::LedgerStore;
use crate::subscriptions::SubscriptionManager;

/// Counter period key: UTC calendar month, `YYYY-MM`
pub fn usage_period(now: OffsetDateTime) -> String {
    let now = now.to_offset(time::UtcOffset::UTC);
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

/// Result of a usage check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageCheck {
    pub feature: String,
    pub can_use: bool,
    /// Feature is gated off the effective tier regardless of usage
    pub blocked_by_plan: bool,
    pub current_usage: i64,
    /// `None` means unlimited
    pub max_usage: Option<u64>,
    pub tier: PlanTier,
    pub status: SubscriptionStatus,
    pub period: String,
}

impl UsageCheck {
    fn evaluate(
        feature: &str,
        limit: FeatureLimit,
        current_usage: i64,
        tier: PlanTier,
        status: SubscriptionStatus,
        period: String,
    ) -> Self {
        let (can_use, blocked_by_plan, max_usage) = match limit {
            FeatureLimit::Blocked => (false, true, Some(0)),
            FeatureLimit::Unlimited => (true, false, None),
            FeatureLimit::Limited(max) => ((current_usage.max(0) as u64) < max, false, Some(max)),
        };

        Self {
            feature: feature.to_string(),
            can_use,
            blocked_by_plan,
            current_usage,
            max_usage,
            tier,
            status,
            period,
        }
    }

    /// Convert a denied check into the matching error
    pub fn into_result(self) -> BillingResult<Self> {
        if self.blocked_by_plan {
            return Err(BillingError::BlockedByPlan {
                feature: self.feature,
                tier: self.tier.to_string(),
            });
        }
        if !self.can_use {
            return Err(BillingError::QuotaExceeded {
                feature: self.feature,
                used: self.current_usage,
                limit: self.max_usage.unwrap_or(0),
            });
        }
        Ok(self)
    }
}

/// Quota gate over the plan catalog and usage counters
#[derive(Clone)]
pub struct UsageGate {
    store: Arc<dyn LedgerStore>,
    subscriptions: SubscriptionManager,
    catalog: Arc<PlanCatalog>,
}

impl UsageGate {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        subscriptions: SubscriptionManager,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            subscriptions,
            catalog,
        }
    }

    /// Check whether the account may use `feature` now
    pub async fn check(&self, account_id: Uuid, feature: &str) -> BillingResult<UsageCheck> {
        self.check_at(account_id, feature, OffsetDateTime::now_utc())
            .await
    }

    pub async fn check_at(
        &self,
        account_id: Uuid,
        feature: &str,
        now: OffsetDateTime,
    ) -> BillingResult<UsageCheck> {
        let entitlement = self.subscriptions.entitlement(account_id, now).await?;
        let limit = self
            .catalog
            .feature_limit(entitlement.effective_tier, feature);
        let period = usage_period(now);

        // Plan gating comes before the counter
        let current_usage = if limit == FeatureLimit::Blocked {
            0
        } else {
            self.store
                .current_usage(account_id, feature, &period)
                .await?
        };

        Ok(UsageCheck::evaluate(
            feature,
            limit,
            current_usage,
            entitlement.effective_tier,
            entitlement.status,
            period,
        ))
    }

    /// Check and fail with `BlockedByPlan` / `QuotaExceeded` when denied
    pub async fn authorize(&self, account_id: Uuid, feature: &str) -> BillingResult<UsageCheck> {
        let check = self.check(account_id, feature).await?;
        if !check.can_use {
            tracing::warn!(
                account_id = %account_id,
                feature = %feature,
                tier = %check.tier,
                blocked_by_plan = check.blocked_by_plan,
                current_usage = check.current_usage,
                "Feature use denied"
            );
        }
        check.into_result()
    }

    /// Record one confirmed use; returns the new count for the period
    pub async fn increment(&self, account_id: Uuid, feature: &str) -> BillingResult<i64> {
        let period = usage_period(OffsetDateTime::now_utc());
        let count = self
            .store
            .increment_usage(account_id, feature, &period)
            .await?;

        tracing::debug!(
            account_id = %account_id,
            feature = %feature,
            period = %period,
            count,
            "Feature usage recorded"
        );

        Ok(count)
    }
}
