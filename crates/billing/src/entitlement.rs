//! Entitlement Module
//!
//! Answers "which tier's limits apply to this account right now?".
//!
//! Status is never stored; it is derived from the expiry date and the paid
//! flag at the moment of the question:
//!
//! | expiry          | is_subscribed | status  | effective tier                 |
//! |-----------------|---------------|---------|--------------------------------|
//! | null or past    | any           | expired | lapsed tier                    |
//! | future          | true          | active  | purchased `plan_tier`          |
//! | future          | false         | trial   | max(`plan_tier`, trial tier)   |

use serde::Serialize;
use shopledger_shared::{Account, PlanTier, SubscriptionStatus};
use time::OffsetDateTime;

use crate::config::SubscriptionConfig;

/// Derive the subscription status of an account at `now`
pub fn derive_status(account: &Account, now: OffsetDateTime) -> SubscriptionStatus {
    match account.subscription_expires_at {
        Some(expires_at) if expires_at > now => {
            if account.is_subscribed {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Trial
            }
        }
        _ => SubscriptionStatus::Expired,
    }
}

/// Tier whose limits apply for a given status
pub fn effective_tier(
    plan_tier: PlanTier,
    status: SubscriptionStatus,
    config: &SubscriptionConfig,
) -> PlanTier {
    match status {
        SubscriptionStatus::Active => plan_tier,
        SubscriptionStatus::Trial => plan_tier.max(config.trial_tier),
        SubscriptionStatus::Expired => config.lapsed_tier,
    }
}

/// Point-in-time entitlement of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub status: SubscriptionStatus,
    /// Tier the account paid for
    pub plan_tier: PlanTier,
    /// Tier whose limits currently apply
    pub effective_tier: PlanTier,
}

impl Entitlement {
    pub fn compute(account: &Account, config: &SubscriptionConfig, now: OffsetDateTime) -> Self {
        let status = derive_status(account, now);
        Self {
            status,
            plan_tier: account.plan_tier,
            effective_tier: effective_tier(account.plan_tier, status, config),
        }
    }
}
