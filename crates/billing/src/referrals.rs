//! Referral ambassador tiers
//!
//! Grants are append-only rows unique per `(account, tier)`, so "already
//! granted" is an existence check and evaluation can be re-run any number of
//! times, concurrently, without granting a reward twice.

use std::sync::Arc;

use serde::Serialize;
use shopledger_shared::{Referral, ReferralTier, ReferralTierGrant};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::ReferralConfig;
use crate::email::{BillingEmailService, Notification};
use crate::error::{BillingError, BillingResult};
use crate::store::{LedgerStore, TierGrant, TierReward};

/// Outcome of an evaluation run
#[derive(Debug, Clone, Serialize)]
pub struct ReferralEvaluation {
    pub account_id: Uuid,
    pub rewarded_referrals: i64,
    /// Grants created by this run
    pub granted: Vec<ReferralTierGrant>,
}

#[derive(Clone)]
pub struct ReferralEngine {
    store: Arc<dyn LedgerStore>,
    config: ReferralConfig,
    email: BillingEmailService,
}

impl ReferralEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: ReferralConfig, email: BillingEmailService) -> Self {
        Self {
            store,
            config,
            email,
        }
    }

    fn reward_for(&self, tier: ReferralTier) -> TierReward {
        match tier {
            ReferralTier::Bronze => TierReward::ExtendSubscription {
                days: self.config.bronze_extension_days,
            },
            ReferralTier::Silver => TierReward::FeatureStorefront {
                days: self.config.silver_featured_days,
            },
            ReferralTier::Gold => TierReward::GrantReseller,
        }
    }

    fn describe(reward: TierReward) -> String {
        match reward {
            TierReward::ExtendSubscription { days } => format!("{} extra subscription days", days),
            TierReward::FeatureStorefront { days } => {
                format!("your storefront is featured for {} days", days)
            }
            TierReward::GrantReseller => "reseller access".to_string(),
        }
    }

    pub async fn record_referral(
        &self,
        referrer_account_id: Uuid,
        referred_email: &str,
    ) -> BillingResult<Referral> {
        self.store
            .record_referral(referrer_account_id, referred_email)
            .await
    }

    /// Mark a referral as rewarded; `false` if it already was
    pub async fn mark_rewarded(&self, referral_id: Uuid) -> BillingResult<bool> {
        let changed = self.store.mark_referral_rewarded(referral_id).await?;
        if changed {
            tracing::info!(referral_id = %referral_id, "Referral rewarded");
        }
        Ok(changed)
    }

    /// Grant every tier whose threshold is met and that was not granted before
    pub async fn evaluate(&self, account_id: Uuid) -> BillingResult<ReferralEvaluation> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(BillingError::AccountNotFound(account_id))?;

        let rewarded = self.store.count_rewarded_referrals(account_id).await?;
        let existing = self.store.tier_grants(account_id).await?;

        let mut granted = Vec::new();
        for tier in ReferralTier::all() {
            if rewarded < self.config.threshold(tier) || existing.iter().any(|g| g.tier == tier) {
                continue;
            }

            let reward = self.reward_for(tier);
            if tier == ReferralTier::Silver
                && self.store.storefront_for_account(account_id).await?.is_none()
            {
                tracing::warn!(
                    account_id = %account_id,
                    "Silver tier reached without a storefront; recording grant without feature window"
                );
            }

            // A concurrent evaluation may have claimed the tier since the read above
            let Some(grant) = self
                .store
                .grant_referral_tier(TierGrant {
                    account_id,
                    tier,
                    reward,
                    now: OffsetDateTime::now_utc(),
                })
                .await?
            else {
                continue;
            };

            tracing::info!(
                account_id = %account_id,
                tier = %tier,
                rewarded_referrals = rewarded,
                "Referral tier granted"
            );

            self.email.dispatch(Notification::ReferralTierGranted {
                to: account.email.clone(),
                tier,
                reward: Self::describe(reward),
            });
            granted.push(grant);
        }

        Ok(ReferralEvaluation {
            account_id,
            rewarded_referrals: rewarded,
            granted,
        })
    }

    pub async fn grants(&self, account_id: Uuid) -> BillingResult<Vec<ReferralTierGrant>> {
        self.store.tier_grants(account_id).await
    }
}
