//! Feature quotas per effective tier

use shopledger_billing::store::SubscriptionExtension;
use shopledger_billing::{BillingError, SubscriptionEventReason};
use shopledger_shared::{PlanTier, SubscriptionStatus};
use time::{Duration, OffsetDateTime};

use crate::common;

#[tokio::test]
async fn test_trial_is_elevated_to_highest_tier() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    ledger.billing.subscriptions.start_trial(owner.id).await.unwrap();

    let check = ledger.billing.usage.check(owner.id, "ai_poster").await.unwrap();

    assert!(check.can_use);
    assert_eq!(check.status, SubscriptionStatus::Trial);
    assert_eq!(check.tier, PlanTier::Business);
    assert_eq!(check.max_usage, None);
}

#[tokio::test]
async fn test_basic_plan_blocks_ai_features() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    common::activate(&ledger, owner.id, PlanTier::Basic, 30).await;

    let check = ledger
        .billing
        .usage
        .check(owner.id, "ai_product_description")
        .await
        .unwrap();
    assert!(!check.can_use);
    assert!(check.blocked_by_plan);

    let err = ledger
        .billing
        .usage
        .authorize(owner.id, "ai_product_description")
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::BlockedByPlan { ref tier, .. } if tier == "basic"));
}

#[tokio::test]
async fn test_pro_quota_exhausts() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    common::activate(&ledger, owner.id, PlanTier::Pro, 30).await;

    for _ in 0..20 {
        ledger.billing.usage.authorize(owner.id, "ai_poster").await.unwrap();
        ledger.billing.usage.increment(owner.id, "ai_poster").await.unwrap();
    }

    let check = ledger.billing.usage.check(owner.id, "ai_poster").await.unwrap();
    assert!(!check.can_use);
    assert!(!check.blocked_by_plan);
    assert_eq!(check.current_usage, 20);
    assert_eq!(check.max_usage, Some(20));

    let err = ledger
        .billing
        .usage
        .authorize(owner.id, "ai_poster")
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::QuotaExceeded { used: 20, limit: 20, .. }));
}

#[tokio::test]
async fn test_lapsed_account_falls_back_to_basic() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    ledger
        .store
        .extend_subscription(SubscriptionExtension {
            account_id: owner.id,
            added_days: 30,
            reason: SubscriptionEventReason::AdminExtension,
            payment_reference: None,
            plan_id: None,
            plan_tier: Some(PlanTier::Business),
            now: OffsetDateTime::now_utc() - Duration::days(60),
        })
        .await
        .unwrap();

    let check = ledger.billing.usage.check(owner.id, "ai_poster").await.unwrap();

    assert_eq!(check.status, SubscriptionStatus::Expired);
    assert_eq!(check.tier, PlanTier::Basic);
    assert!(check.blocked_by_plan);
}

#[tokio::test]
async fn test_unknown_feature_is_blocked() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    common::activate(&ledger, owner.id, PlanTier::Business, 30).await;

    let check = ledger.billing.usage.check(owner.id, "time_travel").await.unwrap();

    assert!(check.blocked_by_plan);
    assert_eq!(check.max_usage, Some(0));
}

#[tokio::test]
async fn test_usage_is_per_period() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    common::activate(&ledger, owner.id, PlanTier::Pro, 90).await;
    ledger.billing.usage.increment(owner.id, "ai_poster").await.unwrap();

    let next_month = OffsetDateTime::now_utc() + Duration::days(32);
    let check = ledger
        .billing
        .usage
        .check_at(owner.id, "ai_poster", next_month)
        .await
        .unwrap();

    assert_eq!(check.current_usage, 0);
    assert_ne!(check.period, shopledger_billing::usage::usage_period(OffsetDateTime::now_utc()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_counted() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let usage = ledger.billing.usage.clone();
        let account_id = owner.id;
        handles.push(tokio::spawn(async move {
            usage.increment(account_id, "product_listing").await
        }));
    }

    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap().unwrap());
    }
    counts.sort_unstable();

    assert_eq!(counts, (1..=25).collect::<Vec<i64>>());
}
