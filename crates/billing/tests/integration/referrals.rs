//! Ambassador tiers: thresholds, one-time rewards

use shopledger_billing::SubscriptionEventReason;
use shopledger_shared::ReferralTier;
use uuid::Uuid;

use crate::common::{self, TestLedger};

/// Record `count` referrals for the account and mark them rewarded
async fn rewarded_referrals(ledger: &TestLedger, account_id: Uuid, count: usize) {
    for i in 0..count {
        let referral = ledger
            .billing
            .referrals
            .record_referral(account_id, &format!("friend{}@example.com", i))
            .await
            .unwrap();
        assert!(ledger.billing.referrals.mark_rewarded(referral.id).await.unwrap());
    }
}

#[tokio::test]
async fn test_below_threshold_grants_nothing() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 9).await;

    let evaluation = ledger.billing.referrals.evaluate(owner.id).await.unwrap();

    assert_eq!(evaluation.rewarded_referrals, 9);
    assert!(evaluation.granted.is_empty());
}

#[tokio::test]
async fn test_bronze_extends_subscription_once() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 10).await;

    let first = ledger.billing.referrals.evaluate(owner.id).await.unwrap();
    assert_eq!(first.granted.len(), 1);
    assert_eq!(first.granted[0].tier, ReferralTier::Bronze);

    let history = ledger.billing.subscriptions.history(owner.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, SubscriptionEventReason::ReferralReward);
    assert_eq!(history[0].days_added, 30);

    // Re-evaluating after more referrals does not grant bronze again
    rewarded_referrals(&ledger, owner.id, 5).await;
    let second = ledger.billing.referrals.evaluate(owner.id).await.unwrap();
    assert!(second.granted.is_empty());
    assert_eq!(ledger.billing.subscriptions.history(owner.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_silver_features_storefront() {
    let ledger = common::ledger();
    let (owner, storefront) = common::seller(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 50).await;

    let evaluation = ledger.billing.referrals.evaluate(owner.id).await.unwrap();
    let tiers: Vec<_> = evaluation.granted.iter().map(|g| g.tier).collect();
    assert_eq!(tiers, vec![ReferralTier::Bronze, ReferralTier::Silver]);

    let storefront = ledger.store.get_storefront(storefront.id).await.unwrap().unwrap();
    assert!(storefront.featured_until.is_some());
}

#[tokio::test]
async fn test_silver_without_storefront_is_still_recorded() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 50).await;

    let evaluation = ledger.billing.referrals.evaluate(owner.id).await.unwrap();

    assert!(evaluation.granted.iter().any(|g| g.tier == ReferralTier::Silver));
    let grants = ledger.billing.referrals.grants(owner.id).await.unwrap();
    assert_eq!(grants.len(), 2);
}

#[tokio::test]
async fn test_gold_grants_reseller() {
    let ledger = common::ledger();
    let (owner, _) = common::seller(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 100).await;

    let evaluation = ledger.billing.referrals.evaluate(owner.id).await.unwrap();

    assert_eq!(evaluation.granted.len(), 3);
    let account = ledger.store.get_account(owner.id).await.unwrap().unwrap();
    assert!(account.is_reseller);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evaluations_grant_once() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    rewarded_referrals(&ledger, owner.id, 10).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let referrals = ledger.billing.referrals.clone();
        let account_id = owner.id;
        handles.push(tokio::spawn(async move { referrals.evaluate(account_id).await }));
    }

    let mut granted = 0;
    for handle in handles {
        granted += handle.await.unwrap().unwrap().granted.len();
    }

    assert_eq!(granted, 1);
    assert_eq!(ledger.billing.subscriptions.history(owner.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_rewarded_is_idempotent() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let referral = ledger
        .billing
        .referrals
        .record_referral(owner.id, "friend@example.com")
        .await
        .unwrap();

    assert!(ledger.billing.referrals.mark_rewarded(referral.id).await.unwrap());
    assert!(!ledger.billing.referrals.mark_rewarded(referral.id).await.unwrap());
    assert_eq!(ledger.store.count_rewarded_referrals(owner.id).await.unwrap(), 1);
}
