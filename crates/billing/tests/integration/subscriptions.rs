//! Subscription lifecycle: trial, stacking extensions, lapse

use shopledger_billing::store::SubscriptionExtension;
use shopledger_billing::{BillingError, SubscriptionEventReason};
use shopledger_shared::{PlanTier, SubscriptionStatus};
use time::{Duration, OffsetDateTime};

use crate::common;

fn admin_extension(account_id: uuid::Uuid, days: i64, now: OffsetDateTime) -> SubscriptionExtension {
    SubscriptionExtension {
        account_id,
        added_days: days,
        reason: SubscriptionEventReason::AdminExtension,
        payment_reference: None,
        plan_id: None,
        plan_tier: None,
        now,
    }
}

// ============================================================================
// Extension arithmetic
// ============================================================================

#[tokio::test]
async fn test_first_extension_starts_now() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let before = OffsetDateTime::now_utc();

    let event = ledger
        .billing
        .subscriptions
        .extend(owner.id, 30, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap();

    assert!(event.previous_expires_at.is_none());
    assert!(event.new_expires_at >= before + Duration::days(30));
    assert!(event.new_expires_at <= OffsetDateTime::now_utc() + Duration::days(30));

    let account = ledger.store.get_account(owner.id).await.unwrap().unwrap();
    assert!(account.is_subscribed);
    assert_eq!(account.subscription_expires_at, Some(event.new_expires_at));
}

#[tokio::test]
async fn test_extension_stacks_on_remaining_days() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let now = OffsetDateTime::now_utc();

    // Given: five days left
    let first = ledger
        .store
        .extend_subscription(admin_extension(owner.id, 5, now))
        .await
        .unwrap();
    assert!(first.is_applied());
    let current = ledger
        .store
        .get_account(owner.id)
        .await
        .unwrap()
        .unwrap()
        .subscription_expires_at
        .unwrap();

    // When: thirty more days are bought
    let event = ledger
        .billing
        .subscriptions
        .extend(owner.id, 30, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap();

    // Then: the remaining days are kept
    assert_eq!(event.previous_expires_at, Some(current));
    assert_eq!(event.new_expires_at, current + Duration::days(30));
}

#[tokio::test]
async fn test_lapsed_extension_restarts_from_now() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    // Given: a subscription that ended ten days ago
    let long_ago = OffsetDateTime::now_utc() - Duration::days(40);
    ledger
        .store
        .extend_subscription(admin_extension(owner.id, 30, long_ago))
        .await
        .unwrap();
    let summary = ledger.billing.subscriptions.summary(owner.id).await.unwrap();
    assert_eq!(summary.status, SubscriptionStatus::Expired);
    assert_eq!(summary.days_remaining, 0);

    // When
    let before = OffsetDateTime::now_utc();
    let event = ledger
        .billing
        .subscriptions
        .extend(owner.id, 30, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap();

    // Then: the lapsed days are not credited
    assert!(event.new_expires_at >= before + Duration::days(30));
    assert!(event.previous_expires_at.unwrap() < before);
}

#[tokio::test]
async fn test_extension_rejects_non_positive_days() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    let err = ledger
        .billing
        .subscriptions
        .extend(owner.id, 0, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
    assert!(ledger.billing.subscriptions.history(owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_extension_is_rejected_without_mutation() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    let err = ledger
        .billing
        .subscriptions
        .extend(owner.id, 10_000_000, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidInput(_)));

    // Past the end of the calendar at the store layer too
    let err = ledger
        .store
        .extend_subscription(admin_extension(owner.id, 10_000_000, OffsetDateTime::now_utc()))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidInput(_)));

    let account = ledger.store.get_account(owner.id).await.unwrap().unwrap();
    assert!(account.subscription_expires_at.is_none());
    assert!(!account.is_subscribed);
    assert!(ledger.billing.subscriptions.history(owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_extension_of_missing_account() {
    let ledger = common::ledger();

    let err = ledger
        .billing
        .subscriptions
        .extend(uuid::Uuid::new_v4(), 30, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::AccountNotFound(_)));
}

// ============================================================================
// Trial
// ============================================================================

#[tokio::test]
async fn test_trial_grants_highest_tier_once() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    let trial = ledger
        .billing
        .subscriptions
        .start_trial(owner.id)
        .await
        .unwrap()
        .expect("trial granted");
    assert_eq!(trial.reason, SubscriptionEventReason::TrialStarted);
    assert_eq!(trial.days_added, 14);

    let summary = ledger.billing.subscriptions.summary(owner.id).await.unwrap();
    assert_eq!(summary.status, SubscriptionStatus::Trial);
    assert_eq!(summary.plan_tier, PlanTier::Basic);
    assert_eq!(summary.effective_tier, PlanTier::Business);
    assert!(!summary.is_subscribed);

    // Second attempt does nothing
    let again = ledger.billing.subscriptions.start_trial(owner.id).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn test_paid_extension_during_trial_becomes_active() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let trial = ledger
        .billing
        .subscriptions
        .start_trial(owner.id)
        .await
        .unwrap()
        .unwrap();

    common::activate(&ledger, owner.id, PlanTier::Pro, 30).await;

    let summary = ledger.billing.subscriptions.summary(owner.id).await.unwrap();
    assert_eq!(summary.status, SubscriptionStatus::Active);
    assert_eq!(summary.effective_tier, PlanTier::Pro);
    // Trial days are kept
    assert_eq!(
        summary.expires_at,
        Some(trial.new_expires_at + Duration::days(30))
    );
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;

    ledger.billing.subscriptions.start_trial(owner.id).await.unwrap();
    ledger
        .billing
        .subscriptions
        .extend(owner.id, 30, SubscriptionEventReason::AdminExtension)
        .await
        .unwrap();

    let history = ledger.billing.subscriptions.history(owner.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].reason, SubscriptionEventReason::AdminExtension);
    assert_eq!(history[1].reason, SubscriptionEventReason::TrialStarted);
    assert_eq!(history[0].previous_expires_at, Some(history[1].new_expires_at));
}
