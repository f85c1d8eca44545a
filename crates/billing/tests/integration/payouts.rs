//! Seller balances and withdrawal requests

use shopledger_billing::store::OrderSettlement;
use shopledger_billing::{BillingError, PaymentReference, MIN_WITHDRAWAL_MINOR};
use shopledger_shared::{BankDetails, KycStatus, PayoutStatus, SubjectType};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common::{self, TestLedger};

fn bank() -> BankDetails {
    BankDetails {
        bank_code: "058".to_string(),
        account_number: "0123456789".to_string(),
        account_name: "ADA OBI".to_string(),
    }
}

/// Settle a paid order of `amount_minor` into the storefront's revenue
async fn fund(ledger: &TestLedger, storefront_id: Uuid, amount_minor: i64) {
    let order = common::order(ledger, storefront_id, amount_minor).await;
    let outcome = ledger
        .store
        .settle_order_payment(OrderSettlement {
            order_id: order.id,
            payment_reference: PaymentReference::mint(SubjectType::Order, order.id).to_string(),
            amount_minor,
            currency: order.currency,
            now: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();
    assert!(outcome.is_applied());
}

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn test_balance_subtracts_completed_and_in_flight() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let payouts = &ledger.billing.payouts;

    // Given: 50,000 naira earned, 20,000 paid out, 10,000 pending
    fund(&ledger, storefront.id, 5_000_000).await;
    let paid = payouts.request_payout(storefront.id, 2_000_000, bank()).await.unwrap();
    payouts.update_status(paid.id, PayoutStatus::Processing, None).await.unwrap();
    payouts.update_status(paid.id, PayoutStatus::Completed, None).await.unwrap();
    payouts.request_payout(storefront.id, 1_000_000, bank()).await.unwrap();

    assert_eq!(payouts.available_balance(storefront.id).await.unwrap(), 2_000_000);

    // When: more than the remainder is requested
    let err = payouts
        .request_payout(storefront.id, 2_500_000, bank())
        .await
        .unwrap_err();

    // Then
    assert!(matches!(
        err,
        BillingError::InsufficientBalance {
            requested_minor: 2_500_000,
            available_minor: 2_000_000
        }
    ));
    assert_eq!(payouts.history(storefront.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_payout_releases_funds() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let payouts = &ledger.billing.payouts;
    fund(&ledger, storefront.id, 1_000_000).await;

    let request = payouts.request_payout(storefront.id, 1_000_000, bank()).await.unwrap();
    assert_eq!(payouts.available_balance(storefront.id).await.unwrap(), 0);

    let failed = payouts
        .update_status(request.id, PayoutStatus::Failed, Some("Account closed".to_string()))
        .await
        .unwrap();

    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.admin_notes.as_deref(), Some("Account closed"));
    assert!(failed.processed_at.is_some());
    assert_eq!(payouts.available_balance(storefront.id).await.unwrap(), 1_000_000);
}

#[tokio::test]
async fn test_balance_of_unknown_storefront() {
    let ledger = common::ledger();
    let err = ledger
        .billing
        .payouts
        .available_balance(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StorefrontNotFound(_)));
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_below_minimum_rejected() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    fund(&ledger, storefront.id, 5_000_000).await;

    let err = ledger
        .billing
        .payouts
        .request_payout(storefront.id, MIN_WITHDRAWAL_MINOR - 1, bank())
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::BelowMinimum { .. }));
    assert!(ledger.billing.payouts.history(storefront.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_bank_details_rejected() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    fund(&ledger, storefront.id, 5_000_000).await;

    let mut details = bank();
    details.account_number = "  ".to_string();
    let err = ledger
        .billing
        .payouts
        .request_payout(storefront.id, MIN_WITHDRAWAL_MINOR, details)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::InvalidInput(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_cannot_overdraw() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    fund(&ledger, storefront.id, 1_500_000).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let payouts = ledger.billing.payouts.clone();
        handles.push(tokio::spawn(async move {
            payouts.request_payout(storefront.id, 1_000_000, bank()).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(BillingError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(
        ledger.billing.payouts.available_balance(storefront.id).await.unwrap(),
        500_000
    );
}

#[tokio::test]
async fn test_identity_verification_gates_payouts() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let payouts = &ledger.billing.payouts;

    let err = payouts.ensure_eligible(storefront.id).await.unwrap_err();
    assert!(matches!(err, BillingError::PayoutNotEligible(_)));

    ledger
        .store
        .record_identity_verification(storefront.id, KycStatus::Failed, None)
        .await
        .unwrap();
    assert!(payouts.ensure_eligible(storefront.id).await.is_err());

    ledger
        .store
        .record_identity_verification(storefront.id, KycStatus::Verified, Some("ADA OBI"))
        .await
        .unwrap();
    payouts.ensure_eligible(storefront.id).await.unwrap();

    let storefront = ledger.store.get_storefront(storefront.id).await.unwrap().unwrap();
    assert_eq!(storefront.kyc_account_name.as_deref(), Some("ADA OBI"));
}

// ============================================================================
// Operator review
// ============================================================================

#[tokio::test]
async fn test_invalid_transitions_rejected() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let payouts = &ledger.billing.payouts;
    fund(&ledger, storefront.id, 1_000_000).await;
    let request = payouts.request_payout(storefront.id, 500_000, bank()).await.unwrap();

    // pending cannot jump to completed
    let err = payouts
        .update_status(request.id, PayoutStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidPayoutTransition { .. }));

    payouts.update_status(request.id, PayoutStatus::Processing, None).await.unwrap();
    let done = payouts
        .update_status(request.id, PayoutStatus::Completed, None)
        .await
        .unwrap();
    assert!(done.processed_at.is_some());

    // completed is terminal
    let err = payouts
        .update_status(request.id, PayoutStatus::Failed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidPayoutTransition { .. }));
    assert_eq!(payouts.available_balance(storefront.id).await.unwrap(), 500_000);
}

#[tokio::test]
async fn test_update_unknown_payout() {
    let ledger = common::ledger();
    let err = ledger
        .billing
        .payouts
        .update_status(Uuid::new_v4(), PayoutStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::PayoutNotFound(_)));
}

#[tokio::test]
async fn test_list_pending_oldest_first() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let payouts = &ledger.billing.payouts;
    fund(&ledger, storefront.id, 5_000_000).await;

    let first = payouts.request_payout(storefront.id, 100_000, bank()).await.unwrap();
    let second = payouts.request_payout(storefront.id, 200_000, bank()).await.unwrap();
    let third = payouts.request_payout(storefront.id, 300_000, bank()).await.unwrap();

    payouts.update_status(second.id, PayoutStatus::Processing, None).await.unwrap();
    payouts.update_status(third.id, PayoutStatus::Failed, None).await.unwrap();

    let pending: Vec<Uuid> = payouts
        .list_pending()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    assert_eq!(pending, vec![first.id, second.id]);
}
