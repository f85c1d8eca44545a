//! Payment reconciliation: idempotency across the verify and webhook paths

use shopledger_billing::reconcile::CHARGE_SUCCESS;
use shopledger_billing::{BillingError, PaymentEvent, PaymentReference, ReconcileOutcome};
use shopledger_shared::{PaymentStatus, PlanTier, SubjectType, SubscriptionStatus};

use crate::common::{self, charge_event, order_metadata, sign, subscription_metadata};

// ============================================================================
// Order payments
// ============================================================================

#[tokio::test]
async fn test_webhook_settles_order() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 1_500_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);

    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        1_500_000,
        order_metadata(&order),
    );
    let outcome = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();

    let ReconcileOutcome::OrderPaid { revenue } = outcome else {
        panic!("expected OrderPaid, got {outcome:?}");
    };
    assert_eq!(revenue.amount_minor, 1_500_000);
    assert_eq!(revenue.transaction_type, "order_payment");
    assert_eq!(revenue.storefront_id, storefront.id);

    let order = ledger.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some(reference.as_str()));
}

#[tokio::test]
async fn test_webhook_redelivery_is_noop() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 800_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        800_000,
        order_metadata(&order),
    );
    let signature = sign(&body);

    let first = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&signature))
        .await
        .unwrap();
    let second = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&signature))
        .await
        .unwrap();

    assert!(first.is_applied());
    assert!(matches!(second, ReconcileOutcome::AlreadySettled));
    assert_eq!(ledger.store.revenue_for_storefront(storefront.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_reference_for_paid_order_is_not_credited() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 1_500_000).await;

    // Given: the customer retried checkout, so two references exist
    let retry = PaymentReference::mint(SubjectType::Order, order.id);
    let original = PaymentReference::mint(SubjectType::Order, order.id);

    let body = charge_event(
        CHARGE_SUCCESS,
        retry.as_str(),
        "success",
        1_500_000,
        order_metadata(&order),
    );
    let first = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    assert!(first.is_applied());

    // When: the original charge confirms late
    let late = charge_event(
        CHARGE_SUCCESS,
        original.as_str(),
        "success",
        1_500_000,
        order_metadata(&order),
    );
    let outcome = ledger
        .billing
        .reconciler
        .reconcile_webhook(&late, Some(&sign(&late)))
        .await
        .unwrap();

    // Then: flagged for refund, nothing credited twice
    assert!(!outcome.is_applied());
    assert!(matches!(
        outcome,
        ReconcileOutcome::OrderAlreadyPaid { order_id, ref paid_reference }
            if order_id == order.id && paid_reference.as_deref() == Some(retry.as_str())
    ));
    assert_eq!(ledger.store.revenue_for_storefront(storefront.id).await.unwrap().len(), 1);
    assert_eq!(ledger.billing.payouts.available_balance(storefront.id).await.unwrap(), 1_500_000);

    let order = ledger.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_reference.as_deref(), Some(retry.as_str()));

    // The late reference is consumed; redelivery is a no-op
    assert!(ledger.store.is_reference_settled(original.as_str()).await.unwrap());
    let again = ledger
        .billing
        .reconciler
        .reconcile_webhook(&late, Some(&sign(&late)))
        .await
        .unwrap();
    assert!(matches!(again, ReconcileOutcome::AlreadySettled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_apply_once() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 800_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        800_000,
        order_metadata(&order),
    );
    let signature = sign(&body);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let reconciler = ledger.billing.reconciler.clone();
        let body = body.clone();
        let signature = signature.clone();
        handles.push(tokio::spawn(async move {
            reconciler.reconcile_webhook(&body, Some(&signature)).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_applied() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(ledger.store.available_balance(storefront.id).await.unwrap(), 800_000);
}

#[tokio::test]
async fn test_verify_then_webhook_settles_once() {
    let mut server = mockito::Server::new_async().await;
    let ledger = common::ledger_with_processor(&server.url());
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 250_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);

    let verify = server
        .mock("GET", format!("/transaction/verify/{}", reference).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": "success",
                    "reference": reference.as_str(),
                    "amount": 250_000,
                    "currency": "NGN",
                    "metadata": order_metadata(&order),
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    // When: the customer's browser returns first
    let verified = ledger
        .billing
        .reconciler
        .reconcile_verification(reference.as_str())
        .await
        .unwrap();
    assert!(verified.is_applied());

    // Then: the late webhook and a second verify are both no-ops
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        250_000,
        order_metadata(&order),
    );
    let webhook = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    assert!(matches!(webhook, ReconcileOutcome::AlreadySettled));

    let again = ledger
        .billing
        .reconciler
        .reconcile_verification(reference.as_str())
        .await
        .unwrap();
    assert!(matches!(again, ReconcileOutcome::AlreadySettled));

    verify.assert_async().await;
    assert_eq!(ledger.store.revenue_for_storefront(storefront.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_verify_unavailable_leaves_order_pending() {
    let mut server = mockito::Server::new_async().await;
    let ledger = common::ledger_with_processor(&server.url());
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 250_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);

    server
        .mock("GET", format!("/transaction/verify/{}", reference).as_str())
        .with_status(502)
        .create_async()
        .await;

    let err = ledger
        .billing
        .reconciler
        .reconcile_verification(reference.as_str())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let order = ledger.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_bad_signature_changes_nothing() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 500_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        500_000,
        order_metadata(&order),
    );

    // Signature over a different body
    let forged = sign(b"{\"event\":\"charge.success\"}");
    let err = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&forged))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WebhookSignatureInvalid));

    let missing = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, BillingError::WebhookSignatureInvalid));

    let garbage = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some("not-hex"))
        .await
        .unwrap_err();
    assert!(matches!(garbage, BillingError::WebhookSignatureInvalid));

    assert!(!ledger.store.is_reference_settled(reference.as_str()).await.unwrap());
    assert!(ledger.store.revenue_for_storefront(storefront.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signature_covers_exact_bytes() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 500_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        500_000,
        order_metadata(&order),
    );
    let signature = sign(&body);

    // Semantically identical JSON, different bytes
    let mut reformatted = body.clone();
    reformatted.push(b'\n');

    let err = ledger
        .billing
        .reconciler
        .reconcile_webhook(&reformatted, Some(&signature))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WebhookSignatureInvalid));
}

#[tokio::test]
async fn test_failed_charge_then_success() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 300_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);

    let failed = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "failed".to_string(),
            amount_minor: 300_000,
            currency: Some("NGN".to_string()),
            metadata: order_metadata(&order),
        })
        .await
        .unwrap();
    assert!(matches!(
        failed,
        ReconcileOutcome::PaymentNotSuccessful { ref processor_status } if processor_status == "failed"
    ));
    assert!(!ledger.store.is_reference_settled(reference.as_str()).await.unwrap());

    // A later success for the same reference still applies
    let succeeded = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 300_000,
            currency: Some("NGN".to_string()),
            metadata: order_metadata(&order),
        })
        .await
        .unwrap();
    assert!(succeeded.is_applied());
}

#[tokio::test]
async fn test_stale_failure_after_success_is_ignored() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 300_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);
    let event = |status: &str| PaymentEvent {
        payment_reference: reference.to_string(),
        processor_status: status.to_string(),
        amount_minor: 300_000,
        currency: None,
        metadata: order_metadata(&order),
    };

    assert!(ledger.billing.reconciler.apply(event("success")).await.unwrap().is_applied());
    let stale = ledger.billing.reconciler.apply(event("abandoned")).await.unwrap();

    assert!(matches!(stale, ReconcileOutcome::AlreadySettled));
    let order = ledger.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_underpayment_is_rejected() {
    let ledger = common::ledger();
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 1_000_000).await;
    let reference = PaymentReference::mint(SubjectType::Order, order.id);

    let outcome = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 10_000,
            currency: Some("NGN".to_string()),
            metadata: order_metadata(&order),
        })
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::AmountMismatch {
            expected_minor: 1_000_000,
            received_minor: 10_000
        }
    ));
    assert!(ledger.store.revenue_for_storefront(storefront.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_other_events_ignored() {
    let ledger = common::ledger();
    let body = charge_event("transfer.success", "TRF_1", "success", 100, serde_json::json!({}));

    let outcome = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Ignored { ref event_type } if event_type == "transfer.success"));
}

#[tokio::test]
async fn test_unknown_order_is_not_settled() {
    let ledger = common::ledger();
    let missing = uuid::Uuid::new_v4();
    let reference = PaymentReference::mint(SubjectType::Order, missing);

    let err = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 100_000,
            currency: None,
            metadata: serde_json::Value::Null,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::OrderNotFound(id) if id == missing));
    assert!(err.is_invariant_violation());
    assert!(!ledger.store.is_reference_settled(reference.as_str()).await.unwrap());
}

// ============================================================================
// Subscription payments
// ============================================================================

#[tokio::test]
async fn test_subscription_webhook_extends_and_sets_tier() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let reference = PaymentReference::mint(SubjectType::Subscription, owner.id);
    let body = charge_event(
        CHARGE_SUCCESS,
        reference.as_str(),
        "success",
        750_000,
        subscription_metadata(owner.id, "pro", "monthly"),
    );

    let outcome = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();

    let ReconcileOutcome::SubscriptionExtended { event } = outcome else {
        panic!("expected SubscriptionExtended, got {outcome:?}");
    };
    assert_eq!(event.days_added, 30);
    assert_eq!(event.plan_id.as_deref(), Some("pro"));
    assert_eq!(event.payment_reference.as_deref(), Some(reference.as_str()));

    let summary = ledger.billing.subscriptions.summary(owner.id).await.unwrap();
    assert_eq!(summary.status, SubscriptionStatus::Active);
    assert_eq!(summary.plan_tier, PlanTier::Pro);

    // Redelivery does not add another 30 days
    let again = ledger
        .billing
        .reconciler
        .reconcile_webhook(&body, Some(&sign(&body)))
        .await
        .unwrap();
    assert!(matches!(again, ReconcileOutcome::AlreadySettled));
    assert_eq!(ledger.billing.subscriptions.history(owner.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_subscription_underpayment_rejected() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let reference = PaymentReference::mint(SubjectType::Subscription, owner.id);

    // Monthly price paid for a yearly plan
    let outcome = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 750_000,
            currency: None,
            metadata: subscription_metadata(owner.id, "pro", "yearly"),
        })
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::AmountMismatch {
            expected_minor: 7_500_000,
            ..
        }
    ));
    let account = ledger.store.get_account(owner.id).await.unwrap().unwrap();
    assert!(account.subscription_expires_at.is_none());
}

#[tokio::test]
async fn test_subscription_for_missing_account_is_not_settled() {
    let ledger = common::ledger();
    let ghost = uuid::Uuid::new_v4();
    let reference = PaymentReference::mint(SubjectType::Subscription, ghost);

    let err = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 750_000,
            currency: None,
            metadata: subscription_metadata(ghost, "pro", "monthly"),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::AccountNotFound(_)));
    assert!(!ledger.store.is_reference_settled(reference.as_str()).await.unwrap());
}

#[tokio::test]
async fn test_unknown_plan_is_invariant_violation() {
    let ledger = common::ledger();
    let owner = common::account(&ledger).await;
    let reference = PaymentReference::mint(SubjectType::Subscription, owner.id);

    let err = ledger
        .billing
        .reconciler
        .apply(PaymentEvent {
            payment_reference: reference.to_string(),
            processor_status: "success".to_string(),
            amount_minor: 750_000,
            currency: None,
            metadata: subscription_metadata(owner.id, "platinum", "monthly"),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::UnknownPlan(_)));
    assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn test_foreign_reference_is_rejected_before_verification() {
    let mut server = mockito::Server::new_async().await;
    let verify = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let ledger = common::ledger_with_processor(&server.url());
    let (_, storefront) = common::seller(&ledger).await;
    let order = common::order(&ledger, storefront.id, 1_500_000).await;
    let minted = PaymentReference::mint(SubjectType::Order, order.id);

    for reference in [
        format!("{}/../../bank/resolve", minted.as_str()),
        format!("{}?account=1", minted.as_str()),
        "unknown_reference".to_string(),
    ] {
        let err = ledger
            .billing
            .reconciler
            .reconcile_verification(&reference)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)), "{}", reference);
    }

    verify.assert_async().await;
    let stored = ledger.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
}
