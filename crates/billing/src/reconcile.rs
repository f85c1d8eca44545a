//! Payment reconciliation
//!
//! Two event sources confirm payments: the synchronous verify call and the
//! processor's webhook. Both feed [`PaymentReconciler::apply`], which is
//! idempotent per payment reference. The first event to claim a reference
//! applies its effects; every later arrival is a no-op whatever its status.
//!
//! Webhook bodies are authenticated with HMAC-SHA512 over the raw bytes
//! before any JSON decoding.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use shopledger_shared::{BillingCycle, RevenueTransaction, SubjectType};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::{PaymentGateway, VerifiedTransaction};
use crate::config::PlanCatalog;
use crate::email::{BillingEmailService, Notification};
use crate::error::{BillingError, BillingResult};
use crate::events::SubscriptionEvent;
use crate::reference::PaymentReference;
use crate::store::{LedgerStore, OrderSettlement, OrderSettlementOutcome, SettlementOutcome};
use crate::subscriptions::{PlanPayment, SubscriptionManager};

type HmacSha512 = Hmac<Sha512>;

/// Webhook event type that confirms a payment
pub const CHARGE_SUCCESS: &str = "charge.success";

/// Processor status of a successful charge
pub const STATUS_SUCCESS: &str = "success";

/// Webhook body as sent by the processor
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookCharge,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookCharge {
    pub reference: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A payment confirmation from either source
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub payment_reference: String,
    pub processor_status: String,
    pub amount_minor: i64,
    pub currency: Option<String>,
    pub metadata: serde_json::Value,
}

impl From<WebhookCharge> for PaymentEvent {
    fn from(charge: WebhookCharge) -> Self {
        Self {
            payment_reference: charge.reference,
            processor_status: charge.status,
            amount_minor: charge.amount,
            currency: charge.currency,
            metadata: charge.metadata,
        }
    }
}

impl From<VerifiedTransaction> for PaymentEvent {
    fn from(tx: VerifiedTransaction) -> Self {
        Self {
            payment_reference: tx.reference,
            processor_status: tx.status,
            amount_minor: tx.amount,
            currency: tx.currency,
            metadata: tx.metadata,
        }
    }
}

/// What a confirmation pays for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSubject {
    Order {
        order_id: Uuid,
    },
    Subscription {
        account_id: Uuid,
        plan_id: String,
        cycle: BillingCycle,
    },
}

/// Outcome of reconciling one event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    OrderPaid { revenue: RevenueTransaction },
    SubscriptionExtended { event: SubscriptionEvent },
    /// Reference was settled before; nothing changed
    AlreadySettled,
    /// A second payment for an order already paid through another reference.
    /// The reference is consumed but no revenue is recorded; needs a refund
    OrderAlreadyPaid {
        order_id: Uuid,
        paid_reference: Option<String>,
    },
    PaymentNotSuccessful { processor_status: String },
    /// Paid amount is below the order total or plan price
    AmountMismatch {
        expected_minor: i64,
        received_minor: i64,
    },
    /// Webhook event type this service does not act on
    Ignored { event_type: String },
}

impl ReconcileOutcome {
    /// Whether this call mutated the ledger
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::OrderPaid { .. } | ReconcileOutcome::SubscriptionExtended { .. }
        )
    }
}

fn metadata_str<'a>(metadata: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn metadata_uuid(metadata: &serde_json::Value, key: &str) -> BillingResult<Option<Uuid>> {
    metadata_str(metadata, key)
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| BillingError::InvalidMetadata(format!("{} is not a UUID: {}", key, raw)))
        })
        .transpose()
}

/// Metadata id wins when present but must agree with the reference
fn pick_id(
    from_metadata: Option<Uuid>,
    from_reference: Option<Uuid>,
    key: &str,
) -> BillingResult<Uuid> {
    match (from_metadata, from_reference) {
        (Some(a), Some(b)) if a != b => Err(BillingError::InvalidMetadata(format!(
            "{} in metadata ({}) does not match the payment reference ({})",
            key, a, b
        ))),
        (Some(id), _) | (None, Some(id)) => Ok(id),
        (None, None) => Err(BillingError::InvalidMetadata(format!("missing {}", key))),
    }
}

/// Work out what a payment is for from its metadata and reference
pub fn resolve_subject(reference: &str, metadata: &serde_json::Value) -> BillingResult<PaymentSubject> {
    // Metadata may arrive JSON-encoded as a string
    let decoded;
    let metadata = match metadata {
        serde_json::Value::String(raw) => {
            decoded = serde_json::from_str(raw).unwrap_or(serde_json::Value::Null);
            &decoded
        }
        other => other,
    };

    let parsed_reference = PaymentReference::parse(reference).ok();
    let declared = metadata_str(metadata, "subject_type")
        .map(|raw| {
            raw.parse::<SubjectType>()
                .map_err(|e| BillingError::InvalidMetadata(e.to_string()))
        })
        .transpose()?;

    let subject_type = match (declared, &parsed_reference) {
        (Some(declared), Some(parsed)) if declared != parsed.subject_type => {
            return Err(BillingError::InvalidMetadata(format!(
                "metadata subject {} contradicts reference {}",
                declared, reference
            )))
        }
        (Some(declared), _) => declared,
        (None, Some(parsed)) => parsed.subject_type,
        (None, None) => {
            return Err(BillingError::InvalidMetadata(format!(
                "cannot determine what reference {} pays for",
                reference
            )))
        }
    };

    let reference_id = parsed_reference.map(|r| r.subject_id);

    match subject_type {
        SubjectType::Order => Ok(PaymentSubject::Order {
            order_id: pick_id(metadata_uuid(metadata, "order_id")?, reference_id, "order_id")?,
        }),
        SubjectType::Subscription => {
            let account_id =
                pick_id(metadata_uuid(metadata, "account_id")?, reference_id, "account_id")?;
            let plan_id = metadata_str(metadata, "plan_id")
                .ok_or_else(|| BillingError::InvalidMetadata("missing plan_id".to_string()))?
                .to_string();
            let cycle = metadata_str(metadata, "billing_cycle")
                .ok_or_else(|| BillingError::InvalidMetadata("missing billing_cycle".to_string()))?
                .parse::<BillingCycle>()
                .map_err(|e| BillingError::InvalidMetadata(e.to_string()))?;

            Ok(PaymentSubject::Subscription {
                account_id,
                plan_id,
                cycle,
            })
        }
    }
}

/// Payment reconciler
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<PaymentGateway>,
    subscriptions: SubscriptionManager,
    catalog: Arc<PlanCatalog>,
    email: BillingEmailService,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<PaymentGateway>,
        subscriptions: SubscriptionManager,
        catalog: Arc<PlanCatalog>,
        email: BillingEmailService,
    ) -> Self {
        Self {
            store,
            gateway,
            subscriptions,
            catalog,
            email,
        }
    }

    /// Check `signature` (hex) against HMAC-SHA512 of the raw body
    pub fn verify_signature(&self, raw_body: &[u8], signature: &str) -> BillingResult<()> {
        let secret = &self.gateway.config().webhook_secret;
        if secret.is_empty() {
            tracing::error!("Webhook secret not configured, rejecting webhook");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let expected = hex::decode(signature.trim()).map_err(|_| {
            tracing::warn!("Webhook signature is not valid hex");
            BillingError::WebhookSignatureInvalid
        })?;

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .map_err(|_| BillingError::Config("Invalid webhook secret".to_string()))?;
        mac.update(raw_body);

        // Constant-time comparison
        mac.verify_slice(&expected).map_err(|_| {
            tracing::warn!(body_len = raw_body.len(), "Webhook signature mismatch");
            BillingError::WebhookSignatureInvalid
        })
    }

    /// Webhook path: authenticate, decode and apply
    pub async fn reconcile_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<ReconcileOutcome> {
        let signature = signature.ok_or_else(|| {
            tracing::warn!("Webhook delivered without signature header");
            BillingError::WebhookSignatureInvalid
        })?;
        self.verify_signature(raw_body, signature)?;

        let event: WebhookEvent = serde_json::from_slice(raw_body)
            .map_err(|e| BillingError::InvalidInput(format!("Malformed webhook body: {}", e)))?;

        if event.event != CHARGE_SUCCESS {
            tracing::debug!(event_type = %event.event, "Ignoring webhook event");
            return Ok(ReconcileOutcome::Ignored {
                event_type: event.event,
            });
        }

        self.apply(event.data.into()).await
    }

    /// Verify path: ask the processor, then apply
    pub async fn reconcile_verification(&self, reference: &str) -> BillingResult<ReconcileOutcome> {
        // Only references this service minted are sent to the processor
        PaymentReference::parse(reference).map_err(|_| {
            BillingError::InvalidInput(format!("Not a payment reference: {}", reference))
        })?;

        // Skip the processor round-trip when the reference is already settled
        if self.store.is_reference_settled(reference).await? {
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        let transaction = self.gateway.verify_transaction(reference).await?;
        if transaction.reference != reference {
            return Err(BillingError::Gateway(format!(
                "processor verified {} when asked for {}",
                transaction.reference, reference
            )));
        }

        self.apply(transaction.into()).await
    }

    /// Apply one confirmation to the ledger; idempotent per reference
    pub async fn apply(&self, event: PaymentEvent) -> BillingResult<ReconcileOutcome> {
        let reference = event.payment_reference.clone();

        if self.store.is_reference_settled(&reference).await? {
            tracing::debug!(reference = %reference, "Payment already settled");
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        if event.processor_status != STATUS_SUCCESS {
            tracing::info!(
                reference = %reference,
                processor_status = %event.processor_status,
                "Payment not successful, ledger unchanged"
            );
            return Ok(ReconcileOutcome::PaymentNotSuccessful {
                processor_status: event.processor_status,
            });
        }

        let result = match resolve_subject(&reference, &event.metadata) {
            Ok(PaymentSubject::Order { order_id }) => self.settle_order(order_id, &event).await,
            Ok(PaymentSubject::Subscription {
                account_id,
                plan_id,
                cycle,
            }) => {
                self.settle_subscription(account_id, &plan_id, cycle, &event)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            if e.is_invariant_violation() {
                tracing::error!(
                    reference = %reference,
                    amount_minor = event.amount_minor,
                    metadata = %event.metadata,
                    error = %e,
                    "Payment could not be reconciled, manual review required"
                );
            }
        }

        result
    }

    async fn settle_order(
        &self,
        order_id: Uuid,
        event: &PaymentEvent,
    ) -> BillingResult<ReconcileOutcome> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(BillingError::OrderNotFound(order_id))?;

        if event.amount_minor < order.amount_minor {
            tracing::warn!(
                reference = %event.payment_reference,
                order_id = %order_id,
                expected_minor = order.amount_minor,
                received_minor = event.amount_minor,
                "Order payment below order total"
            );
            return Ok(ReconcileOutcome::AmountMismatch {
                expected_minor: order.amount_minor,
                received_minor: event.amount_minor,
            });
        }

        let outcome = self
            .store
            .settle_order_payment(OrderSettlement {
                order_id,
                payment_reference: event.payment_reference.clone(),
                amount_minor: event.amount_minor,
                currency: event.currency.clone().unwrap_or(order.currency),
                now: OffsetDateTime::now_utc(),
            })
            .await?;

        match outcome {
            OrderSettlementOutcome::Applied(revenue) => {
                tracing::info!(
                    reference = %event.payment_reference,
                    order_id = %order_id,
                    storefront_id = %revenue.storefront_id,
                    amount_minor = revenue.amount_minor,
                    "Order payment settled"
                );
                self.notify_seller(&revenue).await;
                Ok(ReconcileOutcome::OrderPaid { revenue })
            }
            OrderSettlementOutcome::AlreadySettled => Ok(ReconcileOutcome::AlreadySettled),
            OrderSettlementOutcome::OrderAlreadyPaid { paid_reference } => {
                tracing::error!(
                    reference = %event.payment_reference,
                    order_id = %order_id,
                    paid_reference = ?paid_reference,
                    amount_minor = event.amount_minor,
                    "Duplicate payment for an already paid order, refund review required"
                );
                Ok(ReconcileOutcome::OrderAlreadyPaid {
                    order_id,
                    paid_reference,
                })
            }
        }
    }

    async fn settle_subscription(
        &self,
        account_id: Uuid,
        plan_id: &str,
        cycle: BillingCycle,
        event: &PaymentEvent,
    ) -> BillingResult<ReconcileOutcome> {
        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or_else(|| BillingError::UnknownPlan(plan_id.to_string()))?;
        let price = plan
            .price_for(cycle)
            .ok_or_else(|| BillingError::UnknownPlan(format!("{} has no {} price", plan_id, cycle)))?;

        if event.amount_minor < price {
            tracing::warn!(
                reference = %event.payment_reference,
                account_id = %account_id,
                expected_minor = price,
                received_minor = event.amount_minor,
                "Subscription payment below plan price"
            );
            return Ok(ReconcileOutcome::AmountMismatch {
                expected_minor: price,
                received_minor: event.amount_minor,
            });
        }

        let outcome = self
            .subscriptions
            .apply_plan_payment(PlanPayment {
                account_id,
                plan,
                cycle,
                payment_reference: &event.payment_reference,
                now: OffsetDateTime::now_utc(),
            })
            .await?;

        match outcome {
            SettlementOutcome::Applied(subscription_event) => {
                if let Ok(Some(account)) = self.store.get_account(account_id).await {
                    self.email.dispatch(Notification::SubscriptionRenewed {
                        to: account.email,
                        plan_name: plan.name.clone(),
                        expires_at: subscription_event.new_expires_at,
                    });
                }
                Ok(ReconcileOutcome::SubscriptionExtended {
                    event: subscription_event,
                })
            }
            SettlementOutcome::AlreadySettled => Ok(ReconcileOutcome::AlreadySettled),
        }
    }

    async fn notify_seller(&self, revenue: &RevenueTransaction) {
        let Ok(Some(storefront)) = self.store.get_storefront(revenue.storefront_id).await else {
            return;
        };
        if let Ok(Some(account)) = self.store.get_account(storefront.account_id).await {
            self.email.dispatch(Notification::PaymentReceived {
                to: account.email,
                storefront_name: storefront.name,
                amount_minor: revenue.amount_minor,
                reference: revenue.payment_reference.clone(),
            });
        }
    }
}
