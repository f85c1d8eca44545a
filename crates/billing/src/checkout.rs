//! Checkout: transaction initialisation with the processor
//!
//! Each attempt mints a fresh payment reference that embeds the subject, and
//! sends metadata the reconciler uses to route the confirmation back.

use std::sync::Arc;

use serde::Serialize;
use shopledger_shared::{BillingCycle, PaymentStatus, SubjectType, DEFAULT_CURRENCY};
use uuid::Uuid;

use crate::client::{InitializeRequest, PaymentGateway};
use crate::config::PlanCatalog;
use crate::error::{BillingError, BillingResult};
use crate::reference::PaymentReference;
use crate::store::LedgerStore;

/// Hosted checkout handed back to the client
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Checkout service for creating processor transactions
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<PaymentGateway>,
    catalog: Arc<PlanCatalog>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<PaymentGateway>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            gateway,
            catalog,
        }
    }

    /// Start payment for a storefront order
    pub async fn initialize_order_payment(
        &self,
        order_id: Uuid,
        email: &str,
    ) -> BillingResult<CheckoutSession> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(BillingError::OrderNotFound(order_id))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(BillingError::AlreadyExists(format!(
                "order {} is already paid",
                order_id
            )));
        }

        let storefront = self
            .store
            .get_storefront(order.storefront_id)
            .await?
            .ok_or(BillingError::StorefrontNotFound(order.storefront_id))?;

        let reference = PaymentReference::mint(SubjectType::Order, order_id);
        let metadata = serde_json::json!({
            "subject_type": SubjectType::Order,
            "order_id": order_id,
            "storefront_id": storefront.id,
        });

        // Split to the seller when they have a subaccount
        let request = InitializeRequest {
            email: email.to_string(),
            amount: order.amount_minor,
            currency: order.currency.clone(),
            reference: reference.to_string(),
            metadata,
            callback_url: self.gateway.config().callback_url.clone(),
            subaccount: storefront.payment_subaccount_reference.clone(),
        };

        let session = self.start(request).await?;
        tracing::info!(
            order_id = %order_id,
            storefront_id = %storefront.id,
            reference = %session.reference,
            "Order checkout initialized"
        );
        Ok(session)
    }

    /// Start payment for a plan purchase or renewal
    pub async fn initialize_subscription_payment(
        &self,
        account_id: Uuid,
        plan_id: &str,
        cycle: BillingCycle,
        email: &str,
    ) -> BillingResult<CheckoutSession> {
        if self.store.get_account(account_id).await?.is_none() {
            return Err(BillingError::AccountNotFound(account_id));
        }

        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or_else(|| BillingError::InvalidInput(format!("Unknown plan: {}", plan_id)))?;
        let amount = plan.price_for(cycle).ok_or_else(|| {
            BillingError::InvalidInput(format!("Plan {} is not sold {}", plan_id, cycle))
        })?;

        let reference = PaymentReference::mint(SubjectType::Subscription, account_id);
        let metadata = serde_json::json!({
            "subject_type": SubjectType::Subscription,
            "account_id": account_id,
            "plan_id": plan.id,
            "billing_cycle": cycle,
        });

        let request = InitializeRequest {
            email: email.to_string(),
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            reference: reference.to_string(),
            metadata,
            callback_url: self.gateway.config().callback_url.clone(),
            subaccount: None,
        };

        let session = self.start(request).await?;
        tracing::info!(
            account_id = %account_id,
            plan_id = %plan_id,
            cycle = %cycle,
            reference = %session.reference,
            "Subscription checkout initialized"
        );
        Ok(session)
    }

    async fn start(&self, request: InitializeRequest) -> BillingResult<CheckoutSession> {
        let initialized = self.gateway.initialize_transaction(&request).await?;
        Ok(CheckoutSession {
            reference: request.reference,
            authorization_url: initialized.authorization_url,
            access_code: initialized.access_code,
            amount_minor: request.amount,
            currency: request.currency,
        })
    }
}
