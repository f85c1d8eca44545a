// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ShopLedger Billing Module
//!
//! The money-state core of the storefront platform.
//!
//! ## Features
//!
//! - **Reconciliation**: Idempotent settlement of payments confirmed by the
//!   verify call or the processor webhook
//! - **Subscriptions**: Trial, renewal and expiry with stacking extensions
//! - **Usage Gate**: Per-tier feature quotas with trial elevation
//! - **Payouts**: Derived balances, reserved withdrawals, operator review
//! - **Referrals**: One-time ambassador tier rewards
//! - **Checkout**: Transaction initialisation and split-payment subaccounts
//! - **Email Notifications**: Payment received, renewal, payout status, tier grants

pub mod checkout;
pub mod client;
pub mod config;
pub mod email;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod payouts;
pub mod reconcile;
pub mod reference;
pub mod referrals;
pub mod store;
pub mod subaccount;
pub mod subscriptions;
pub mod usage;

use std::sync::Arc;

// Checkout
pub use checkout::{CheckoutService, CheckoutSession};

// Client
pub use client::{
    Bank, GatewayConfig, InitializedTransaction, PaymentGateway, ResolvedAccount,
    VerifiedTransaction,
};

// Config
pub use config::{
    BillingConfig, FeatureLimit, Plan, PlanCatalog, ReferralConfig, SubscriptionConfig,
};

// Email
pub use email::{BillingEmailService, EmailConfig, Notification};

// Entitlement
pub use entitlement::Entitlement;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{SubscriptionEvent, SubscriptionEventReason};

// Payouts
pub use payouts::{PayoutLedger, MIN_WITHDRAWAL_MINOR};

// Reconciliation
pub use reconcile::{PaymentEvent, PaymentReconciler, ReconcileOutcome};

// Reference
pub use reference::PaymentReference;

// Referrals
pub use referrals::{ReferralEngine, ReferralEvaluation};

// Store
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};

// Subaccounts
pub use subaccount::{SubaccountService, SubaccountSetup};

// Subscriptions
pub use subscriptions::{SubscriptionManager, SubscriptionSummary};

// Usage
pub use usage::{UsageCheck, UsageGate};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub store: Arc<dyn LedgerStore>,
    pub catalog: Arc<PlanCatalog>,
    pub checkout: CheckoutService,
    pub email: BillingEmailService,
    pub payouts: PayoutLedger,
    pub reconciler: PaymentReconciler,
    pub referrals: ReferralEngine,
    pub subaccounts: SubaccountService,
    pub subscriptions: SubscriptionManager,
    pub usage: UsageGate,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(store: Arc<dyn LedgerStore>) -> BillingResult<Self> {
        Self::new(
            BillingConfig::from_env()?,
            store,
            BillingEmailService::from_env(),
        )
    }

    /// Create a new billing service with explicit config
    pub fn new(
        config: BillingConfig,
        store: Arc<dyn LedgerStore>,
        email: BillingEmailService,
    ) -> BillingResult<Self> {
        let gateway = Arc::new(PaymentGateway::new(config.gateway)?);
        let catalog = Arc::new(config.catalog);
        let subscriptions = SubscriptionManager::new(store.clone(), config.subscription);

        Ok(Self {
            checkout: CheckoutService::new(store.clone(), gateway.clone(), catalog.clone()),
            payouts: PayoutLedger::new(store.clone(), email.clone()),
            reconciler: PaymentReconciler::new(
                store.clone(),
                gateway.clone(),
                subscriptions.clone(),
                catalog.clone(),
                email.clone(),
            ),
            referrals: ReferralEngine::new(store.clone(), config.referral, email.clone()),
            subaccounts: SubaccountService::new(store.clone(), gateway),
            usage: UsageGate::new(store.clone(), subscriptions.clone(), catalog.clone()),
            subscriptions,
            catalog,
            email,
            store,
        })
    }
}
