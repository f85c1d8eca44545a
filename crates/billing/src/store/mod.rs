//! Ledger store
//!
//! The durable record of accounts, storefronts, orders, revenue, payouts,
//! subscription history, referral grants and usage counters. It is the sole
//! owner of these entities: every other component reads and mutates them
//! through the narrow operations below, each of which is atomic.
//!
//! Two backends implement the trait:
//! - [`PgLedgerStore`] for production (Postgres transactions and row locks)
//! - [`MemoryLedgerStore`] for local development without a database and for tests

use async_trait::async_trait;
use shopledger_shared::{
    Account, BankDetails, KycStatus, Order, PayoutRequest, PayoutStatus, PlanTier, Referral,
    ReferralTier, ReferralTierGrant, RevenueTransaction, Storefront,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::events::{SubscriptionEvent, SubscriptionEventReason};

mod memory;
mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// `transaction_type` of revenue recorded for an order payment
pub const ORDER_PAYMENT: &str = "order_payment";

/// Result of an idempotent settlement
#[derive(Debug, Clone)]
pub enum SettlementOutcome<T> {
    /// This call applied the effect
    Applied(T),
    /// The payment reference had already been settled; nothing changed
    AlreadySettled,
}

impl<T> SettlementOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, SettlementOutcome::Applied(_))
    }
}

pub type ExtensionOutcome = SettlementOutcome<SubscriptionEvent>;

/// Result of settling an order payment
#[derive(Debug, Clone)]
pub enum OrderSettlementOutcome {
    Applied(RevenueTransaction),
    AlreadySettled,
    /// The reference was claimed but the order had already been paid through
    /// `paid_reference`; no revenue was recorded
    OrderAlreadyPaid { paid_reference: Option<String> },
}

impl OrderSettlementOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, OrderSettlementOutcome::Applied(_))
    }
}

/// Input for a subscription expiry extension
#[derive(Debug, Clone)]
pub struct SubscriptionExtension {
    pub account_id: Uuid,
    pub added_days: i64,
    pub reason: SubscriptionEventReason,
    /// When set, the extension also settles this payment reference
    pub payment_reference: Option<String>,
    pub plan_id: Option<String>,
    /// Tier purchased with this extension, if any
    pub plan_tier: Option<PlanTier>,
    pub now: OffsetDateTime,
}

/// Input for settling an order payment
#[derive(Debug, Clone)]
pub struct OrderSettlement {
    pub order_id: Uuid,
    pub payment_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewStorefront {
    pub account_id: Uuid,
    pub name: String,
    pub commission_percent: f64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub storefront_id: Uuid,
    pub customer_email: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub storefront_id: Uuid,
    pub amount_minor: i64,
    pub bank_details: BankDetails,
    pub now: OffsetDateTime,
}

/// Outcome of the atomic balance check + payout insert
#[derive(Debug, Clone)]
pub enum PayoutCreation {
    Created(PayoutRequest),
    InsufficientBalance { available_minor: i64 },
}

/// Compare-and-set status change for a payout
#[derive(Debug, Clone)]
pub struct PayoutTransition {
    pub payout_id: Uuid,
    /// Status the payout must currently be in
    pub from: PayoutStatus,
    pub to: PayoutStatus,
    pub notes: Option<String>,
    pub now: OffsetDateTime,
}

/// Reward applied together with a referral tier grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierReward {
    ExtendSubscription { days: i64 },
    FeatureStorefront { days: i64 },
    GrantReseller,
}

#[derive(Debug, Clone)]
pub struct TierGrant {
    pub account_id: Uuid,
    pub tier: ReferralTier,
    pub reward: TierReward,
    pub now: OffsetDateTime,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cheap connectivity check for the readiness route
    async fn ping(&self) -> BillingResult<()>;

    // Accounts
    async fn create_account(&self, email: &str, plan_tier: PlanTier) -> BillingResult<Account>;
    async fn get_account(&self, account_id: Uuid) -> BillingResult<Option<Account>>;

    // Subscriptions

    /// Start a trial if the account never had an expiry; `None` otherwise
    async fn start_trial(
        &self,
        account_id: Uuid,
        trial_days: i64,
        now: OffsetDateTime,
    ) -> BillingResult<Option<SubscriptionEvent>>;

    /// Extend the expiry to `max(now, current) + days`, set `is_subscribed`,
    /// and write the audit event, atomically. With a payment reference the
    /// reference is claimed in the same unit and a lost claim is `AlreadySettled`.
    async fn extend_subscription(
        &self,
        extension: SubscriptionExtension,
    ) -> BillingResult<ExtensionOutcome>;

    async fn subscription_history(&self, account_id: Uuid)
        -> BillingResult<Vec<SubscriptionEvent>>;

    // Storefronts
    async fn create_storefront(&self, storefront: NewStorefront) -> BillingResult<Storefront>;
    async fn get_storefront(&self, storefront_id: Uuid) -> BillingResult<Option<Storefront>>;
    async fn storefront_for_account(&self, account_id: Uuid)
        -> BillingResult<Option<Storefront>>;

    /// Set the split-payment subaccount once; `false` if already set
    async fn set_subaccount_reference(&self, storefront_id: Uuid, code: &str)
        -> BillingResult<bool>;

    async fn record_identity_verification(
        &self,
        storefront_id: Uuid,
        status: KycStatus,
        account_name: Option<&str>,
    ) -> BillingResult<()>;

    // Orders
    async fn create_order(&self, order: NewOrder) -> BillingResult<Order>;
    async fn get_order(&self, order_id: Uuid) -> BillingResult<Option<Order>>;

    // Reconciliation
    async fn is_reference_settled(&self, reference: &str) -> BillingResult<bool>;

    /// Claim the reference, insert the revenue transaction and mark the order
    /// paid, atomically. An order that is already paid only has the reference
    /// claimed.
    async fn settle_order_payment(
        &self,
        settlement: OrderSettlement,
    ) -> BillingResult<OrderSettlementOutcome>;

    async fn revenue_for_storefront(
        &self,
        storefront_id: Uuid,
    ) -> BillingResult<Vec<RevenueTransaction>>;

    // Payouts

    /// Revenue minus completed and in-flight withdrawals
    async fn available_balance(&self, storefront_id: Uuid) -> BillingResult<i64>;

    /// Check the balance and insert a pending payout as one critical section
    /// per storefront
    async fn create_payout_if_funded(&self, payout: NewPayout) -> BillingResult<PayoutCreation>;

    async fn get_payout(&self, payout_id: Uuid) -> BillingResult<Option<PayoutRequest>>;
    async fn list_payouts(&self, storefront_id: Uuid) -> BillingResult<Vec<PayoutRequest>>;
    async fn list_payouts_by_status(
        &self,
        statuses: &[PayoutStatus],
    ) -> BillingResult<Vec<PayoutRequest>>;

    /// Apply the transition only if the payout is still in `from`
    async fn transition_payout(
        &self,
        transition: PayoutTransition,
    ) -> BillingResult<Option<PayoutRequest>>;

    // Usage

    /// Atomically increment and return the new count
    async fn increment_usage(
        &self,
        account_id: Uuid,
        feature: &str,
        period: &str,
    ) -> BillingResult<i64>;

    async fn current_usage(&self, account_id: Uuid, feature: &str, period: &str)
        -> BillingResult<i64>;

    // Referrals
    async fn record_referral(
        &self,
        referrer_account_id: Uuid,
        referred_email: &str,
    ) -> BillingResult<Referral>;

    /// `false` if the referral was already rewarded
    async fn mark_referral_rewarded(&self, referral_id: Uuid) -> BillingResult<bool>;

    async fn count_rewarded_referrals(&self, account_id: Uuid) -> BillingResult<i64>;
    async fn tier_grants(&self, account_id: Uuid) -> BillingResult<Vec<ReferralTierGrant>>;

    /// Insert the grant and apply its reward atomically; `None` if the tier
    /// was already granted
    async fn grant_referral_tier(&self, grant: TierGrant)
        -> BillingResult<Option<ReferralTierGrant>>;
}
