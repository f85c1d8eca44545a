//! In-memory ledger
//!
//! Holds the whole ledger behind one async mutex, so every trait operation is
//! a critical section and the atomicity guarantees of the Postgres backend
//! hold trivially. Used for local development without `DATABASE_URL` and by
//! the test-suite.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use shopledger_shared::{
    Account, KycStatus, Order, PaymentStatus, PayoutRequest, PayoutStatus, PlanTier, Referral,
    ReferralStatus, ReferralTierGrant, RevenueTransaction, Storefront,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ExtensionOutcome, LedgerStore, NewOrder, NewPayout, NewStorefront, OrderSettlement,
    OrderSettlementOutcome, PayoutCreation, PayoutTransition, SettlementOutcome, SubscriptionExtension, TierGrant,
    TierReward, ORDER_PAYMENT,
};
use crate::error::{BillingError, BillingResult};
use crate::events::{SubscriptionEvent, SubscriptionEventReason};
use crate::subscriptions::extended_expiry;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    storefronts: HashMap<Uuid, Storefront>,
    orders: HashMap<Uuid, Order>,
    settled: HashSet<String>,
    revenue: Vec<RevenueTransaction>,
    // Insertion order is request order
    payouts: Vec<PayoutRequest>,
    subscription_events: Vec<SubscriptionEvent>,
    referrals: HashMap<Uuid, Referral>,
    tier_grants: Vec<ReferralTierGrant>,
    usage: HashMap<(Uuid, String, String), i64>,
}

impl LedgerState {
    fn balance(&self, storefront_id: Uuid) -> i64 {
        let revenue: i64 = self
            .revenue
            .iter()
            .filter(|t| t.storefront_id == storefront_id)
            .map(|t| t.amount_minor)
            .sum();
        let reserved: i64 = self
            .payouts
            .iter()
            .filter(|p| p.storefront_id == storefront_id && p.status.reserves_funds())
            .map(|p| p.amount_minor)
            .sum();
        revenue - reserved
    }

    /// Apply an expiry extension; the caller has already claimed any reference
    fn extend(&mut self, ext: &SubscriptionExtension) -> BillingResult<SubscriptionEvent> {
        let account = self
            .accounts
            .get_mut(&ext.account_id)
            .ok_or(BillingError::AccountNotFound(ext.account_id))?;

        let previous = account.subscription_expires_at;
        let new_expiry = extended_expiry(previous, ext.now, ext.added_days)?;
        account.subscription_expires_at = Some(new_expiry);
        account.is_subscribed = true;
        if let Some(tier) = ext.plan_tier {
            account.plan_tier = tier;
        }

        let event = SubscriptionEvent {
            id: Uuid::new_v4(),
            account_id: ext.account_id,
            reason: ext.reason,
            payment_reference: ext.payment_reference.clone(),
            plan_id: ext.plan_id.clone(),
            days_added: ext.added_days,
            previous_expires_at: previous,
            new_expires_at: new_expiry,
            created_at: ext.now,
        };
        self.subscription_events.push(event.clone());
        Ok(event)
    }
}

/// Ledger store kept entirely in process memory
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> BillingResult<()> {
        Ok(())
    }

    async fn create_account(&self, email: &str, plan_tier: PlanTier) -> BillingResult<Account> {
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            plan_tier,
            is_subscribed: false,
            subscription_expires_at: None,
            is_reseller: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.state
            .lock()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> BillingResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&account_id).cloned())
    }

    async fn start_trial(
        &self,
        account_id: Uuid,
        trial_days: i64,
        now: OffsetDateTime,
    ) -> BillingResult<Option<SubscriptionEvent>> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(BillingError::AccountNotFound(account_id))?;

        if account.subscription_expires_at.is_some() {
            return Ok(None);
        }

        let new_expiry = extended_expiry(None, now, trial_days)?;
        account.subscription_expires_at = Some(new_expiry);

        let event = SubscriptionEvent {
            id: Uuid::new_v4(),
            account_id,
            reason: SubscriptionEventReason::TrialStarted,
            payment_reference: None,
            plan_id: None,
            days_added: trial_days,
            previous_expires_at: None,
            new_expires_at: new_expiry,
            created_at: now,
        };
        state.subscription_events.push(event.clone());
        Ok(Some(event))
    }

    async fn extend_subscription(
        &self,
        extension: SubscriptionExtension,
    ) -> BillingResult<ExtensionOutcome> {
        let mut state = self.state.lock().await;

        // Check the account before claiming so a failure leaves no trace
        if !state.accounts.contains_key(&extension.account_id) {
            return Err(BillingError::AccountNotFound(extension.account_id));
        }

        if let Some(reference) = &extension.payment_reference {
            if state.settled.contains(reference) {
                return Ok(SettlementOutcome::AlreadySettled);
            }
        }

        let event = state.extend(&extension)?;
        if let Some(reference) = extension.payment_reference {
            state.settled.insert(reference);
        }
        Ok(SettlementOutcome::Applied(event))
    }

    async fn subscription_history(
        &self,
        account_id: Uuid,
    ) -> BillingResult<Vec<SubscriptionEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .subscription_events
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }

    async fn create_storefront(&self, storefront: NewStorefront) -> BillingResult<Storefront> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&storefront.account_id) {
            return Err(BillingError::AccountNotFound(storefront.account_id));
        }
        if state
            .storefronts
            .values()
            .any(|s| s.account_id == storefront.account_id)
        {
            return Err(BillingError::AlreadyExists(format!(
                "storefront for account {}",
                storefront.account_id
            )));
        }

        let created = Storefront {
            id: Uuid::new_v4(),
            account_id: storefront.account_id,
            name: storefront.name,
            payment_subaccount_reference: None,
            commission_percent: storefront.commission_percent,
            featured_until: None,
            kyc_status: KycStatus::Pending,
            kyc_account_name: None,
            created_at: OffsetDateTime::now_utc(),
        };
        state.storefronts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_storefront(&self, storefront_id: Uuid) -> BillingResult<Option<Storefront>> {
        Ok(self.state.lock().await.storefronts.get(&storefront_id).cloned())
    }

    async fn storefront_for_account(
        &self,
        account_id: Uuid,
    ) -> BillingResult<Option<Storefront>> {
        Ok(self
            .state
            .lock()
            .await
            .storefronts
            .values()
            .find(|s| s.account_id == account_id)
            .cloned())
    }

    async fn set_subaccount_reference(
        &self,
        storefront_id: Uuid,
        code: &str,
    ) -> BillingResult<bool> {
        let mut state = self.state.lock().await;
        let storefront = state
            .storefronts
            .get_mut(&storefront_id)
            .ok_or(BillingError::StorefrontNotFound(storefront_id))?;

        if storefront.payment_subaccount_reference.is_some() {
            return Ok(false);
        }
        storefront.payment_subaccount_reference = Some(code.to_string());
        Ok(true)
    }

    async fn record_identity_verification(
        &self,
        storefront_id: Uuid,
        status: KycStatus,
        account_name: Option<&str>,
    ) -> BillingResult<()> {
        let mut state = self.state.lock().await;
        let storefront = state
            .storefronts
            .get_mut(&storefront_id)
            .ok_or(BillingError::StorefrontNotFound(storefront_id))?;

        storefront.kyc_status = status;
        if let Some(name) = account_name {
            storefront.kyc_account_name = Some(name.to_string());
        }
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> BillingResult<Order> {
        let mut state = self.state.lock().await;
        if !state.storefronts.contains_key(&order.storefront_id) {
            return Err(BillingError::StorefrontNotFound(order.storefront_id));
        }
        if order.amount_minor <= 0 {
            return Err(BillingError::InvalidInput(
                "Order amount must be positive".to_string(),
            ));
        }

        let created = Order {
            id: Uuid::new_v4(),
            storefront_id: order.storefront_id,
            customer_email: order.customer_email,
            amount_minor: order.amount_minor,
            currency: order.currency,
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            created_at: OffsetDateTime::now_utc(),
        };
        state.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, order_id: Uuid) -> BillingResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn is_reference_settled(&self, reference: &str) -> BillingResult<bool> {
        Ok(self.state.lock().await.settled.contains(reference))
    }

    async fn settle_order_payment(
        &self,
        settlement: OrderSettlement,
    ) -> BillingResult<OrderSettlementOutcome> {
        let mut state = self.state.lock().await;

        if state.settled.contains(&settlement.payment_reference) {
            return Ok(OrderSettlementOutcome::AlreadySettled);
        }

        let order = state
            .orders
            .get(&settlement.order_id)
            .ok_or(BillingError::OrderNotFound(settlement.order_id))?;
        let storefront_id = order.storefront_id;
        let paid_reference = (order.payment_status == PaymentStatus::Paid)
            .then(|| order.payment_reference.clone());

        state.settled.insert(settlement.payment_reference.clone());

        if let Some(paid_reference) = paid_reference {
            return Ok(OrderSettlementOutcome::OrderAlreadyPaid { paid_reference });
        }

        let transaction = RevenueTransaction {
            id: Uuid::new_v4(),
            storefront_id,
            order_id: Some(settlement.order_id),
            amount_minor: settlement.amount_minor,
            currency: settlement.currency,
            payment_reference: settlement.payment_reference.clone(),
            transaction_type: ORDER_PAYMENT.to_string(),
            created_at: settlement.now,
        };
        state.revenue.push(transaction.clone());

        if let Some(order) = state.orders.get_mut(&settlement.order_id) {
            order.payment_status = PaymentStatus::Paid;
            order.payment_reference = Some(settlement.payment_reference);
        }

        Ok(OrderSettlementOutcome::Applied(transaction))
    }

    async fn revenue_for_storefront(
        &self,
        storefront_id: Uuid,
    ) -> BillingResult<Vec<RevenueTransaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<_> = state
            .revenue
            .iter()
            .filter(|t| t.storefront_id == storefront_id)
            .cloned()
            .collect();
        transactions.reverse();
        Ok(transactions)
    }

    async fn available_balance(&self, storefront_id: Uuid) -> BillingResult<i64> {
        Ok(self.state.lock().await.balance(storefront_id))
    }

    async fn create_payout_if_funded(&self, payout: NewPayout) -> BillingResult<PayoutCreation> {
        let mut state = self.state.lock().await;
        if !state.storefronts.contains_key(&payout.storefront_id) {
            return Err(BillingError::StorefrontNotFound(payout.storefront_id));
        }

        let available_minor = state.balance(payout.storefront_id);
        if payout.amount_minor > available_minor {
            return Ok(PayoutCreation::InsufficientBalance { available_minor });
        }

        let request = PayoutRequest {
            id: Uuid::new_v4(),
            storefront_id: payout.storefront_id,
            amount_minor: payout.amount_minor,
            bank_details: sqlx::types::Json(payout.bank_details),
            status: PayoutStatus::Pending,
            admin_notes: None,
            requested_at: payout.now,
            processed_at: None,
        };
        state.payouts.push(request.clone());
        Ok(PayoutCreation::Created(request))
    }

    async fn get_payout(&self, payout_id: Uuid) -> BillingResult<Option<PayoutRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .payouts
            .iter()
            .find(|p| p.id == payout_id)
            .cloned())
    }

    async fn list_payouts(&self, storefront_id: Uuid) -> BillingResult<Vec<PayoutRequest>> {
        let state = self.state.lock().await;
        let mut payouts: Vec<_> = state
            .payouts
            .iter()
            .filter(|p| p.storefront_id == storefront_id)
            .cloned()
            .collect();
        payouts.reverse();
        Ok(payouts)
    }

    async fn list_payouts_by_status(
        &self,
        statuses: &[PayoutStatus],
    ) -> BillingResult<Vec<PayoutRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .payouts
            .iter()
            .filter(|p| statuses.contains(&p.status))
            .cloned()
            .collect())
    }

    async fn transition_payout(
        &self,
        transition: PayoutTransition,
    ) -> BillingResult<Option<PayoutRequest>> {
        let mut state = self.state.lock().await;
        let Some(payout) = state
            .payouts
            .iter_mut()
            .find(|p| p.id == transition.payout_id && p.status == transition.from)
        else {
            return Ok(None);
        };

        payout.status = transition.to;
        if transition.notes.is_some() {
            payout.admin_notes = transition.notes;
        }
        if transition.to.is_terminal() {
            payout.processed_at = Some(transition.now);
        }
        Ok(Some(payout.clone()))
    }

    async fn increment_usage(
        &self,
        account_id: Uuid,
        feature: &str,
        period: &str,
    ) -> BillingResult<i64> {
        let mut state = self.state.lock().await;
        let count = state
            .usage
            .entry((account_id, feature.to_string(), period.to_string()))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn current_usage(
        &self,
        account_id: Uuid,
        feature: &str,
        period: &str,
    ) -> BillingResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .usage
            .get(&(account_id, feature.to_string(), period.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn record_referral(
        &self,
        referrer_account_id: Uuid,
        referred_email: &str,
    ) -> BillingResult<Referral> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&referrer_account_id) {
            return Err(BillingError::AccountNotFound(referrer_account_id));
        }

        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_account_id,
            referred_email: referred_email.to_string(),
            status: ReferralStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        state.referrals.insert(referral.id, referral.clone());
        Ok(referral)
    }

    async fn mark_referral_rewarded(&self, referral_id: Uuid) -> BillingResult<bool> {
        let mut state = self.state.lock().await;
        let referral = state.referrals.get_mut(&referral_id).ok_or_else(|| {
            BillingError::InvalidInput(format!("Referral not found: {}", referral_id))
        })?;

        if referral.status == ReferralStatus::Rewarded {
            return Ok(false);
        }
        referral.status = ReferralStatus::Rewarded;
        Ok(true)
    }

    async fn count_rewarded_referrals(&self, account_id: Uuid) -> BillingResult<i64> {
        let count = self
            .state
            .lock()
            .await
            .referrals
            .values()
            .filter(|r| r.referrer_account_id == account_id && r.status == ReferralStatus::Rewarded)
            .count();
        Ok(count as i64)
    }

    async fn tier_grants(&self, account_id: Uuid) -> BillingResult<Vec<ReferralTierGrant>> {
        Ok(self
            .state
            .lock()
            .await
            .tier_grants
            .iter()
            .filter(|g| g.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn grant_referral_tier(
        &self,
        grant: TierGrant,
    ) -> BillingResult<Option<ReferralTierGrant>> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&grant.account_id) {
            return Err(BillingError::AccountNotFound(grant.account_id));
        }
        if state
            .tier_grants
            .iter()
            .any(|g| g.account_id == grant.account_id && g.tier == grant.tier)
        {
            return Ok(None);
        }

        match grant.reward {
            TierReward::ExtendSubscription { days } => {
                state.extend(&SubscriptionExtension {
                    account_id: grant.account_id,
                    added_days: days,
                    reason: SubscriptionEventReason::ReferralReward,
                    payment_reference: None,
                    plan_id: None,
                    plan_tier: None,
                    now: grant.now,
                })?;
            }
            TierReward::FeatureStorefront { days } => {
                if let Some(storefront) = state
                    .storefronts
                    .values_mut()
                    .find(|s| s.account_id == grant.account_id)
                {
                    storefront.featured_until = Some(extended_expiry(
                        storefront.featured_until,
                        grant.now,
                        days,
                    )?);
                }
            }
            TierReward::GrantReseller => {
                if let Some(account) = state.accounts.get_mut(&grant.account_id) {
                    account.is_reseller = true;
                }
            }
        }

        let created = ReferralTierGrant {
            id: Uuid::new_v4(),
            account_id: grant.account_id,
            tier: grant.tier,
            claimed_at: grant.now,
        };
        state.tier_grants.push(created.clone());
        Ok(Some(created))
    }
}
