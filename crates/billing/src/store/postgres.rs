//! Postgres ledger
//!
//! Every mutation runs in one transaction. Idempotency claims are
//! `INSERT ... ON CONFLICT DO NOTHING RETURNING`; expiry merges lock the
//! account row and payout creation locks the storefront row with
//! `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use shopledger_shared::{
    Account, KycStatus, Order, PaymentStatus, PayoutRequest, PayoutStatus, PlanTier, Referral,
    ReferralTierGrant, RevenueTransaction, Storefront, SubjectType,
};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    ExtensionOutcome, LedgerStore, NewOrder, NewPayout, NewStorefront, OrderSettlement,
    OrderSettlementOutcome, PayoutCreation, PayoutTransition, SettlementOutcome, SubscriptionExtension, TierGrant,
    TierReward, ORDER_PAYMENT,
};
use crate::error::{BillingError, BillingResult};
use crate::events::{SubscriptionEvent, SubscriptionEventReason};
use crate::subscriptions::extended_expiry;

const ACCOUNT_COLUMNS: &str =
    "id, email, plan_tier, is_subscribed, subscription_expires_at, is_reseller, created_at";

const STOREFRONT_COLUMNS: &str = "id, account_id, name, payment_subaccount_reference, \
     commission_percent, featured_until, kyc_status, kyc_account_name, created_at";

const ORDER_COLUMNS: &str = "id, storefront_id, customer_email, amount_minor, currency, \
     payment_status, payment_reference, created_at";

const PAYOUT_COLUMNS: &str = "id, storefront_id, amount_minor, bank_details, status, \
     admin_notes, requested_at, processed_at";

const EVENT_COLUMNS: &str = "id, account_id, reason, payment_reference, plan_id, days_added, \
     previous_expires_at, new_expires_at, created_at";

/// Ledger store backed by Postgres
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Claim a payment reference; `false` if another settlement already holds it
async fn claim_reference(
    conn: &mut PgConnection,
    reference: &str,
    subject_type: SubjectType,
    now: OffsetDateTime,
) -> BillingResult<bool> {
    let claimed: Option<(String,)> = sqlx::query_as(
        r#"
        INSERT INTO settled_payments (payment_reference, subject_type, settled_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (payment_reference) DO NOTHING
        RETURNING payment_reference
        "#,
    )
    .bind(reference)
    .bind(subject_type.to_string())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(claimed.is_some())
}

/// Balance for a storefront as seen by the given connection
async fn balance_on(conn: &mut PgConnection, storefront_id: Uuid) -> BillingResult<i64> {
    let (balance,): (i64,) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
               FROM revenue_transactions WHERE storefront_id = $1)
          - (SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
               FROM payout_requests
              WHERE storefront_id = $1
                AND status IN ('pending', 'processing', 'completed'))
        "#,
    )
    .bind(storefront_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(balance)
}

/// Lock the account, merge the expiry and write the audit event
async fn extend_locked(
    conn: &mut PgConnection,
    ext: &SubscriptionExtension,
) -> BillingResult<SubscriptionEvent> {
    let current: Option<(Option<OffsetDateTime>,)> = sqlx::query_as(
        "SELECT subscription_expires_at FROM accounts WHERE id = $1 FOR UPDATE",
    )
    .bind(ext.account_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((previous,)) = current else {
        return Err(BillingError::AccountNotFound(ext.account_id));
    };

    let new_expiry = extended_expiry(previous, ext.now, ext.added_days)?;

    sqlx::query(
        r#"
        UPDATE accounts
        SET subscription_expires_at = $2,
            is_subscribed = TRUE,
            plan_tier = COALESCE($3, plan_tier)
        WHERE id = $1
        "#,
    )
    .bind(ext.account_id)
    .bind(new_expiry)
    .bind(ext.plan_tier)
    .execute(&mut *conn)
    .await?;

    let event: SubscriptionEvent = sqlx::query_as(&format!(
        r#"
        INSERT INTO subscription_events
            (id, account_id, reason, payment_reference, plan_id, days_added,
             previous_expires_at, new_expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(ext.account_id)
    .bind(ext.reason.to_string())
    .bind(&ext.payment_reference)
    .bind(&ext.plan_id)
    .bind(ext.added_days)
    .bind(previous)
    .bind(new_expiry)
    .bind(ext.now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(event)
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> BillingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_account(&self, email: &str, plan_tier: PlanTier) -> BillingResult<Account> {
        let account = sqlx::query_as(&format!(
            "INSERT INTO accounts (id, email, plan_tier) VALUES ($1, $2, $3) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(plan_tier)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> BillingResult<Option<Account>> {
        let account = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn start_trial(
        &self,
        account_id: Uuid,
        trial_days: i64,
        now: OffsetDateTime,
    ) -> BillingResult<Option<SubscriptionEvent>> {
        let mut tx = self.pool.begin().await?;
        let new_expiry = extended_expiry(None, now, trial_days)?;

        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE accounts SET subscription_expires_at = $2
            WHERE id = $1 AND subscription_expires_at IS NULL
            RETURNING id
            "#,
        )
        .bind(account_id)
        .bind(new_expiry)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            return match self.get_account(account_id).await? {
                Some(_) => Ok(None),
                None => Err(BillingError::AccountNotFound(account_id)),
            };
        }

        let event: SubscriptionEvent = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscription_events
                (id, account_id, reason, days_added, previous_expires_at, new_expires_at, created_at)
            VALUES ($1, $2, $3, $4, NULL, $5, $6)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(SubscriptionEventReason::TrialStarted.to_string())
        .bind(trial_days)
        .bind(new_expiry)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(event))
    }

    async fn extend_subscription(
        &self,
        extension: SubscriptionExtension,
    ) -> BillingResult<ExtensionOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(reference) = &extension.payment_reference {
            if !claim_reference(&mut tx, reference, SubjectType::Subscription, extension.now)
                .await?
            {
                tx.rollback().await?;
                return Ok(SettlementOutcome::AlreadySettled);
            }
        }

        let event = extend_locked(&mut tx, &extension).await?;
        tx.commit().await?;

        Ok(SettlementOutcome::Applied(event))
    }

    async fn subscription_history(
        &self,
        account_id: Uuid,
    ) -> BillingResult<Vec<SubscriptionEvent>> {
        let events = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM subscription_events WHERE account_id = $1 ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn create_storefront(&self, storefront: NewStorefront) -> BillingResult<Storefront> {
        if self.get_account(storefront.account_id).await?.is_none() {
            return Err(BillingError::AccountNotFound(storefront.account_id));
        }

        let created: Option<Storefront> = sqlx::query_as(&format!(
            r#"
            INSERT INTO storefronts (id, account_id, name, commission_percent)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id) DO NOTHING
            RETURNING {STOREFRONT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(storefront.account_id)
        .bind(&storefront.name)
        .bind(storefront.commission_percent)
        .fetch_optional(&self.pool)
        .await?;

        created.ok_or_else(|| {
            BillingError::AlreadyExists(format!("storefront for account {}", storefront.account_id))
        })
    }

    async fn get_storefront(&self, storefront_id: Uuid) -> BillingResult<Option<Storefront>> {
        let storefront = sqlx::query_as(&format!(
            "SELECT {STOREFRONT_COLUMNS} FROM storefronts WHERE id = $1"
        ))
        .bind(storefront_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(storefront)
    }

    async fn storefront_for_account(
        &self,
        account_id: Uuid,
    ) -> BillingResult<Option<Storefront>> {
        let storefront = sqlx::query_as(&format!(
            "SELECT {STOREFRONT_COLUMNS} FROM storefronts WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(storefront)
    }

    async fn set_subaccount_reference(
        &self,
        storefront_id: Uuid,
        code: &str,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE storefronts SET payment_subaccount_reference = $2
            WHERE id = $1 AND payment_subaccount_reference IS NULL
            "#,
        )
        .bind(storefront_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.get_storefront(storefront_id).await? {
            Some(_) => Ok(false),
            None => Err(BillingError::StorefrontNotFound(storefront_id)),
        }
    }

    async fn record_identity_verification(
        &self,
        storefront_id: Uuid,
        status: KycStatus,
        account_name: Option<&str>,
    ) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE storefronts
            SET kyc_status = $2, kyc_account_name = COALESCE($3, kyc_account_name)
            WHERE id = $1
            "#,
        )
        .bind(storefront_id)
        .bind(status)
        .bind(account_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::StorefrontNotFound(storefront_id));
        }
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> BillingResult<Order> {
        if self.get_storefront(order.storefront_id).await?.is_none() {
            return Err(BillingError::StorefrontNotFound(order.storefront_id));
        }
        if order.amount_minor <= 0 {
            return Err(BillingError::InvalidInput(
                "Order amount must be positive".to_string(),
            ));
        }

        let created = sqlx::query_as(&format!(
            r#"
            INSERT INTO orders (id, storefront_id, customer_email, amount_minor, currency)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(order.storefront_id)
        .bind(&order.customer_email)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_order(&self, order_id: Uuid) -> BillingResult<Option<Order>> {
        let order = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn is_reference_settled(&self, reference: &str) -> BillingResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM settled_payments WHERE payment_reference = $1)",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn settle_order_payment(
        &self,
        settlement: OrderSettlement,
    ) -> BillingResult<OrderSettlementOutcome> {
        let mut tx = self.pool.begin().await?;

        if !claim_reference(
            &mut tx,
            &settlement.payment_reference,
            SubjectType::Order,
            settlement.now,
        )
        .await?
        {
            tx.rollback().await?;
            return Ok(OrderSettlementOutcome::AlreadySettled);
        }

        let order: Option<(Uuid, PaymentStatus, Option<String>)> = sqlx::query_as(
            r#"
            SELECT storefront_id, payment_status, payment_reference
            FROM orders WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(settlement.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((storefront_id, payment_status, paid_reference)) = order else {
            tx.rollback().await?;
            return Err(BillingError::OrderNotFound(settlement.order_id));
        };

        // Keep the claim so redelivery of this reference is a no-op
        if payment_status == PaymentStatus::Paid {
            tx.commit().await?;
            return Ok(OrderSettlementOutcome::OrderAlreadyPaid { paid_reference });
        }

        let transaction: RevenueTransaction = sqlx::query_as(
            r#"
            INSERT INTO revenue_transactions
                (id, storefront_id, order_id, amount_minor, currency,
                 payment_reference, transaction_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, storefront_id, order_id, amount_minor, currency,
                      payment_reference, transaction_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(storefront_id)
        .bind(settlement.order_id)
        .bind(settlement.amount_minor)
        .bind(&settlement.currency)
        .bind(&settlement.payment_reference)
        .bind(ORDER_PAYMENT)
        .bind(settlement.now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE orders SET payment_status = 'paid', payment_reference = $2 WHERE id = $1",
        )
        .bind(settlement.order_id)
        .bind(&settlement.payment_reference)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(OrderSettlementOutcome::Applied(transaction))
    }

    async fn revenue_for_storefront(
        &self,
        storefront_id: Uuid,
    ) -> BillingResult<Vec<RevenueTransaction>> {
        let transactions = sqlx::query_as(
            r#"
            SELECT id, storefront_id, order_id, amount_minor, currency,
                   payment_reference, transaction_type, created_at
            FROM revenue_transactions
            WHERE storefront_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(storefront_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn available_balance(&self, storefront_id: Uuid) -> BillingResult<i64> {
        let mut conn = self.pool.acquire().await?;
        balance_on(&mut conn, storefront_id).await
    }

    async fn create_payout_if_funded(&self, payout: NewPayout) -> BillingResult<PayoutCreation> {
        let mut tx = self.pool.begin().await?;

        // Serializes balance check + insert per storefront
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM storefronts WHERE id = $1 FOR UPDATE")
                .bind(payout.storefront_id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            tx.rollback().await?;
            return Err(BillingError::StorefrontNotFound(payout.storefront_id));
        }

        let available_minor = balance_on(&mut tx, payout.storefront_id).await?;
        if payout.amount_minor > available_minor {
            tx.rollback().await?;
            return Ok(PayoutCreation::InsufficientBalance { available_minor });
        }

        let request: PayoutRequest = sqlx::query_as(&format!(
            r#"
            INSERT INTO payout_requests (id, storefront_id, amount_minor, bank_details, status, requested_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(payout.storefront_id)
        .bind(payout.amount_minor)
        .bind(sqlx::types::Json(&payout.bank_details))
        .bind(payout.now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(PayoutCreation::Created(request))
    }

    async fn get_payout(&self, payout_id: Uuid) -> BillingResult<Option<PayoutRequest>> {
        let payout = sqlx::query_as(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE id = $1"
        ))
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn list_payouts(&self, storefront_id: Uuid) -> BillingResult<Vec<PayoutRequest>> {
        let payouts = sqlx::query_as(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE storefront_id = $1 ORDER BY requested_at DESC"
        ))
        .bind(storefront_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    async fn list_payouts_by_status(
        &self,
        statuses: &[PayoutStatus],
    ) -> BillingResult<Vec<PayoutRequest>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        let payouts = sqlx::query_as(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE status = ANY($1) ORDER BY requested_at ASC"
        ))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    async fn transition_payout(
        &self,
        transition: PayoutTransition,
    ) -> BillingResult<Option<PayoutRequest>> {
        let processed_at = transition.to.is_terminal().then_some(transition.now);

        let payout = sqlx::query_as(&format!(
            r#"
            UPDATE payout_requests
            SET status = $3,
                admin_notes = COALESCE($4, admin_notes),
                processed_at = COALESCE($5, processed_at)
            WHERE id = $1 AND status = $2
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(transition.payout_id)
        .bind(transition.from)
        .bind(transition.to)
        .bind(&transition.notes)
        .bind(processed_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn increment_usage(
        &self,
        account_id: Uuid,
        feature: &str,
        period: &str,
    ) -> BillingResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feature_usage_counters (account_id, feature_name, period, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (account_id, feature_name, period)
            DO UPDATE SET count = feature_usage_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(account_id)
        .bind(feature)
        .bind(period)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn current_usage(
        &self,
        account_id: Uuid,
        feature: &str,
        period: &str,
    ) -> BillingResult<i64> {
        let count: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT count FROM feature_usage_counters
            WHERE account_id = $1 AND feature_name = $2 AND period = $3
            "#,
        )
        .bind(account_id)
        .bind(feature)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(|(c,)| c).unwrap_or(0))
    }

    async fn record_referral(
        &self,
        referrer_account_id: Uuid,
        referred_email: &str,
    ) -> BillingResult<Referral> {
        if self.get_account(referrer_account_id).await?.is_none() {
            return Err(BillingError::AccountNotFound(referrer_account_id));
        }

        let referral = sqlx::query_as(
            r#"
            INSERT INTO referrals (id, referrer_account_id, referred_email)
            VALUES ($1, $2, $3)
            RETURNING id, referrer_account_id, referred_email, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(referrer_account_id)
        .bind(referred_email)
        .fetch_one(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn mark_referral_rewarded(&self, referral_id: Uuid) -> BillingResult<bool> {
        let updated: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE referrals SET status = 'rewarded' WHERE id = $1 AND status = 'pending' RETURNING id",
        )
        .bind(referral_id)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(true);
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM referrals WHERE id = $1)")
                .bind(referral_id)
                .fetch_one(&self.pool)
                .await?;

        if exists {
            Ok(false)
        } else {
            Err(BillingError::InvalidInput(format!(
                "Referral not found: {}",
                referral_id
            )))
        }
    }

    async fn count_rewarded_referrals(&self, account_id: Uuid) -> BillingResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM referrals WHERE referrer_account_id = $1 AND status = 'rewarded'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn tier_grants(&self, account_id: Uuid) -> BillingResult<Vec<ReferralTierGrant>> {
        let grants = sqlx::query_as(
            r#"
            SELECT id, account_id, tier, claimed_at FROM referral_tier_grants
            WHERE account_id = $1 ORDER BY claimed_at ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    async fn grant_referral_tier(
        &self,
        grant: TierGrant,
    ) -> BillingResult<Option<ReferralTierGrant>> {
        let mut tx = self.pool.begin().await?;

        let account: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(grant.account_id)
                .fetch_optional(&mut *tx)
                .await?;

        if account.is_none() {
            tx.rollback().await?;
            return Err(BillingError::AccountNotFound(grant.account_id));
        }

        let created: Option<ReferralTierGrant> = sqlx::query_as(
            r#"
            INSERT INTO referral_tier_grants (id, account_id, tier, claimed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, tier) DO NOTHING
            RETURNING id, account_id, tier, claimed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(grant.account_id)
        .bind(grant.tier)
        .bind(grant.now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = created else {
            tx.rollback().await?;
            return Ok(None);
        };

        match grant.reward {
            TierReward::ExtendSubscription { days } => {
                extend_locked(
                    &mut tx,
                    &SubscriptionExtension {
                        account_id: grant.account_id,
                        added_days: days,
                        reason: SubscriptionEventReason::ReferralReward,
                        payment_reference: None,
                        plan_id: None,
                        plan_tier: None,
                        now: grant.now,
                    },
                )
                .await?;
            }
            TierReward::FeatureStorefront { days } => {
                let featured: Option<(Uuid, Option<OffsetDateTime>)> = sqlx::query_as(
                    "SELECT id, featured_until FROM storefronts WHERE account_id = $1 FOR UPDATE",
                )
                .bind(grant.account_id)
                .fetch_optional(&mut *tx)
                .await?;

                if let Some((storefront_id, featured_until)) = featured {
                    sqlx::query("UPDATE storefronts SET featured_until = $2 WHERE id = $1")
                        .bind(storefront_id)
                        .bind(extended_expiry(featured_until, grant.now, days)?)
                        .execute(&mut *tx)
                        .await?;
                }
            }
            TierReward::GrantReseller => {
                sqlx::query("UPDATE accounts SET is_reseller = TRUE WHERE id = $1")
                    .bind(grant.account_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(Some(created))
    }
}
