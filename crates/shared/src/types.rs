//! Common types used across ShopLedger

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ShopError;

/// The only settlement currency
pub const DEFAULT_CURRENCY: &str = "NGN";

// =============================================================================
// Enums
// =============================================================================

/// Plan tier purchased by an account
/// Ordered: Basic < Pro < Business
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Pro,
    Business,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Basic
    }
}

impl PlanTier {
    /// Highest tier offered by the platform
    pub const HIGHEST: PlanTier = PlanTier::Business;

    pub fn all() -> [PlanTier; 3] {
        [Self::Basic, Self::Pro, Self::Business]
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Pro => write!(f, "pro"),
            Self::Business => write!(f, "business"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            _ => Err(ShopError::Validation(format!("Invalid plan tier: {}", s))),
        }
    }
}

/// Billing cycle of a subscription purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Biannual,
    Yearly,
}

impl BillingCycle {
    /// Days credited to the subscription for one paid cycle
    pub fn days(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Biannual => 180,
            Self::Yearly => 365,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Biannual => write!(f, "biannual"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "quarterly" | "quarter" => Ok(Self::Quarterly),
            "biannual" | "biannually" | "half_yearly" => Ok(Self::Biannual),
            "yearly" | "annual" | "year" => Ok(Self::Yearly),
            _ => Err(ShopError::Validation(format!("Invalid billing cycle: {}", s))),
        }
    }
}

/// What a payment reference settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Order,
    Subscription,
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "order"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

impl std::str::FromStr for SubjectType {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "order" => Ok(Self::Order),
            "subscription" => Ok(Self::Subscription),
            _ => Err(ShopError::Validation(format!("Invalid subject type: {}", s))),
        }
    }
}

/// Payment status of a storefront order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Payout request status
///
/// `pending → processing → completed`, or `pending|processing → failed`.
/// `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a request in this status holds funds against the balance
    pub fn reserves_funds(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Completed)
    }

    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ShopError::Validation(format!("Invalid payout status: {}", s))),
        }
    }
}

/// Referral ambassador tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferralTier {
    Bronze,
    Silver,
    Gold,
}

impl ReferralTier {
    pub fn all() -> [ReferralTier; 3] {
        [Self::Bronze, Self::Silver, Self::Gold]
    }
}

impl std::fmt::Display for ReferralTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
        }
    }
}

/// Referral status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Rewarded,
}

/// Terminal result of the external identity verification (KYC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum KycStatus {
    Verified,
    Pending,
    Failed,
}

impl Default for KycStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Derived subscription status (never stored)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Account (principal) model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub plan_tier: PlanTier,
    /// Paid (true) vs. trial (false)
    pub is_subscribed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    /// Referral gold-tier flag
    pub is_reseller: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Storefront model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Storefront {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    /// Split-payment destination at the processor; set once
    pub payment_subaccount_reference: Option<String>,
    pub commission_percent: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub featured_until: Option<OffsetDateTime>,
    pub kyc_status: KycStatus,
    pub kyc_account_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Storefront order (only the payment-relevant columns)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub storefront_id: Uuid,
    pub customer_email: String,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Append-only revenue record, one per settled order payment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevenueTransaction {
    pub id: Uuid,
    pub storefront_id: Uuid,
    pub order_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_reference: String,
    pub transaction_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Destination bank account for a payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

/// Seller withdrawal request
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub storefront_id: Uuid,
    pub amount_minor: i64,
    pub bank_details: sqlx::types::Json<BankDetails>,
    pub status: PayoutStatus,
    pub admin_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

/// Referral of one account by another
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_account_id: Uuid,
    pub referred_email: String,
    pub status: ReferralStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One-time grant of a referral tier reward; unique per (account_id, tier)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralTierGrant {
    pub id: Uuid,
    pub account_id: Uuid,
    pub tier: ReferralTier,
    #[serde(with = "time::serde::rfc3339")]
    pub claimed_at: OffsetDateTime,
}

/// Per-period feature usage counter
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeatureUsageCounter {
    pub account_id: Uuid,
    pub feature_name: String,
    /// Calendar period key, `YYYY-MM`
    pub period: String,
    pub count: i64,
}
