//! Subscription audit events
//!
//! Every mutation of an account's expiry date writes one immutable
//! `SubscriptionEvent` with the expiry before and after, so disputes can be
//! answered from the ledger alone.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Why an expiry date changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventReason {
    /// Trial granted at signup
    TrialStarted,
    /// Paid subscription confirmed by the processor
    PaymentRenewal,
    /// Bronze ambassador reward
    ReferralReward,
    /// Manual extension by an operator
    AdminExtension,
}

impl std::fmt::Display for SubscriptionEventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionEventReason::TrialStarted => "TRIAL_STARTED",
            SubscriptionEventReason::PaymentRenewal => "PAYMENT_RENEWAL",
            SubscriptionEventReason::ReferralReward => "REFERRAL_REWARD",
            SubscriptionEventReason::AdminExtension => "ADMIN_EXTENSION",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SubscriptionEventReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIAL_STARTED" => Ok(Self::TrialStarted),
            "PAYMENT_RENEWAL" => Ok(Self::PaymentRenewal),
            "REFERRAL_REWARD" => Ok(Self::ReferralReward),
            "ADMIN_EXTENSION" => Ok(Self::AdminExtension),
            _ => Err(format!("Invalid subscription event reason: {}", s)),
        }
    }
}

/// Immutable audit row for one expiry-date mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub reason: SubscriptionEventReason,
    /// Set when the extension settled a payment
    pub payment_reference: Option<String>,
    pub plan_id: Option<String>,
    pub days_added: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub previous_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub new_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// Implement FromRow for SubscriptionEvent
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SubscriptionEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let reason: String = row.try_get("reason")?;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            reason: reason.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "reason".to_string(),
                source: e.into(),
            })?,
            payment_reference: row.try_get("payment_reference")?,
            plan_id: row.try_get("plan_id")?,
            days_added: row.try_get("days_added")?,
            previous_expires_at: row.try_get("previous_expires_at")?,
            new_expires_at: row.try_get("new_expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
