//! Operator-tunable billing configuration
//!
//! Plans, per-tier feature quotas, trial elevation and referral rewards.
//! Built-in defaults can be replaced by a JSON catalog file
//! (`BILLING_CATALOG_PATH`) and individual environment variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shopledger_shared::{BillingCycle, PlanTier, ReferralTier};

use crate::client::GatewayConfig;
use crate::error::{BillingError, BillingResult};

/// A purchasable subscription plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub tier: PlanTier,
    /// Price in minor units per billing cycle
    pub prices: HashMap<BillingCycle, i64>,
}

impl Plan {
    pub fn price_for(&self, cycle: BillingCycle) -> Option<i64> {
        self.prices.get(&cycle).copied()
    }
}

/// Access level of a feature on a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureLimit", into = "RawFeatureLimit")]
pub enum FeatureLimit {
    /// Feature gated off the tier entirely
    Blocked,
    /// Uses allowed per calendar period
    Limited(u64),
    Unlimited,
}

/// JSON form: a number, `"blocked"` or `"unlimited"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawFeatureLimit {
    Count(u64),
    Keyword(String),
}

impl TryFrom<RawFeatureLimit> for FeatureLimit {
    type Error = String;

    fn try_from(raw: RawFeatureLimit) -> Result<Self, Self::Error> {
        match raw {
            RawFeatureLimit::Count(n) => Ok(FeatureLimit::Limited(n)),
            RawFeatureLimit::Keyword(k) => match k.to_lowercase().as_str() {
                "blocked" => Ok(FeatureLimit::Blocked),
                "unlimited" => Ok(FeatureLimit::Unlimited),
                _ => Err(format!("Invalid feature limit: {}", k)),
            },
        }
    }
}

impl From<FeatureLimit> for RawFeatureLimit {
    fn from(limit: FeatureLimit) -> Self {
        match limit {
            FeatureLimit::Blocked => RawFeatureLimit::Keyword("blocked".to_string()),
            FeatureLimit::Limited(n) => RawFeatureLimit::Count(n),
            FeatureLimit::Unlimited => RawFeatureLimit::Keyword("unlimited".to_string()),
        }
    }
}

/// Plan catalog and per-tier feature quotas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCatalog {
    pub plans: Vec<Plan>,
    /// tier -> feature name -> limit
    pub quotas: HashMap<PlanTier, HashMap<String, FeatureLimit>>,
}

impl PlanCatalog {
    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// Limit for a feature on a tier; features not listed are blocked
    pub fn feature_limit(&self, tier: PlanTier, feature: &str) -> FeatureLimit {
        self.quotas
            .get(&tier)
            .and_then(|features| features.get(feature))
            .copied()
            .unwrap_or(FeatureLimit::Blocked)
    }

    /// Load the catalog from a JSON file
    pub fn from_file(path: &str) -> BillingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BillingError::Config(format!("Cannot read {}: {}", path, e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| BillingError::Config(format!("Invalid catalog {}: {}", path, e)))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let plan = |id: &str, name: &str, tier: PlanTier, monthly: i64| Plan {
            id: id.to_string(),
            name: name.to_string(),
            tier,
            prices: HashMap::from([
                (BillingCycle::Monthly, monthly),
                (BillingCycle::Quarterly, monthly * 3),
                (BillingCycle::Biannual, monthly * 6),
                // Two months free on yearly
                (BillingCycle::Yearly, monthly * 10),
            ]),
        };

        let limits = |entries: &[(&str, FeatureLimit)]| {
            entries
                .iter()
                .map(|(name, limit)| ((*name).to_string(), *limit))
                .collect::<HashMap<_, _>>()
        };

        use FeatureLimit::*;
        Self {
            plans: vec![
                plan("basic", "Basic", PlanTier::Basic, 250_000),
                plan("pro", "Pro", PlanTier::Pro, 750_000),
                plan("business", "Business", PlanTier::Business, 1_500_000),
            ],
            quotas: HashMap::from([
                (
                    PlanTier::Basic,
                    limits(&[
                        ("product_listing", Limited(20)),
                        ("ai_product_description", Blocked),
                        ("ai_marketing_copy", Blocked),
                        ("ai_poster", Blocked),
                    ]),
                ),
                (
                    PlanTier::Pro,
                    limits(&[
                        ("product_listing", Limited(200)),
                        ("ai_product_description", Limited(50)),
                        ("ai_marketing_copy", Limited(50)),
                        ("ai_poster", Limited(20)),
                    ]),
                ),
                (
                    PlanTier::Business,
                    limits(&[
                        ("product_listing", Unlimited),
                        ("ai_product_description", Unlimited),
                        ("ai_marketing_copy", Unlimited),
                        ("ai_poster", Unlimited),
                    ]),
                ),
            ]),
        }
    }
}

/// Referral ambassador thresholds and rewards
#[derive(Debug, Clone)]
pub struct ReferralConfig {
    pub bronze_threshold: i64,
    pub silver_threshold: i64,
    pub gold_threshold: i64,
    /// Subscription days granted at bronze
    pub bronze_extension_days: i64,
    /// Days the storefront is featured at silver
    pub silver_featured_days: i64,
}

impl ReferralConfig {
    pub fn threshold(&self, tier: ReferralTier) -> i64 {
        match tier {
            ReferralTier::Bronze => self.bronze_threshold,
            ReferralTier::Silver => self.silver_threshold,
            ReferralTier::Gold => self.gold_threshold,
        }
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            bronze_threshold: 10,
            silver_threshold: 50,
            gold_threshold: 100,
            bronze_extension_days: 30,
            silver_featured_days: 30,
        }
    }
}

/// Subscription lifecycle settings
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub trial_days: i64,
    /// Access level granted while on trial
    pub trial_tier: PlanTier,
    /// Access level once a subscription has lapsed
    pub lapsed_tier: PlanTier,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            trial_days: 14,
            trial_tier: PlanTier::HIGHEST,
            lapsed_tier: PlanTier::Basic,
        }
    }
}

/// Complete billing configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub gateway: GatewayConfig,
    pub catalog: PlanCatalog,
    pub subscription: SubscriptionConfig,
    pub referral: ReferralConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl BillingConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let catalog = match std::env::var("BILLING_CATALOG_PATH") {
            Ok(path) => PlanCatalog::from_file(&path)?,
            Err(_) => PlanCatalog::default(),
        };

        let defaults = SubscriptionConfig::default();
        let subscription = SubscriptionConfig {
            trial_days: env_parse("TRIAL_DAYS", defaults.trial_days),
            trial_tier: env_parse("TRIAL_TIER", defaults.trial_tier),
            lapsed_tier: env_parse("LAPSED_TIER", defaults.lapsed_tier),
        };

        let defaults = ReferralConfig::default();
        let referral = ReferralConfig {
            bronze_threshold: env_parse("REFERRAL_BRONZE_THRESHOLD", defaults.bronze_threshold),
            silver_threshold: env_parse("REFERRAL_SILVER_THRESHOLD", defaults.silver_threshold),
            gold_threshold: env_parse("REFERRAL_GOLD_THRESHOLD", defaults.gold_threshold),
            bronze_extension_days: env_parse(
                "REFERRAL_BRONZE_DAYS",
                defaults.bronze_extension_days,
            ),
            silver_featured_days: env_parse(
                "REFERRAL_SILVER_FEATURED_DAYS",
                defaults.silver_featured_days,
            ),
        };

        Ok(Self {
            gateway: GatewayConfig::from_env()?,
            catalog,
            subscription,
            referral,
        })
    }
}
