//! Payment processor client
//!
//! Thin request/response wrapper around the processor's HTTP API. No state,
//! no retries: every call is bounded by the configured timeout and fails
//! closed.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// Default processor request timeout
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Configuration for the payment processor
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Processor secret API key
    pub secret_key: String,
    /// Secret used to sign webhook bodies (HMAC-SHA512)
    pub webhook_secret: String,
    /// Processor API base URL
    pub base_url: String,
    /// Where the processor sends the customer after checkout
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("PAYMENT_SECRET_KEY")
            .map_err(|_| BillingError::Config("PAYMENT_SECRET_KEY not set".to_string()))?;

        // The processor signs webhooks with the secret key unless told otherwise
        let webhook_secret =
            std::env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_else(|_| secret_key.clone());

        let timeout_secs = std::env::var("PAYMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS);

        Ok(Self {
            secret_key,
            webhook_secret,
            base_url: std::env::var("PAYMENT_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            callback_url: std::env::var("PAYMENT_CALLBACK_URL").ok(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Standard processor response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Request body for `POST /transaction/initialize`
#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Amount in minor units (kobo)
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Split-payment destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Processor's view of a transaction, as returned by verify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAccount {
    pub account_number: String,
    pub account_name: String,
}

/// Request body for `POST /subaccount`
#[derive(Debug, Clone, Serialize)]
pub struct SubaccountRequest {
    pub business_name: String,
    pub settlement_bank: String,
    pub account_number: String,
    /// Platform's share of each transaction, in percent
    pub percentage_charge: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subaccount {
    pub subaccount_code: String,
}

/// Static bank list served when the processor cannot be reached
pub const FALLBACK_BANKS: &[(&str, &str)] = &[
    ("Access Bank", "044"),
    ("First Bank of Nigeria", "011"),
    ("Guaranty Trust Bank", "058"),
    ("Kuda Bank", "50211"),
    ("Moniepoint MFB", "50515"),
    ("OPay Digital Services", "999992"),
    ("United Bank For Africa", "033"),
    ("Wema Bank", "035"),
    ("Zenith Bank", "057"),
];

pub fn fallback_banks() -> Vec<Bank> {
    FALLBACK_BANKS
        .iter()
        .map(|(name, code)| Bank {
            name: (*name).to_string(),
            code: (*code).to_string(),
        })
        .collect()
}

/// Payment processor client
#[derive(Clone)]
pub struct PaymentGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl PaymentGateway {
    /// Create a new client from config
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    /// Get the config
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `/transaction/verify/<reference>` with the reference as one escaped segment
    fn verify_url(&self, reference: &str) -> BillingResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url("/transaction/verify"))
            .map_err(|e| BillingError::Config(format!("Invalid processor URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BillingError::Config("Processor URL cannot take a path".to_string()))?
            .push(reference);
        Ok(url)
    }

    /// Initialize a transaction and get the hosted checkout URL
    pub async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> BillingResult<InitializedTransaction> {
        let response = self
            .client
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(request)
            .send()
            .await?;

        let data: InitializedTransaction = Self::unwrap_envelope(response).await?;

        tracing::info!(
            reference = %data.reference,
            amount = request.amount,
            "Initialized payment transaction"
        );

        Ok(data)
    }

    /// Ask the processor for the outcome of a transaction
    pub async fn verify_transaction(&self, reference: &str) -> BillingResult<VerifiedTransaction> {
        let response = self
            .client
            .get(self.verify_url(reference)?)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        let mut data: VerifiedTransaction = Self::unwrap_envelope(response).await?;

        // Metadata sometimes comes back as a JSON-encoded string
        if let serde_json::Value::String(raw) = &data.metadata {
            data.metadata = serde_json::from_str(raw).unwrap_or(serde_json::Value::Null);
        }

        Ok(data)
    }

    /// List banks for a country
    pub async fn list_banks(&self, country: &str) -> BillingResult<Vec<Bank>> {
        let response = self
            .client
            .get(self.url("/bank"))
            .bearer_auth(&self.config.secret_key)
            .query(&[("country", country)])
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    /// List banks, falling back to the static list if the processor is unavailable
    pub async fn list_banks_or_cached(&self, country: &str) -> Vec<Bank> {
        match self.list_banks(country).await {
            Ok(banks) if !banks.is_empty() => banks,
            Ok(_) => {
                tracing::warn!(country = %country, "Processor returned no banks, using cached list");
                fallback_banks()
            }
            Err(e) => {
                tracing::warn!(
                    country = %country,
                    error = %e,
                    "Bank list fetch failed, using cached list"
                );
                fallback_banks()
            }
        }
    }

    /// Resolve the registered name on a bank account
    pub async fn resolve_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> BillingResult<ResolvedAccount> {
        let response = self
            .client
            .get(self.url("/bank/resolve"))
            .bearer_auth(&self.config.secret_key)
            .query(&[("account_number", account_number), ("bank_code", bank_code)])
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    /// Create a split-payment subaccount
    pub async fn create_subaccount(&self, request: &SubaccountRequest) -> BillingResult<Subaccount> {
        let response = self
            .client
            .post(self.url("/subaccount"))
            .bearer_auth(&self.config.secret_key)
            .json(request)
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> BillingResult<T> {
        let status = response.status();
        if status.is_server_error() {
            return Err(BillingError::GatewayUnavailable(format!(
                "processor returned {}",
                status
            )));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            BillingError::Gateway(format!("Unreadable processor response ({}): {}", status, e))
        })?;

        if !status.is_success() || !envelope.status {
            return Err(BillingError::Gateway(if envelope.message.is_empty() {
                format!("processor returned {}", status)
            } else {
                envelope.message
            }));
        }

        envelope
            .data
            .ok_or_else(|| BillingError::Gateway("Processor response missing data".to_string()))
    }
}
