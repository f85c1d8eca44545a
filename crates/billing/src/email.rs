//! Email notifications for ledger events
//!
//! Sends transactional emails via the Resend API. Delivery is fire-and-forget:
//! [`BillingEmailService::dispatch`] spawns the send and a failure is only
//! logged, never returned to the code that mutated the ledger.

use shopledger_shared::{PayoutStatus, ReferralTier};
use time::OffsetDateTime;

use crate::error::BillingResult;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; empty disables sending
    pub resend_api_key: String,
    pub resend_api_url: String,
    pub email_from: String,
    pub app_name: String,
    pub support_email: String,
    /// Dashboard URL used in links
    pub dashboard_url: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            resend_api_url: RESEND_API_URL.to_string(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "ShopLedger <noreply@shopledger.ng>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "ShopLedger".to_string()),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@shopledger.ng".to_string()),
            dashboard_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "https://shopledger.ng".to_string()),
        }
    }

    /// Config that never sends
    pub fn disabled() -> Self {
        Self {
            resend_api_key: String::new(),
            resend_api_url: RESEND_API_URL.to_string(),
            email_from: "ShopLedger <noreply@shopledger.ng>".to_string(),
            app_name: "ShopLedger".to_string(),
            support_email: "support@shopledger.ng".to_string(),
            dashboard_url: "http://localhost:3000".to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Format kobo as naira, e.g. `₦12,500.00`
pub fn format_naira(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    let whole = (abs / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}₦{}.{:02}", sign, grouped, abs % 100)
}

/// A notification to deliver
#[derive(Debug, Clone)]
pub enum Notification {
    /// Seller: an order payment was recorded
    PaymentReceived {
        to: String,
        storefront_name: String,
        amount_minor: i64,
        reference: String,
    },
    /// Account owner: subscription extended by payment
    SubscriptionRenewed {
        to: String,
        plan_name: String,
        expires_at: OffsetDateTime,
    },
    /// Seller: a payout request changed status
    PayoutStatusChanged {
        to: String,
        amount_minor: i64,
        status: PayoutStatus,
        notes: Option<String>,
    },
    /// Account owner: an ambassador tier was unlocked
    ReferralTierGranted {
        to: String,
        tier: ReferralTier,
        reward: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::PaymentReceived { to, .. }
            | Notification::SubscriptionRenewed { to, .. }
            | Notification::PayoutStatusChanged { to, .. }
            | Notification::ReferralTierGranted { to, .. } => to,
        }
    }
}

/// Billing email notification service
#[derive(Clone)]
pub struct BillingEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl BillingEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }

    /// Send in the background; the result is only logged
    pub fn dispatch(&self, notification: Notification) {
        let service = self.clone();
        tokio::spawn(async move {
            let to = notification.recipient().to_string();
            if let Err(e) = service.send(notification).await {
                tracing::error!(to = %to, error = %e, "Notification dispatch failed - non-fatal");
            }
        });
    }

    /// Render and send a notification
    pub async fn send(&self, notification: Notification) -> BillingResult<bool> {
        let (subject, html) = self.render(&notification);
        self.send_email(notification.recipient(), &subject, &html)
            .await
    }

    fn render(&self, notification: &Notification) -> (String, String) {
        let app = &self.config.app_name;
        match notification {
            Notification::PaymentReceived {
                storefront_name,
                amount_minor,
                reference,
                ..
            } => {
                let amount = format_naira(*amount_minor);
                (
                    format!("Payment Received: {} - {}", amount, app),
                    self.layout(
                        "Payment Received",
                        "#16a34a",
                        &format!(
                            "<p>A customer paid <strong>{amount}</strong> to <strong>{storefront_name}</strong>.</p>\
                             <p style=\"color: #666;\">Reference: {reference}</p>\
                             <p>The amount is now part of your available balance.</p>"
                        ),
                    ),
                )
            }
            Notification::SubscriptionRenewed {
                plan_name,
                expires_at,
                ..
            } => {
                let date = format!(
                    "{} {}, {}",
                    expires_at.month(),
                    expires_at.day(),
                    expires_at.year()
                );
                (
                    format!("Subscription Renewed - {}", app),
                    self.layout(
                        "Subscription Renewed",
                        "#6366f1",
                        &format!(
                            "<p>Thanks for your payment. Your <strong>{plan_name}</strong> plan \
                             is active until <strong>{date}</strong>.</p>"
                        ),
                    ),
                )
            }
            Notification::PayoutStatusChanged {
                amount_minor,
                status,
                notes,
                ..
            } => {
                let amount = format_naira(*amount_minor);
                let (headline, color) = match status {
                    PayoutStatus::Pending => ("Withdrawal Requested", "#6366f1"),
                    PayoutStatus::Processing => ("Withdrawal Processing", "#f59e0b"),
                    PayoutStatus::Completed => ("Withdrawal Completed", "#16a34a"),
                    PayoutStatus::Failed => ("Withdrawal Failed", "#dc2626"),
                };
                let note = notes
                    .as_deref()
                    .map(|n| format!("<p style=\"color: #666;\"><strong>Note:</strong> {}</p>", n))
                    .unwrap_or_default();
                (
                    format!("{}: {} - {}", headline, amount, app),
                    self.layout(
                        headline,
                        color,
                        &format!(
                            "<p>Your withdrawal of <strong>{amount}</strong> is now \
                             <strong>{status}</strong>.</p>{note}"
                        ),
                    ),
                )
            }
            Notification::ReferralTierGranted { tier, reward, .. } => (
                format!("You reached {} ambassador - {}", tier, app),
                self.layout(
                    "Ambassador Tier Unlocked",
                    "#6366f1",
                    &format!(
                        "<p>Your referrals unlocked the <strong>{tier}</strong> tier.</p>\
                         <p>Reward: {reward}</p>"
                    ),
                ),
            ),
        }
    }

    fn layout(&self, title: &str, color: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: {color};">{title}</h2>
    <p>Hi there,</p>
    {body}
    <p><a href="{dashboard}" style="color: #6366f1;">Open your dashboard</a></p>
    <p style="color: #666; font-size: 14px;">
        Questions? Contact us at <a href="mailto:{support}">{support}</a>
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app}</p>
</body>
</html>"#,
            dashboard = self.config.dashboard_url,
            support = self.config.support_email,
            app = self.config.app_name,
        )
    }

    /// Send an email via Resend
    ///
    /// `Ok(false)` when sending was skipped or failed; delivery problems are
    /// never errors.
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> BillingResult<bool> {
        if !self.config.is_enabled() {
            tracing::warn!(to = %to, subject = %subject, "Email not configured, skipping");
            return Ok(false);
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post(format!("{}/emails", self.config.resend_api_url))
            .bearer_auth(&self.config.resend_api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Notification email sent");
                Ok(true)
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    status = %status,
                    body = %body,
                    "Failed to send notification email - non-fatal"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    error = %e,
                    "Failed to send notification email - non-fatal"
                );
                Ok(false)
            }
        }
    }
}
