//! Notification emails — plain-text bodies over a pluggable delivery seam.
//!
//! `AppState` holds a `Notifier` wrapping an `Arc<dyn EmailDelivery>`, so
//! tests can swap in a recording stub without a SendGrid account.
//! Delivery is best-effort everywhere: a failed send is logged with the
//! recipient and kind, and never aborts the operation that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::clients::sendgrid::SendGridClient;

#[async_trait]
pub trait EmailDelivery: Send + Sync {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl EmailDelivery for SendGridClient {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        Ok(self.send(to, subject, body).await?)
    }
}

#[derive(Clone)]
pub struct Notifier {
    delivery: Arc<dyn EmailDelivery>,
    app_base_url: String,
}

impl Notifier {
    pub fn new(delivery: Arc<dyn EmailDelivery>, app_base_url: String) -> Self {
        Self {
            delivery,
            app_base_url,
        }
    }

    pub async fn payment_confirmation(
        &self,
        to: &str,
        tier: &str,
        months: i32,
        expires_at: DateTime<Utc>,
    ) {
        let subject = format!("Your VolSpike {tier} subscription is active");
        let body = payment_confirmation_body(tier, months, expires_at, &self.app_base_url);
        self.send_best_effort(to, &subject, &body, "payment_confirmation")
            .await;
    }

    pub async fn partial_payment_alert(
        &self,
        to: &str,
        actually_paid: f64,
        pay_amount: f64,
        pay_currency: &str,
        pay_address: &str,
    ) {
        let subject = "Your VolSpike payment is incomplete".to_string();
        let body =
            partial_payment_body(actually_paid, pay_amount, pay_currency, pay_address);
        self.send_best_effort(to, &subject, &body, "partial_payment_alert")
            .await;
    }

    pub async fn renewal_reminder(&self, to: &str, tier: &str, days_left: i64) {
        let subject = format!("Your VolSpike {tier} subscription expires soon");
        let body = renewal_reminder_body(tier, days_left, &self.app_base_url);
        self.send_best_effort(to, &subject, &body, "renewal_reminder")
            .await;
    }

    pub async fn welcome(&self, to: &str) {
        let body = format!(
            "Welcome to VolSpike!\n\n\
             Build a watchlist and set up your first market alert at {}.\n",
            self.app_base_url
        );
        self.send_best_effort(to, "Welcome to VolSpike", &body, "welcome")
            .await;
    }

    async fn send_best_effort(&self, to: &str, subject: &str, body: &str, kind: &str) {
        match self.delivery.deliver(to, subject, body).await {
            Ok(()) => info!("Sent {kind} email to {to}"),
            Err(e) => warn!("Failed to send {kind} email to {to}: {e}"),
        }
    }
}

fn payment_confirmation_body(
    tier: &str,
    months: i32,
    expires_at: DateTime<Utc>,
    base_url: &str,
) -> String {
    format!(
        "Thanks for subscribing to VolSpike {tier}.\n\n\
         Your {months}-month subscription is active until {}.\n\
         Manage your account at {base_url}/account.\n",
        expires_at.format("%Y-%m-%d")
    )
}

fn partial_payment_body(
    actually_paid: f64,
    pay_amount: f64,
    pay_currency: &str,
    pay_address: &str,
) -> String {
    let outstanding = (pay_amount - actually_paid).max(0.0);
    format!(
        "We received {actually_paid} {pay_currency} of the {pay_amount} {pay_currency} due.\n\n\
         Send the remaining {outstanding} {pay_currency} to {pay_address} to activate \
         your subscription. Partial payments do not unlock paid features.\n"
    )
}

fn renewal_reminder_body(tier: &str, days_left: i64, base_url: &str) -> String {
    let when = if days_left <= 0 {
        "today".to_string()
    } else if days_left == 1 {
        "tomorrow".to_string()
    } else {
        format!("in {days_left} days")
    };
    format!(
        "Your VolSpike {tier} subscription expires {when}.\n\n\
         Renew at {base_url}/account/billing to keep your alerts running.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_payment_body_shows_outstanding() {
        let body = partial_payment_body(0.5, 2.0, "ETH", "0xabc");
        assert!(body.contains("1.5 ETH"));
        assert!(body.contains("0xabc"));
    }

    #[test]
    fn test_partial_payment_body_never_negative() {
        let body = partial_payment_body(3.0, 2.0, "ETH", "0xabc");
        assert!(body.contains("remaining 0 ETH"));
    }

    #[test]
    fn test_renewal_reminder_phrasing() {
        assert!(renewal_reminder_body("pro", 0, "https://x").contains("expires today"));
        assert!(renewal_reminder_body("pro", 1, "https://x").contains("expires tomorrow"));
        assert!(renewal_reminder_body("pro", 3, "https://x").contains("in 3 days"));
    }
}
