#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment lifecycle as reported by NowPayments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "waiting" => Some(PaymentStatus::Waiting),
            "confirming" => Some(PaymentStatus::Confirming),
            "confirmed" => Some(PaymentStatus::Confirmed),
            "sending" => Some(PaymentStatus::Sending),
            "partially_paid" => Some(PaymentStatus::PartiallyPaid),
            "finished" => Some(PaymentStatus::Finished),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            "expired" => Some(PaymentStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Confirming => "confirming",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Sending => "sending",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Finished => "finished",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
        }
    }

    /// Terminal payments are never polled again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Finished
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
                | PaymentStatus::Expired
        )
    }

    /// Statuses the reconciliation poller keeps watching.
    pub const NON_TERMINAL: [PaymentStatus; 5] = [
        PaymentStatus::Waiting,
        PaymentStatus::Confirming,
        PaymentStatus::Confirmed,
        PaymentStatus::Sending,
        PaymentStatus::PartiallyPaid,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CryptoPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    /// NowPayments-side payment id, set once the upstream payment exists.
    pub nowpayments_id: String,
    /// Our correlation id, embedded in the upstream order.
    pub order_id: String,
    pub tier: String,
    pub months: i32,
    pub price_amount: f64,
    pub price_currency: String,
    pub pay_currency: String,
    pub pay_address: String,
    pub pay_amount: f64,
    pub actually_paid: f64,
    pub status: String,
    pub promo_code_id: Option<Uuid>,
    pub confirmation_email_sent: bool,
    pub partial_alert_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CryptoPayment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.status).unwrap_or(PaymentStatus::Waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(PaymentStatus::Finished.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::PartiallyPaid.is_terminal());
        assert!(!PaymentStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_non_terminal_list_matches_predicate() {
        for status in PaymentStatus::NON_TERMINAL {
            assert!(!status.is_terminal(), "{} listed as non-terminal", status.as_str());
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for s in [
            "waiting",
            "confirming",
            "confirmed",
            "sending",
            "partially_paid",
            "finished",
            "failed",
            "refunded",
            "expired",
        ] {
            assert_eq!(PaymentStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(PaymentStatus::parse("bogus").is_none());
    }
}
