//! Subscription purchases through NowPayments: payment creation, promo
//! codes, IPN webhook, and the reconciliation poller.

pub mod handlers;
pub mod promo;
pub mod sync;
pub mod webhook;

use crate::models::user::Tier;

/// Monthly USD list prices.
pub fn monthly_price(tier: Tier) -> Option<f64> {
    match tier {
        Tier::Free => None,
        Tier::Pro => Some(29.0),
        Tier::Elite => Some(99.0),
    }
}

/// Price for a purchase of `months` months. Annual purchases get 20% off.
pub fn price_for(tier: Tier, months: i32) -> Option<f64> {
    if months <= 0 {
        return None;
    }
    let base = monthly_price(tier)? * months as f64;
    let total = if months >= 12 { base * 0.8 } else { base };
    Some(round_cents(total))
}

/// Applies a percentage discount, clamped so the result never goes negative.
pub fn apply_discount(amount: f64, percent_off: f64) -> f64 {
    round_cents((amount * (1.0 - percent_off / 100.0)).max(0.0))
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_pricing() {
        assert_eq!(price_for(Tier::Pro, 1), Some(29.0));
        assert_eq!(price_for(Tier::Elite, 3), Some(297.0));
    }

    #[test]
    fn test_annual_discount() {
        // 29 * 12 = 348, minus 20% = 278.40
        assert_eq!(price_for(Tier::Pro, 12), Some(278.4));
    }

    #[test]
    fn test_free_tier_has_no_price() {
        assert_eq!(price_for(Tier::Free, 1), None);
        assert_eq!(price_for(Tier::Pro, 0), None);
    }

    #[test]
    fn test_discount_rounding() {
        assert_eq!(apply_discount(29.0, 15.0), 24.65);
        assert_eq!(apply_discount(29.0, 100.0), 0.0);
        assert_eq!(apply_discount(29.0, 0.0), 29.0);
    }
}
