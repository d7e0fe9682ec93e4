//! Promo code validation. A code must be active, unexpired, and within both
//! its global and per-user usage limits. Usage is recorded when the payment
//! is created, so an abandoned payment still burns a use.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::promo::PromoCode;

/// Pure usability check against already-fetched usage counts.
pub fn promo_usable(
    promo: &PromoCode,
    now: DateTime<Utc>,
    global_uses: i64,
    user_uses: i64,
) -> Result<(), &'static str> {
    if !promo.active {
        return Err("this code is no longer active");
    }
    if promo.percent_off <= 0.0 || promo.percent_off > 100.0 {
        return Err("this code is misconfigured");
    }
    if let Some(expires) = promo.expires_at {
        if expires <= now {
            return Err("this code has expired");
        }
    }
    if let Some(max) = promo.max_uses {
        if global_uses >= max as i64 {
            return Err("this code has been fully redeemed");
        }
    }
    if let Some(limit) = promo.per_user_limit {
        if user_uses >= limit as i64 {
            return Err("you have already used this code");
        }
    }
    Ok(())
}

/// Resolves and validates a promo code for a user. Lookup is
/// case-insensitive.
pub async fn resolve_promo(
    db: &PgPool,
    code: &str,
    user_id: Uuid,
) -> Result<PromoCode, AppError> {
    let promo: Option<PromoCode> =
        sqlx::query_as("SELECT * FROM promo_codes WHERE code = UPPER($1)")
            .bind(code.trim())
            .fetch_optional(db)
            .await?;
    let promo =
        promo.ok_or_else(|| AppError::Validation("promo_code: unknown code".to_string()))?;

    let (global_uses,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM promo_code_usages WHERE promo_code_id = $1")
            .bind(promo.id)
            .fetch_one(db)
            .await?;
    let (user_uses,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM promo_code_usages WHERE promo_code_id = $1 AND user_id = $2",
    )
    .bind(promo.id)
    .bind(user_id)
    .fetch_one(db)
    .await?;

    promo_usable(&promo, Utc::now(), global_uses, user_uses)
        .map_err(|reason| AppError::Validation(format!("promo_code: {reason}")))?;
    Ok(promo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo() -> PromoCode {
        PromoCode {
            id: Uuid::new_v4(),
            code: "LAUNCH20".to_string(),
            percent_off: 20.0,
            max_uses: Some(100),
            per_user_limit: Some(1),
            expires_at: Some(Utc::now() + Duration::days(30)),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_code_passes() {
        assert!(promo_usable(&promo(), Utc::now(), 0, 0).is_ok());
    }

    #[test]
    fn test_inactive_code_rejected() {
        let mut p = promo();
        p.active = false;
        assert!(promo_usable(&p, Utc::now(), 0, 0).is_err());
    }

    #[test]
    fn test_expired_code_rejected() {
        let mut p = promo();
        p.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(promo_usable(&p, Utc::now(), 0, 0).is_err());
    }

    #[test]
    fn test_global_limit_enforced() {
        let p = promo();
        assert!(promo_usable(&p, Utc::now(), 100, 0).is_err());
        assert!(promo_usable(&p, Utc::now(), 99, 0).is_ok());
    }

    #[test]
    fn test_per_user_limit_enforced() {
        let p = promo();
        assert!(promo_usable(&p, Utc::now(), 5, 1).is_err());
    }

    #[test]
    fn test_unlimited_code() {
        let mut p = promo();
        p.max_uses = None;
        p.per_user_limit = None;
        p.expires_at = None;
        assert!(promo_usable(&p, Utc::now(), 1_000_000, 50).is_ok());
    }

    #[test]
    fn test_misconfigured_percent_rejected() {
        let mut p = promo();
        p.percent_off = 0.0;
        assert!(promo_usable(&p, Utc::now(), 0, 0).is_err());
        p.percent_off = 120.0;
        assert!(promo_usable(&p, Utc::now(), 0, 0).is_err());
    }
}
