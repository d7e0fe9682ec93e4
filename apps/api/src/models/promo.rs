use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    /// Stored uppercase; lookups are case-insensitive.
    pub code: String,
    pub percent_off: f64,
    /// None = unlimited.
    pub max_uses: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromoCodeUsage {
    pub id: Uuid,
    pub promo_code_id: Uuid,
    pub user_id: Uuid,
    pub payment_id: Uuid,
    pub created_at: DateTime<Utc>,
}
