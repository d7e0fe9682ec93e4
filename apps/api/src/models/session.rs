use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A per-device session. At most one active session per (user, device);
/// tier-scoped caps on how many devices may be active at once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub device_label: Option<String>,
    /// SHA-256 of the issued JWT; raw tokens are never stored.
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
