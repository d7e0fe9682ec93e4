use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user-submitted request to track a new symbol.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssetSuggestion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub note: Option<String>,
    /// pending | approved | rejected
    pub status: String,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
