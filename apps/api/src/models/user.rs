use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription level gating feature limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Elite,
}

impl Tier {
    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            "elite" => Some(Tier::Elite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Elite => "elite",
        }
    }

    /// Paid tiers can be purchased; `free` cannot.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    /// None for wallet-only accounts.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub tier: String,
    pub role: String,
    pub tier_expires_at: Option<DateTime<Utc>>,
    pub renewal_reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Unknown tier strings fall back to `free`.
    pub fn tier(&self) -> Tier {
        Tier::parse(&self.tier).unwrap_or(Tier::Free)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// A paid tier counts only while its expiry is in the future.
    pub fn active_tier(&self, now: DateTime<Utc>) -> Tier {
        let tier = self.tier();
        if tier.is_paid() {
            match self.tier_expires_at {
                Some(expires) if expires > now => tier,
                Some(_) => Tier::Free,
                None => tier, // grandfathered accounts without an expiry
            }
        } else {
            tier
        }
    }
}

/// A wallet linked to a user account, identified by its CAIP-10 string.
/// One wallet belongs to at most one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caip10: String,
    pub chain: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(tier: &str, expires: Option<DateTime<Utc>>) -> User {
        User {
            id: Uuid::new_v4(),
            email: Some("u@example.com".to_string()),
            password_hash: None,
            display_name: None,
            tier: tier.to_string(),
            role: "user".to_string(),
            tier_expires_at: expires,
            renewal_reminder_sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expired_paid_tier_falls_back_to_free() {
        let now = Utc::now();
        let u = user("pro", Some(now - Duration::days(1)));
        assert_eq!(u.active_tier(now), Tier::Free);
    }

    #[test]
    fn test_active_paid_tier() {
        let now = Utc::now();
        let u = user("elite", Some(now + Duration::days(10)));
        assert_eq!(u.active_tier(now), Tier::Elite);
    }

    #[test]
    fn test_unknown_tier_is_free() {
        let u = user("platinum", None);
        assert_eq!(u.tier(), Tier::Free);
    }
}
