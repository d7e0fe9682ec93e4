//! Per-device session admission. Tier-scoped concurrent-device caps are
//! enforced inside a single transaction: upsert the new session, then evict
//! whatever exceeds the cap, oldest first. The session being created always
//! survives.

pub mod handlers;

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::tokens;
use crate::errors::AppError;
use crate::models::session::UserSession;
use crate::models::user::{Tier, User};

/// Concurrent-device caps. `None` means unlimited (admins).
pub fn device_cap(tier: Tier, is_admin: bool) -> Option<usize> {
    if is_admin {
        return None;
    }
    match tier {
        Tier::Free | Tier::Pro => Some(1),
        Tier::Elite => Some(5),
    }
}

/// Given active sessions newest-first, returns the ids to deactivate so at
/// most `cap` remain. The `keep` session (the one being created) is never
/// evicted, whatever its timestamps say.
pub fn sessions_to_evict(active_newest_first: &[UserSession], cap: usize, keep: Uuid) -> Vec<Uuid> {
    let mut kept = 1usize; // the keep session itself
    let mut evict = Vec::new();
    for session in active_newest_first.iter().filter(|s| s.id != keep) {
        if kept < cap {
            kept += 1;
        } else {
            evict.push(session.id);
        }
    }
    evict
}

/// Creates a session for (user, device) and returns the signed token with
/// the session row. Any previous session on the same device is replaced.
pub async fn create_session(
    db: &PgPool,
    jwt_secret: &str,
    user: &User,
    device_id: &str,
    device_label: Option<&str>,
) -> Result<(String, UserSession), AppError> {
    let session_id = Uuid::new_v4();
    let token = tokens::issue(jwt_secret, user.id, session_id)?;
    let token_hash = tokens::token_hash(&token);

    let mut tx = db.begin().await?;

    // At most one active session per device.
    sqlx::query(
        "UPDATE user_sessions SET is_active = FALSE WHERE user_id = $1 AND device_id = $2 AND is_active",
    )
    .bind(user.id)
    .bind(device_id)
    .execute(&mut *tx)
    .await?;

    let session: UserSession = sqlx::query_as(
        r#"
        INSERT INTO user_sessions
            (id, user_id, device_id, device_label, token_hash, is_active, created_at, last_seen_at)
        VALUES ($1, $2, $3, $4, $5, TRUE, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(session_id)
    .bind(user.id)
    .bind(device_id)
    .bind(device_label)
    .bind(&token_hash)
    .fetch_one(&mut *tx)
    .await?;

    let active: Vec<UserSession> = sqlx::query_as(
        r#"
        SELECT * FROM user_sessions
        WHERE user_id = $1 AND is_active = TRUE
        ORDER BY last_seen_at DESC, created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&mut *tx)
    .await?;

    if let Some(cap) = device_cap(user.active_tier(Utc::now()), user.is_admin()) {
        let evict = sessions_to_evict(&active, cap, session_id);
        if !evict.is_empty() {
            info!(
                "Evicting {} session(s) for user {} (cap {})",
                evict.len(),
                user.id,
                cap
            );
            sqlx::query("UPDATE user_sessions SET is_active = FALSE WHERE id = ANY($1)")
                .bind(&evict)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    Ok((token, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn session(id: Uuid, last_seen: DateTime<Utc>) -> UserSession {
        UserSession {
            id,
            user_id: Uuid::new_v4(),
            device_id: id.to_string(),
            device_label: None,
            token_hash: String::new(),
            is_active: true,
            created_at: last_seen,
            last_seen_at: last_seen,
        }
    }

    #[test]
    fn test_device_caps() {
        assert_eq!(device_cap(Tier::Free, false), Some(1));
        assert_eq!(device_cap(Tier::Pro, false), Some(1));
        assert_eq!(device_cap(Tier::Elite, false), Some(5));
        assert_eq!(device_cap(Tier::Free, true), None);
    }

    #[test]
    fn test_oldest_sessions_evicted_first() {
        let now = Utc::now();
        let newest = Uuid::new_v4();
        let middle = Uuid::new_v4();
        let oldest = Uuid::new_v4();
        let active = vec![
            session(newest, now),
            session(middle, now - Duration::hours(1)),
            session(oldest, now - Duration::hours(2)),
        ];

        // Cap 2: the new session plus one more survive; the two oldest go.
        let evict = sessions_to_evict(&active, 2, newest);
        assert_eq!(evict, vec![oldest]);

        // Cap 1: only the new session survives.
        let evict = sessions_to_evict(&active, 1, newest);
        assert_eq!(evict, vec![middle, oldest]);
    }

    #[test]
    fn test_new_session_survives_even_when_oldest() {
        let now = Utc::now();
        let new_session = Uuid::new_v4();
        let other = Uuid::new_v4();
        let active = vec![
            session(other, now),
            session(new_session, now - Duration::hours(5)),
        ];

        let evict = sessions_to_evict(&active, 1, new_session);
        assert_eq!(evict, vec![other]);
    }

    #[test]
    fn test_under_cap_evicts_nothing() {
        let now = Utc::now();
        let keep = Uuid::new_v4();
        let active = vec![session(keep, now), session(Uuid::new_v4(), now)];
        assert!(sessions_to_evict(&active, 5, keep).is_empty());
    }
}
