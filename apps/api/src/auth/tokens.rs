use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Access tokens live 30 days; revocation happens through the session row,
/// which the `AuthUser` extractor checks on every request.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Session id — ties the token to one device session.
    pub sid: String,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue(secret: &str, user_id: Uuid, session_id: Uuid) -> Result<String> {
    issue_with_ttl(secret, user_id, session_id, Duration::days(TOKEN_TTL_DAYS))
}

fn issue_with_ttl(secret: &str, user_id: Uuid, session_id: Uuid, ttl: Duration) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        sid: session_id.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to sign token")
}

pub fn verify(secret: &str, token: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}

/// SHA-256 hex digest of a token. Only this digest is persisted with the
/// session row, never the raw token.
pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = issue("test-secret", user_id, session_id).unwrap();

        let claims = verify("test-secret", &token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.sid, session_id.to_string());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue("secret-a", Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(verify("secret-b", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_with_ttl(
            "test-secret",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Duration::days(-1),
        )
        .unwrap();
        assert!(verify("test-secret", &token).is_err());
    }

    #[test]
    fn test_token_hash_is_stable_hex() {
        let h = token_hash("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, token_hash("abc"));
        assert_ne!(h, token_hash("abd"));
    }
}
