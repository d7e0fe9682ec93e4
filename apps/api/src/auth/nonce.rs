//! Single-use nonces for wallet sign-in challenges, stored in Redis with a
//! short TTL. Consumption is GETDEL, so a nonce can never be replayed even
//! across concurrent verify attempts.

use rand::distributions::Alphanumeric;
use rand::Rng;
use redis::Client as RedisClient;

use crate::errors::AppError;

const NONCE_KEY_PREFIX: &str = "auth:nonce:";
const NONCE_TTL_SECS: u64 = 300;
const NONCE_LEN: usize = 16;

/// Random alphanumeric challenge. EIP-4361 requires at least 8 alphanumeric
/// characters; we issue 16.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Issues a fresh nonce, valid for five minutes.
pub async fn issue_nonce(redis: &RedisClient) -> Result<String, AppError> {
    let nonce = generate_nonce();
    let mut conn = redis.get_multiplexed_async_connection().await?;
    redis::cmd("SET")
        .arg(format!("{NONCE_KEY_PREFIX}{nonce}"))
        .arg(1)
        .arg("EX")
        .arg(NONCE_TTL_SECS)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(nonce)
}

/// Consumes a nonce. Returns false when the nonce was never issued, already
/// used, or expired.
pub async fn consume_nonce(redis: &RedisClient, nonce: &str) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let taken: Option<i64> = redis::cmd("GETDEL")
        .arg(format!("{NONCE_KEY_PREFIX}{nonce}"))
        .query_async(&mut conn)
        .await?;
    Ok(taken.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_length_and_charset() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonces_are_unique() {
        assert_ne!(generate_nonce(), generate_nonce());
    }
}
