use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::extract::AuthUser;
use crate::auth::nonce::{consume_nonce, issue_nonce};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::wallet::{
    caip10, parse_sign_in_message, verify_eip155_signature, verify_solana_signature, WalletChain,
};
use crate::errors::AppError;
use crate::models::user::{User, WalletAccount};
use crate::sessions::create_session;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 64, message = "too long"))]
    pub display_name: Option<String>,
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub device_id: String,
    pub device_label: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub device_id: String,
    pub device_label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// POST /api/v1/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let email = req.email.trim().to_lowercase();

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, tier, role, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, 'free', 'user', NOW())
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(req.display_name.as_deref())
    .fetch_one(&state.db)
    .await?;

    let (token, _session) = create_session(
        &state.db,
        &state.config.jwt_secret,
        &user,
        &req.device_id,
        req.device_label.as_deref(),
    )
    .await?;

    state.notifier.welcome(&email).await;

    Ok(Json(AuthResponse { token, user }))
}

/// POST /api/v1/auth/login
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let email = req.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(u) if u.password_hash.is_some() => u,
        _ => return Err(AppError::Unauthorized),
    };
    let hash = user.password_hash.as_deref().unwrap_or_default();
    if !verify_password(&req.password, hash) {
        return Err(AppError::Unauthorized);
    }

    let (token, _session) = create_session(
        &state.db,
        &state.config.jwt_secret,
        &user,
        &req.device_id,
        req.device_label.as_deref(),
    )
    .await?;

    Ok(Json(AuthResponse { token, user }))
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// GET /api/v1/auth/wallet/nonce
pub async fn handle_wallet_nonce(
    State(state): State<AppState>,
) -> Result<Json<NonceResponse>, AppError> {
    let nonce = issue_nonce(&state.redis).await?;
    Ok(Json(NonceResponse { nonce }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct WalletVerifyRequest {
    /// "eip155" or "solana".
    pub chain: String,
    #[validate(length(min = 1, max = 4096, message = "must be 1-4096 characters"))]
    pub message: String,
    #[validate(length(min = 1, max = 512, message = "must be 1-512 characters"))]
    pub signature: String,
    #[validate(length(min = 1, max = 128, message = "must be 1-128 characters"))]
    pub device_id: String,
    pub device_label: Option<String>,
}

/// Parses and cryptographically verifies a wallet sign-in request, consuming
/// its nonce. Returns the wallet's CAIP-10 identity.
async fn verify_wallet_request(
    state: &AppState,
    req: &WalletVerifyRequest,
) -> Result<(WalletChain, String, String), AppError> {
    let chain = WalletChain::parse(&req.chain)
        .ok_or_else(|| AppError::Validation("chain: must be 'eip155' or 'solana'".to_string()))?;

    let parsed = parse_sign_in_message(chain, &req.message)
        .map_err(|e| AppError::Validation(format!("message: {e}")))?;

    if parsed.domain != state.config.siwe_domain {
        return Err(AppError::Validation(format!(
            "message: domain '{}' is not accepted",
            parsed.domain
        )));
    }

    if !consume_nonce(&state.redis, &parsed.nonce).await? {
        return Err(AppError::Unauthorized);
    }

    match chain {
        WalletChain::Eip155 => {
            verify_eip155_signature(&req.message, &req.signature, &parsed.address)
        }
        WalletChain::Solana => {
            verify_solana_signature(&req.message, &req.signature, &parsed.address)
        }
    }
    .map_err(|_| AppError::Unauthorized)?;

    let identity = caip10(chain, &parsed.address);
    Ok((chain, parsed.address, identity))
}

/// POST /api/v1/auth/wallet/verify
/// Finds or creates the account owning this wallet, then signs it in.
pub async fn handle_wallet_verify(
    State(state): State<AppState>,
    Json(req): Json<WalletVerifyRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let (chain, address, identity) = verify_wallet_request(&state, &req).await?;

    let existing: Option<WalletAccount> =
        sqlx::query_as("SELECT * FROM wallet_accounts WHERE caip10 = $1")
            .bind(&identity)
            .fetch_optional(&state.db)
            .await?;

    let user: User = match existing {
        Some(wallet) => sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(wallet.user_id)
            .fetch_one(&state.db)
            .await?,
        None => {
            let mut tx = state.db.begin().await?;
            let user: User = sqlx::query_as(
                r#"
                INSERT INTO users (id, email, password_hash, display_name, tier, role, created_at)
                VALUES (gen_random_uuid(), NULL, NULL, NULL, 'free', 'user', NOW())
                RETURNING *
                "#,
            )
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO wallet_accounts (id, user_id, caip10, chain, address, created_at)
                VALUES (gen_random_uuid(), $1, $2, $3, $4, NOW())
                "#,
            )
            .bind(user.id)
            .bind(&identity)
            .bind(chain.as_str())
            .bind(&address)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            user
        }
    };

    let (token, _session) = create_session(
        &state.db,
        &state.config.jwt_secret,
        &user,
        &req.device_id,
        req.device_label.as_deref(),
    )
    .await?;

    Ok(Json(AuthResponse { token, user }))
}

/// POST /api/v1/auth/wallet/link
/// Attaches a wallet to the calling account. A wallet already owned by a
/// different account is rejected.
pub async fn handle_wallet_link(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<WalletVerifyRequest>,
) -> Result<Json<WalletAccount>, AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let (chain, address, identity) = verify_wallet_request(&state, &req).await?;

    let existing: Option<WalletAccount> =
        sqlx::query_as("SELECT * FROM wallet_accounts WHERE caip10 = $1")
            .bind(&identity)
            .fetch_optional(&state.db)
            .await?;

    if let Some(wallet) = existing {
        if wallet.user_id == auth.user.id {
            return Ok(Json(wallet)); // already linked here
        }
        return Err(AppError::Conflict(
            "This wallet is already linked to another account".to_string(),
        ));
    }

    let wallet: WalletAccount = sqlx::query_as(
        r#"
        INSERT INTO wallet_accounts (id, user_id, caip10, chain, address, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, NOW())
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(&identity)
    .bind(chain.as_str())
    .bind(&address)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(wallet))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    /// The tier currently in effect (expired paid tiers report `free`).
    pub active_tier: String,
    pub wallets: Vec<WalletAccount>,
}

/// GET /api/v1/me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let wallets: Vec<WalletAccount> =
        sqlx::query_as("SELECT * FROM wallet_accounts WHERE user_id = $1 ORDER BY created_at")
            .bind(auth.user.id)
            .fetch_all(&state.db)
            .await?;

    let active_tier = auth.user.active_tier(chrono::Utc::now()).as_str().to_string();
    Ok(Json(MeResponse {
        user: auth.user,
        active_tier,
        wallets,
    }))
}
