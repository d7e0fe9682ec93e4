use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::extract::{AdminUser, AuthUser};
use crate::clients::nowpayments::CreatePaymentRequest as NpCreateRequest;
use crate::errors::AppError;
use crate::models::payment::CryptoPayment;
use crate::models::promo::PromoCode;
use crate::models::user::Tier;
use crate::payments::promo::resolve_promo;
use crate::payments::{apply_discount, price_for};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentBody {
    /// "pro" or "elite".
    pub tier: String,
    #[validate(range(min = 1, max = 12, message = "must be between 1 and 12"))]
    pub months: i32,
    #[validate(length(min = 2, max = 16, message = "must be 2-16 characters"))]
    pub pay_currency: String,
    pub promo_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment: CryptoPayment,
}

/// POST /api/v1/payments — price the purchase, create the upstream payment,
/// and record it locally in `waiting`.
pub async fn handle_create_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreatePaymentBody>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    req.validate().map_err(AppError::from_validation)?;

    let tier = Tier::parse(&req.tier)
        .filter(Tier::is_paid)
        .ok_or_else(|| AppError::Validation("tier: must be 'pro' or 'elite'".to_string()))?;
    let list_price = price_for(tier, req.months)
        .ok_or_else(|| AppError::Validation("months: invalid purchase length".to_string()))?;

    let promo: Option<PromoCode> = match req.promo_code.as_deref() {
        Some(code) if !code.trim().is_empty() => {
            Some(resolve_promo(&state.db, code, auth.user.id).await?)
        }
        _ => None,
    };
    let price = match &promo {
        Some(p) => apply_discount(list_price, p.percent_off),
        None => list_price,
    };

    let order_id = format!("vs-{}", Uuid::new_v4());
    let ipn_callback_url = format!("{}/api/v1/payments/webhook", state.config.app_base_url);
    let description = format!("VolSpike {} subscription, {} month(s)", tier.as_str(), req.months);
    let pay_currency = req.pay_currency.to_lowercase();

    let upstream = state
        .nowpayments
        .create_payment(&NpCreateRequest {
            price_amount: price,
            price_currency: "usd",
            pay_currency: &pay_currency,
            order_id: &order_id,
            order_description: &description,
            ipn_callback_url: &ipn_callback_url,
        })
        .await
        .map_err(|e| AppError::Upstream {
            service: "NowPayments",
            message: e.to_string(),
        })?;

    let mut tx = state.db.begin().await?;
    let payment: CryptoPayment = sqlx::query_as(
        r#"
        INSERT INTO crypto_payments
            (id, user_id, nowpayments_id, order_id, tier, months, price_amount,
             price_currency, pay_currency, pay_address, pay_amount, actually_paid,
             status, promo_code_id, confirmation_email_sent, partial_alert_sent,
             created_at, updated_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'usd', $7, $8, $9, 0,
                $10, $11, FALSE, FALSE, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(upstream.payment_id.to_string())
    .bind(&order_id)
    .bind(tier.as_str())
    .bind(req.months)
    .bind(price)
    .bind(&upstream.pay_currency)
    .bind(&upstream.pay_address)
    .bind(upstream.pay_amount)
    .bind(&upstream.payment_status)
    .bind(promo.as_ref().map(|p| p.id))
    .fetch_one(&mut *tx)
    .await?;

    // Usage is burned at creation time, even if the payment is abandoned.
    if let Some(promo) = &promo {
        sqlx::query(
            r#"
            INSERT INTO promo_code_usages (id, promo_code_id, user_id, payment_id, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, NOW())
            "#,
        )
        .bind(promo.id)
        .bind(auth.user.id)
        .bind(payment.id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse { payment }),
    ))
}

/// GET /api/v1/payments — the caller's payment history, newest first.
pub async fn handle_list_payments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CryptoPayment>>, AppError> {
    let payments: Vec<CryptoPayment> = sqlx::query_as(
        "SELECT * FROM crypto_payments WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(payments))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromoRequest {
    #[validate(length(min = 3, max = 32, message = "must be 3-32 characters"))]
    pub code: String,
    #[validate(range(min = 0.01, max = 100.0, message = "must be in (0, 100]"))]
    pub percent_off: f64,
    pub max_uses: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/admin/promo-codes
pub async fn handle_admin_create_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreatePromoRequest>,
) -> Result<(StatusCode, Json<PromoCode>), AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let code = req.code.trim().to_uppercase();

    let existing: Option<PromoCode> = sqlx::query_as("SELECT * FROM promo_codes WHERE code = $1")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!("Promo code {code} already exists")));
    }

    let promo: PromoCode = sqlx::query_as(
        r#"
        INSERT INTO promo_codes
            (id, code, percent_off, max_uses, per_user_limit, expires_at, active, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, TRUE, NOW())
        RETURNING *
        "#,
    )
    .bind(&code)
    .bind(req.percent_off)
    .bind(req.max_uses)
    .bind(req.per_user_limit)
    .bind(req.expires_at)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(promo)))
}

/// GET /api/v1/admin/promo-codes
pub async fn handle_admin_list_promos(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<PromoCode>>, AppError> {
    let promos: Vec<PromoCode> =
        sqlx::query_as("SELECT * FROM promo_codes ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(promos))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromoRequest {
    pub active: Option<bool>,
    pub max_uses: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// PATCH /api/v1/admin/promo-codes/:id
pub async fn handle_admin_update_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromoRequest>,
) -> Result<Json<PromoCode>, AppError> {
    let current: PromoCode = sqlx::query_as("SELECT * FROM promo_codes WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Promo code {id} not found")))?;

    let promo: PromoCode = sqlx::query_as(
        r#"
        UPDATE promo_codes
        SET active = $1, max_uses = $2, per_user_limit = $3, expires_at = $4
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(req.active.unwrap_or(current.active))
    .bind(req.max_uses.or(current.max_uses))
    .bind(req.per_user_limit.or(current.per_user_limit))
    .bind(req.expires_at.or(current.expires_at))
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(promo))
}

/// DELETE /api/v1/admin/promo-codes/:id
pub async fn handle_admin_delete_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = sqlx::query("DELETE FROM promo_codes WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Promo code {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
