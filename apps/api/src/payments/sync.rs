//! Payment reconciliation. `sync_pending_payments` polls NowPayments for
//! every non-terminal payment; `apply_upstream_state` is the shared state
//! transition used by both the poller and the IPN webhook, so the two paths
//! cannot disagree. Side effects are idempotent: tier upgrades happen in
//! one transaction with the payment update, and each notification email
//! fires at most once per payment, guarded by a flag set in that same
//! transaction.

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::email::Notifier;
use crate::errors::AppError;
use crate::models::payment::{CryptoPayment, PaymentStatus};
use crate::models::user::User;
use crate::state::AppState;

const AMOUNT_EPSILON: f64 = 1e-9;

/// What the upstream processor currently reports for a payment.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamState {
    pub status: PaymentStatus,
    pub actually_paid: f64,
    pub pay_amount: f64,
}

/// A change is meaningful when the status or the paid amount moved; only
/// meaningful changes persist state or trigger notifications.
pub fn meaningful_change(payment: &CryptoPayment, upstream: &UpstreamState) -> bool {
    payment.status() != upstream.status
        || (payment.actually_paid - upstream.actually_paid).abs() > AMOUNT_EPSILON
}

/// The payment is done and the full amount arrived. `finished` is
/// authoritative; `confirmed` counts only when fully covered, so a partial
/// payment can never complete.
pub fn completes_payment(upstream: &UpstreamState) -> bool {
    match upstream.status {
        PaymentStatus::Finished => true,
        PaymentStatus::Confirmed => {
            upstream.actually_paid + AMOUNT_EPSILON >= upstream.pay_amount
        }
        _ => false,
    }
}

/// Money arrived but not all of it.
pub fn is_partial_payment(upstream: &UpstreamState) -> bool {
    upstream.actually_paid > AMOUNT_EPSILON
        && upstream.actually_paid + AMOUNT_EPSILON < upstream.pay_amount
}

/// New expiry after buying `months` months: stacks on a still-active expiry,
/// otherwise starts from now.
pub fn extend_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    months: i32,
) -> DateTime<Utc> {
    let base = match current {
        Some(expires) if expires > now => expires,
        _ => now,
    };
    base.checked_add_months(Months::new(months.max(0) as u32))
        .unwrap_or(base + Duration::days(30 * months.max(0) as i64))
}

/// Applies an upstream report to a local payment. No-op unless the change
/// is meaningful.
pub async fn apply_upstream_state(
    db: &PgPool,
    notifier: &Notifier,
    payment: &CryptoPayment,
    upstream: UpstreamState,
) -> Result<(), AppError> {
    if !meaningful_change(payment, &upstream) {
        return Ok(());
    }

    if completes_payment(&upstream) {
        complete_payment(db, notifier, payment, &upstream).await
    } else if is_partial_payment(&upstream) {
        record_partial_payment(db, notifier, payment, &upstream).await
    } else {
        sqlx::query(
            "UPDATE crypto_payments SET status = $1, actually_paid = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(upstream.status.as_str())
        .bind(upstream.actually_paid)
        .bind(payment.id)
        .execute(db)
        .await?;
        info!(
            "Payment {} moved to {}",
            payment.order_id,
            upstream.status.as_str()
        );
        Ok(())
    }
}

/// Marks the payment finished and upgrades the buyer, atomically. The
/// confirmation-email flag is set in the same transaction, so a crash
/// between commit and send loses at most one email and never duplicates one.
async fn complete_payment(
    db: &PgPool,
    notifier: &Notifier,
    payment: &CryptoPayment,
    upstream: &UpstreamState,
) -> Result<(), AppError> {
    let now = Utc::now();
    let mut tx = db.begin().await?;

    let send_email = !payment.confirmation_email_sent;
    sqlx::query(
        r#"
        UPDATE crypto_payments
        SET status = 'finished', actually_paid = $1, confirmation_email_sent = TRUE,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(upstream.actually_paid)
    .bind(payment.id)
    .execute(&mut *tx)
    .await?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(payment.user_id)
        .fetch_one(&mut *tx)
        .await?;
    let expires_at = extend_expiry(user.tier_expires_at, now, payment.months);

    sqlx::query(
        r#"
        UPDATE users
        SET tier = $1, tier_expires_at = $2, renewal_reminder_sent_at = NULL
        WHERE id = $3
        "#,
    )
    .bind(&payment.tier)
    .bind(expires_at)
    .bind(user.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Payment {} finished; user {} upgraded to {} until {}",
        payment.order_id, user.id, payment.tier, expires_at
    );

    if send_email {
        if let Some(email) = user.email.as_deref() {
            notifier
                .payment_confirmation(email, &payment.tier, payment.months, expires_at)
                .await;
        }
    }
    Ok(())
}

async fn record_partial_payment(
    db: &PgPool,
    notifier: &Notifier,
    payment: &CryptoPayment,
    upstream: &UpstreamState,
) -> Result<(), AppError> {
    let send_alert = !payment.partial_alert_sent;
    sqlx::query(
        r#"
        UPDATE crypto_payments
        SET status = 'partially_paid', actually_paid = $1, partial_alert_sent = TRUE,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(upstream.actually_paid)
    .bind(payment.id)
    .execute(db)
    .await?;

    warn!(
        "Payment {} partially paid: {} of {} {}",
        payment.order_id, upstream.actually_paid, payment.pay_amount, payment.pay_currency
    );

    if send_alert {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(payment.user_id)
            .fetch_optional(db)
            .await?;
        if let Some(email) = user.and_then(|u| u.email) {
            notifier
                .partial_payment_alert(
                    &email,
                    upstream.actually_paid,
                    payment.pay_amount,
                    &payment.pay_currency,
                    &payment.pay_address,
                )
                .await;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub checked: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Polls NowPayments for every payment still in flight. Per-item failures
/// are logged and the batch continues.
pub async fn sync_pending_payments(state: &AppState) -> Result<SyncSummary, AppError> {
    let statuses: Vec<String> = PaymentStatus::NON_TERMINAL
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    let pending: Vec<CryptoPayment> = sqlx::query_as(
        "SELECT * FROM crypto_payments WHERE status = ANY($1) ORDER BY created_at",
    )
    .bind(&statuses)
    .fetch_all(&state.db)
    .await?;

    let mut summary = SyncSummary {
        checked: pending.len(),
        ..Default::default()
    };

    for payment in &pending {
        let upstream = match state.nowpayments.payment_status(&payment.nowpayments_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Status poll failed for payment {}: {e}",
                    payment.order_id
                );
                summary.errors += 1;
                continue;
            }
        };

        let Some(status) = PaymentStatus::parse(&upstream.payment_status) else {
            warn!(
                "Payment {} reported unknown status '{}'",
                payment.order_id, upstream.payment_status
            );
            summary.errors += 1;
            continue;
        };

        let upstream = UpstreamState {
            status,
            actually_paid: upstream.actually_paid,
            // Fall back to our recorded amount when the poll omits it.
            pay_amount: if upstream.pay_amount > 0.0 {
                upstream.pay_amount
            } else {
                payment.pay_amount
            },
        };

        if meaningful_change(payment, &upstream) {
            match apply_upstream_state(&state.db, &state.notifier, payment, upstream).await {
                Ok(()) => summary.updated += 1,
                Err(e) => {
                    warn!("Failed to apply update for payment {}: {e}", payment.order_id);
                    summary.errors += 1;
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn payment(status: &str, actually_paid: f64) -> CryptoPayment {
        CryptoPayment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            nowpayments_id: "12345".to_string(),
            order_id: "vs-test".to_string(),
            tier: "pro".to_string(),
            months: 1,
            price_amount: 29.0,
            price_currency: "usd".to_string(),
            pay_currency: "eth".to_string(),
            pay_address: "0xabc".to_string(),
            pay_amount: 0.01,
            actually_paid,
            status: status.to_string(),
            promo_code_id: None,
            confirmation_email_sent: false,
            partial_alert_sent: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn upstream(status: PaymentStatus, actually_paid: f64, pay_amount: f64) -> UpstreamState {
        UpstreamState {
            status,
            actually_paid,
            pay_amount,
        }
    }

    #[test]
    fn test_same_state_is_not_meaningful() {
        let p = payment("waiting", 0.0);
        assert!(!meaningful_change(&p, &upstream(PaymentStatus::Waiting, 0.0, 0.01)));
    }

    #[test]
    fn test_status_move_is_meaningful() {
        let p = payment("waiting", 0.0);
        assert!(meaningful_change(&p, &upstream(PaymentStatus::Confirming, 0.0, 0.01)));
    }

    #[test]
    fn test_amount_move_alone_is_meaningful() {
        let p = payment("partially_paid", 0.002);
        assert!(meaningful_change(
            &p,
            &upstream(PaymentStatus::PartiallyPaid, 0.005, 0.01)
        ));
    }

    #[test]
    fn test_finished_completes() {
        assert!(completes_payment(&upstream(PaymentStatus::Finished, 0.01, 0.01)));
    }

    #[test]
    fn test_confirmed_completes_only_when_fully_paid() {
        assert!(completes_payment(&upstream(PaymentStatus::Confirmed, 0.01, 0.01)));
        assert!(!completes_payment(&upstream(PaymentStatus::Confirmed, 0.004, 0.01)));
    }

    #[test]
    fn test_partial_payment_never_completes() {
        let u = upstream(PaymentStatus::PartiallyPaid, 0.004, 0.01);
        assert!(!completes_payment(&u));
        assert!(is_partial_payment(&u));
    }

    #[test]
    fn test_zero_paid_is_not_partial() {
        assert!(!is_partial_payment(&upstream(PaymentStatus::Waiting, 0.0, 0.01)));
    }

    #[test]
    fn test_extend_expiry_from_now_when_lapsed() {
        let now = Utc::now();
        let expired = Some(now - Duration::days(10));
        let extended = extend_expiry(expired, now, 1);
        assert!(extended > now + Duration::days(27));
        assert!(extended < now + Duration::days(32));
    }

    #[test]
    fn test_extend_expiry_stacks_on_active_subscription() {
        let now = Utc::now();
        let active = now + Duration::days(15);
        let extended = extend_expiry(Some(active), now, 1);
        assert!(extended > active + Duration::days(27));
    }
}
