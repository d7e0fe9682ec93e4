//! In-process background jobs: payment reconciliation, the scheduled asset
//! refresh cycle, asset discovery, and renewal reminders. Every loop
//! catches and logs per-tick errors; a failed tick never kills the loop.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::assets::discovery::discover_assets;
use crate::assets::refresh::run_refresh_cycle;
use crate::errors::AppError;
use crate::models::user::User;
use crate::payments::sync::sync_pending_payments;
use crate::state::AppState;

const PAYMENT_SYNC_INTERVAL: Duration = Duration::from_secs(2 * 60);
const REFRESH_CYCLE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const DAILY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// How close to expiry a subscription must be before we remind.
const RENEWAL_REMINDER_DAYS: i64 = 3;

pub fn spawn_background_jobs(state: AppState) {
    if !state.config.enable_background_jobs {
        info!("Background jobs disabled (ENABLE_BACKGROUND_JOBS=false)");
        return;
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PAYMENT_SYNC_INTERVAL);
            loop {
                ticker.tick().await;
                match sync_pending_payments(&state).await {
                    Ok(summary) if summary.checked > 0 => info!(
                        "Payment sync: {} checked, {} updated, {} errors",
                        summary.checked, summary.updated, summary.errors
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Payment sync failed: {e}"),
                }
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_CYCLE_INTERVAL);
            ticker.tick().await; // skip the immediate tick; no refresh storm on boot
            loop {
                ticker.tick().await;
                if let Err(e) =
                    run_refresh_cycle(&state.db, &state.coingecko, &state.refresh, "scheduled")
                        .await
                {
                    warn!("Scheduled refresh cycle skipped: {e}");
                }
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DAILY_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = discover_assets(&state.db, &state.binance).await {
                    warn!("Asset discovery failed: {e}");
                }
            }
        });
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DAILY_INTERVAL);
        loop {
            ticker.tick().await;
            match send_renewal_reminders(&state).await {
                Ok(sent) if sent > 0 => info!("Sent {sent} renewal reminder(s)"),
                Ok(_) => {}
                Err(e) => warn!("Renewal reminder run failed: {e}"),
            }
        }
    });

    info!("Background jobs started");
}

/// Reminds paid users whose subscription lapses within the window. The
/// `renewal_reminder_sent_at` watermark is cleared on every upgrade, so each
/// paid period gets at most one reminder.
pub async fn send_renewal_reminders(state: &AppState) -> Result<usize, AppError> {
    let expiring: Vec<User> = sqlx::query_as(
        r#"
        SELECT * FROM users
        WHERE tier <> 'free'
          AND email IS NOT NULL
          AND tier_expires_at IS NOT NULL
          AND tier_expires_at > NOW()
          AND tier_expires_at < NOW() + ($1 || ' days')::interval
          AND renewal_reminder_sent_at IS NULL
        "#,
    )
    .bind(RENEWAL_REMINDER_DAYS.to_string())
    .fetch_all(&state.db)
    .await?;

    let now = Utc::now();
    let mut sent = 0usize;
    for user in &expiring {
        let (Some(email), Some(expires_at)) = (user.email.as_deref(), user.tier_expires_at)
        else {
            continue;
        };
        let days_left = (expires_at - now).num_days();
        state
            .notifier
            .renewal_reminder(email, &user.tier, days_left)
            .await;
        sqlx::query("UPDATE users SET renewal_reminder_sent_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&state.db)
            .await?;
        sent += 1;
    }
    Ok(sent)
}
