pub mod health;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::assets::handlers as assets;
use crate::auth::handlers as auth;
use crate::payments::handlers as payments;
use crate::payments::webhook;
use crate::sessions::handlers as sessions;
use crate::state::AppState;
use crate::suggestions::handlers as suggestions;
use crate::watchlists::handlers as watchlists;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/wallet/nonce", get(auth::handle_wallet_nonce))
        .route("/api/v1/auth/wallet/verify", post(auth::handle_wallet_verify))
        .route("/api/v1/auth/wallet/link", post(auth::handle_wallet_link))
        .route("/api/v1/me", get(auth::handle_me))
        // Sessions (devices)
        .route("/api/v1/sessions", get(sessions::handle_list_sessions))
        .route("/api/v1/sessions/:id", delete(sessions::handle_revoke_session))
        .route(
            "/api/v1/sessions/revoke-others",
            post(sessions::handle_revoke_other_sessions),
        )
        // Watchlists
        .route(
            "/api/v1/watchlists",
            get(watchlists::handle_list_watchlists).post(watchlists::handle_create_watchlist),
        )
        .route(
            "/api/v1/watchlists/:id",
            get(watchlists::handle_get_watchlist)
                .patch(watchlists::handle_rename_watchlist)
                .delete(watchlists::handle_delete_watchlist),
        )
        .route("/api/v1/watchlists/:id/items", post(watchlists::handle_add_item))
        .route(
            "/api/v1/watchlists/:id/items/:item_id",
            delete(watchlists::handle_remove_item),
        )
        // Assets (public)
        .route("/api/v1/assets", get(assets::handle_list_public_assets))
        .route("/api/v1/assets/:symbol", get(assets::handle_get_asset))
        // Suggestions
        .route(
            "/api/v1/suggestions",
            get(suggestions::handle_list_my_suggestions).post(suggestions::handle_create_suggestion),
        )
        // Payments
        .route(
            "/api/v1/payments",
            get(payments::handle_list_payments).post(payments::handle_create_payment),
        )
        .route("/api/v1/payments/webhook", post(webhook::handle_ipn_webhook))
        // Admin: assets + refresh engine
        .route(
            "/api/v1/admin/assets",
            get(assets::handle_admin_list_assets).post(assets::handle_admin_create_asset),
        )
        .route(
            "/api/v1/admin/assets/refresh",
            post(assets::handle_admin_trigger_refresh),
        )
        .route(
            "/api/v1/admin/assets/refresh/status",
            get(assets::handle_admin_refresh_status),
        )
        .route(
            "/api/v1/admin/assets/discover",
            post(assets::handle_admin_discover_assets),
        )
        .route(
            "/api/v1/admin/assets/:id",
            patch(assets::handle_admin_update_asset).delete(assets::handle_admin_delete_asset),
        )
        .route(
            "/api/v1/admin/assets/:id/refresh",
            post(assets::handle_admin_refresh_asset),
        )
        // Admin: suggestion review
        .route(
            "/api/v1/admin/suggestions",
            get(suggestions::handle_admin_list_suggestions),
        )
        .route(
            "/api/v1/admin/suggestions/:id/approve",
            post(suggestions::handle_admin_approve_suggestion),
        )
        .route(
            "/api/v1/admin/suggestions/:id/reject",
            post(suggestions::handle_admin_reject_suggestion),
        )
        // Admin: promo codes
        .route(
            "/api/v1/admin/promo-codes",
            get(payments::handle_admin_list_promos).post(payments::handle_admin_create_promo),
        )
        .route(
            "/api/v1/admin/promo-codes/:id",
            patch(payments::handle_admin_update_promo).delete(payments::handle_admin_delete_promo),
        )
        .with_state(state)
}
