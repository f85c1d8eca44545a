//! API routes

pub mod admin;
pub mod banks;
pub mod health;
pub mod payments;
pub mod referrals;
pub mod storefronts;
pub mod subscriptions;
pub mod usage;


use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth::require_admin, security::security_headers_middleware, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Payment confirmation and checkout
    let payment_routes = Router::new()
        .route("/payments/webhook", post(payments::webhook))
        .route("/payments/verify/:reference", get(payments::verify))
        .route("/payments/orders/:order_id/initialize", post(payments::initialize_order))
        .route("/payments/subscriptions/initialize", post(payments::initialize_subscription));

    // Account-scoped routes
    let account_routes = Router::new()
        .route("/accounts/:account_id/subscription", get(subscriptions::get_subscription))
        .route("/accounts/:account_id/subscription/history", get(subscriptions::get_history))
        .route("/accounts/:account_id/trial", post(subscriptions::start_trial))
        .route(
            "/accounts/:account_id/usage/:feature",
            get(usage::check_usage).post(usage::record_usage),
        )
        .route("/accounts/:account_id/referrals/evaluate", post(referrals::evaluate))
        .route("/accounts/:account_id/referrals/grants", get(referrals::list_grants));

    // Seller routes
    let storefront_routes = Router::new()
        .route("/storefronts/:storefront_id/balance", get(storefronts::get_balance))
        .route(
            "/storefronts/:storefront_id/payouts",
            get(storefronts::list_payouts).post(storefronts::request_payout),
        )
        .route("/storefronts/:storefront_id/revenue", get(storefronts::list_revenue))
        .route("/storefronts/:storefront_id/subaccount", post(storefronts::create_subaccount))
        .route("/banks", get(banks::list_banks))
        .route("/banks/resolve", get(banks::resolve_account));

    // Operator routes
    let admin_routes = Router::new()
        .route("/admin/payouts/pending", get(admin::list_pending_payouts))
        .route("/admin/payouts/:payout_id", patch(admin::update_payout))
        .route("/admin/storefronts/:storefront_id/identity", post(admin::record_identity))
        .route("/admin/accounts/:account_id/extend", post(admin::extend_subscription))
        .route("/admin/referrals/:referral_id/rewarded", post(admin::mark_referral_rewarded))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api_v1_routes = Router::new()
        .merge(payment_routes)
        .merge(account_routes)
        .merge(storefront_routes)
        .merge(admin_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // Webhook bodies are small; cap everything at 1MB
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
