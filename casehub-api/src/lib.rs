//! CaseHub API service
//!
//! HTTP backend for the teaching-case platform: session catalog with
//! tiered access control, user accounts, subscriptions and payments,
//! assessments, observations, playback progress, and reviews.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use casehub_common::auth::TokenCodec;
use casehub_common::config::Config;

use crate::payments::paypal::PaypalClient;
use crate::payments::razorpay::RazorpayClient;

pub mod access;
pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod payments;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tokens: TokenCodec,
    pub config: Arc<Config>,
    pub razorpay: RazorpayClient,
    pub paypal: PaypalClient,
}

impl AppState {
    pub fn new(db: SqlitePool, tokens: TokenCodec, config: Config) -> AppState {
        let razorpay = RazorpayClient::new(&config.razorpay);
        let paypal = PaypalClient::new(&config.paypal);
        AppState {
            db,
            tokens,
            config: Arc::new(config),
            razorpay,
            paypal,
        }
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health::routes())
        .nest("/api/auth", api::auth::routes())
        .nest("/api/sessions", api::sessions::routes(state.clone()))
        .nest("/api/playback-progress", api::progress::routes())
        .nest("/api/subscription", api::subscription::routes(state.clone()))
        .nest("/api/assessments", api::assessments::routes(state.clone()))
        .nest("/api/observation", api::observations::routes(state.clone()))
        .nest("/api/reviews", api::reviews::routes(state.clone()))
        .nest("/api/modules", api::catalog::module_routes())
        .nest("/api/pathologies", api::catalog::pathology_routes())
        .nest("/api/masterylevel", api::catalog::mastery_level_routes())
        .nest("/api/dashboard", api::catalog::dashboard_routes())
        .nest("/api/faculty", api::faculty::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wrap a sub-router so every route requires a valid access token
pub(crate) fn protected(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.layer(from_fn_with_state(
        state.clone(),
        api::middleware::require_auth,
    ))
}

/// Wrap a sub-router so routes see the caller's tier, guest included
pub(crate) fn with_optional_access(
    router: Router<AppState>,
    state: &AppState,
) -> Router<AppState> {
    router.layer(from_fn_with_state(
        state.clone(),
        api::middleware::optional_auth,
    ))
}
