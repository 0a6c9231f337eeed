pub mod extract;
pub mod internal;
pub mod payouts;
pub mod webhooks;

use crate::cache::Cache;
use crate::health::HealthChecker;
use crate::services::PayoutOrchestrator;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PayoutOrchestrator>,
    /// Markers for webhook events already applied.
    pub webhook_cache: Arc<dyn Cache<String>>,
    pub health_checker: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route(
            "/api/payouts/withdrawals",
            post(payouts::create_withdrawal).get(payouts::list_withdrawals),
        )
        .route(
            "/api/payouts/withdrawals/{id}",
            get(payouts::get_withdrawal).delete(payouts::delete_withdrawal),
        )
        .route(
            "/api/payouts/withdrawals/{id}/cancel",
            patch(payouts::cancel_withdrawal),
        )
        .route(
            "/api/payouts/withdrawals/{id}/submit-otp",
            post(payouts::submit_otp),
        )
        .route(
            "/api/payouts/withdrawals/{id}/resend-otp",
            post(payouts::resend_otp),
        )
        .route(
            "/api/payouts/withdrawals/{id}/request-reversal",
            post(payouts::request_reversal),
        )
        .route("/api/payouts/balance", get(payouts::get_balance))
        .route("/api/payouts/history", get(payouts::get_history))
        .route("/api/payouts/payout-details", put(payouts::save_payout_details))
        .route(
            "/internal/sellers/{seller_id}/earnings",
            post(internal::credit_earnings),
        )
        .route("/internal/sellers/{seller_id}/lock", post(internal::lock_funds))
        .route(
            "/internal/sellers/{seller_id}/unlock",
            post(internal::unlock_funds),
        )
        .route("/webhooks/paystack", post(webhooks::paystack_webhook))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.health_checker.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

async fn readiness(State(state): State<AppState>) -> Response {
    let status = state.health_checker.check_health().await;
    if status.is_healthy() {
        (StatusCode::OK, "Ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready").into_response()
    }
}

async fn liveness() -> &'static str {
    "OK"
}
