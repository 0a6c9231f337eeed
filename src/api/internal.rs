//! Ledger entry points for the order and refund/dispute subsystems.
//!
//! These routes sit behind the internal network boundary and carry the
//! seller id in the path rather than in `x-seller-id`.

use crate::api::extract::ApiJson;
use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::{get_request_id_from_headers, success_response};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsBody {
    pub amount: Decimal,
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LockBody {
    pub amount: Decimal,
    pub reference: String,
    #[serde(default)]
    pub reason: Option<String>,
}

fn tag(err: impl Into<AppError>, headers: &HeaderMap) -> AppError {
    let err = err.into();
    match get_request_id_from_headers(headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

/// POST /internal/sellers/{seller_id}/earnings
pub async fn credit_earnings(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<EarningsBody>,
) -> Result<Response, AppError> {
    let receipt = state
        .orchestrator
        .credit_earnings(&seller_id, body.amount, &body.order_id)
        .await
        .map_err(|e| tag(e, &headers))?;
    Ok(success_response(receipt))
}

/// POST /internal/sellers/{seller_id}/lock
pub async fn lock_funds(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LockBody>,
) -> Result<Response, AppError> {
    let receipt = state
        .orchestrator
        .lock_funds(
            &seller_id,
            body.amount,
            &body.reference,
            body.reason.as_deref(),
        )
        .await
        .map_err(|e| tag(e, &headers))?;
    Ok(success_response(receipt))
}

/// POST /internal/sellers/{seller_id}/unlock
pub async fn unlock_funds(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LockBody>,
) -> Result<Response, AppError> {
    let receipt = state
        .orchestrator
        .unlock_funds(
            &seller_id,
            body.amount,
            &body.reference,
            body.reason.as_deref(),
        )
        .await
        .map_err(|e| tag(e, &headers))?;
    Ok(success_response(receipt))
}
