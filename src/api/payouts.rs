//! Seller-facing withdrawal endpoints.

use crate::api::extract::{parse_request_id, ApiJson, SellerContext};
use crate::api::AppState;
use crate::error::AppError;
use crate::middleware::error::{success_response, success_response_with_status};
use crate::payments::types::{PayoutDetails, PayoutMethod, ResendReason};
use crate::payouts::{PaymentRequest, PaymentRequestStatus, RequestFilter};
use crate::services::{CreateWithdrawal, PayoutError};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalBody {
    pub amount: Decimal,
    pub payout_method: String,
    #[serde(default)]
    pub payment_details: Option<JsonValue>,
    #[serde(default)]
    pub save_as_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitOtpBody {
    pub otp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResendOtpBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReversalBody {
    pub amount: Decimal,
    pub reason: String,
}

/// Seller view of a withdrawal. Destination digits are masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalView {
    pub request_id: Uuid,
    pub status: PaymentRequestStatus,
    pub amount: Decimal,
    pub amount_requested: Decimal,
    pub withholding_tax: Decimal,
    pub amount_paid_to_seller: Decimal,
    pub currency: String,
    pub payment_method: PayoutMethod,
    pub destination: String,
    pub account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_reference: Option<String>,
    pub transfer_attempts: i32,
    pub reversed: bool,
    pub reversal_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRequest> for WithdrawalView {
    fn from(request: PaymentRequest) -> Self {
        let message = next_step(request.status);
        Self {
            request_id: request.id,
            status: request.status,
            amount: request.amount,
            amount_requested: request.amount_requested,
            withholding_tax: request.withholding_tax,
            amount_paid_to_seller: request.amount_paid_to_seller,
            currency: request.currency,
            payment_method: request.payment_method,
            destination: request.payment_details.masked_destination(),
            account_name: request.payment_details.account_name().to_string(),
            transfer_code: request.paystack_transfer_code,
            transfer_reference: request.transfer_reference,
            transfer_attempts: request.transfer_attempts,
            reversed: request.reversed,
            reversal_requested: request.reversal_requested,
            failure_reason: request.failure_reason,
            message,
            paid_at: request.paid_at,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

fn next_step(status: PaymentRequestStatus) -> Option<&'static str> {
    match status {
        PaymentRequestStatus::Pending => Some("Withdrawal is queued for transfer"),
        PaymentRequestStatus::AwaitingPaystackOtp => {
            Some("Enter the OTP sent to your registered phone to complete the transfer")
        }
        PaymentRequestStatus::Processing => Some("Transfer is being processed"),
        PaymentRequestStatus::OtpExpired => Some("OTP expired. Click resend to receive a new OTP"),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalPage {
    items: Vec<WithdrawalView>,
    page: u32,
    limit: u32,
    total: u64,
}

/// Parse client-supplied details. `type` defaults to the requested method.
pub fn parse_payment_details(
    raw: JsonValue,
    payout_method: &str,
) -> Result<PayoutDetails, PayoutError> {
    let mut raw = raw;
    if let Some(object) = raw.as_object_mut() {
        if !object.contains_key("type") {
            let method: PayoutMethod = payout_method.parse()?;
            object.insert(
                "type".to_string(),
                JsonValue::String(method.as_str().to_string()),
            );
        }
    }
    serde_json::from_value(raw).map_err(|e| PayoutError::validation("paymentDetails", e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/payouts/withdrawals
pub async fn create_withdrawal(
    State(state): State<AppState>,
    seller: SellerContext,
    ApiJson(body): ApiJson<CreateWithdrawalBody>,
) -> Result<Response, AppError> {
    let payment_details = body
        .payment_details
        .filter(|raw| !raw.is_null())
        .map(|raw| parse_payment_details(raw, &body.payout_method))
        .transpose()
        .map_err(|e| seller.fail(e))?;

    let input = CreateWithdrawal {
        amount: body.amount,
        payout_method: body.payout_method,
        payment_details,
        save_as_default: body.save_as_default,
    };
    let request = state
        .orchestrator
        .create_withdrawal(&seller.seller_id, input, &seller.actor())
        .await
        .map_err(|e| seller.fail(e))?;

    info!(
        request_id = %request.id,
        seller_id = %seller.seller_id,
        status = %request.status,
        "withdrawal created"
    );
    Ok(success_response_with_status(
        StatusCode::CREATED,
        WithdrawalView::from(request),
    ))
}

/// GET /api/payouts/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    seller: SellerContext,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<PaymentRequestStatus>()
                .map_err(|e| seller.fail(AppError::validation("status", e)))
        })
        .transpose()?;

    let filter = RequestFilter::new(status, query.page, query.limit);
    let page = state
        .orchestrator
        .list_requests(&seller.seller_id, filter)
        .await
        .map_err(|e| seller.fail(e))?;

    Ok(success_response(WithdrawalPage {
        items: page.items.into_iter().map(WithdrawalView::from).collect(),
        page: page.page,
        limit: page.limit,
        total: page.total,
    }))
}

/// GET /api/payouts/withdrawals/{id}
pub async fn get_withdrawal(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let request = state
        .orchestrator
        .get_request(&seller.seller_id, id)
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// PATCH /api/payouts/withdrawals/{id}/cancel
pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let request = state
        .orchestrator
        .cancel(&seller.seller_id, id, &seller.actor())
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// DELETE /api/payouts/withdrawals/{id}
///
/// Soft delete: the request is cancelled and hidden from the active set.
pub async fn delete_withdrawal(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let request = state
        .orchestrator
        .delete(&seller.seller_id, id, &seller.actor())
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// POST /api/payouts/withdrawals/{id}/submit-otp
pub async fn submit_otp(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SubmitOtpBody>,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let request = state
        .orchestrator
        .submit_otp(&seller.seller_id, id, &body.otp, &seller.actor())
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// POST /api/payouts/withdrawals/{id}/resend-otp
///
/// The body is optional; an empty body resends with the default reason.
pub async fn resend_otp(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let body: ResendOtpBody = if body.iter().all(u8::is_ascii_whitespace) {
        ResendOtpBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| seller.fail(AppError::validation("body", e.to_string())))?
    };
    let reason = body
        .reason
        .as_deref()
        .unwrap_or_default()
        .parse::<ResendReason>()
        .map_err(|e| seller.fail(PayoutError::from(e)))?;

    let request = state
        .orchestrator
        .resend_otp(&seller.seller_id, id, reason, &seller.actor())
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// POST /api/payouts/withdrawals/{id}/request-reversal
pub async fn request_reversal(
    State(state): State<AppState>,
    seller: SellerContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ReversalBody>,
) -> Result<Response, AppError> {
    let id = parse_request_id(&id).map_err(|e| seller.fail(e))?;
    let request = state
        .orchestrator
        .request_reversal(
            &seller.seller_id,
            id,
            body.amount,
            &body.reason,
            &seller.actor(),
        )
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(WithdrawalView::from(request)))
}

/// GET /api/payouts/balance
pub async fn get_balance(
    State(state): State<AppState>,
    seller: SellerContext,
) -> Result<Response, AppError> {
    let balance = state
        .orchestrator
        .get_balance(&seller.seller_id)
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(balance))
}

/// GET /api/payouts/history
pub async fn get_history(
    State(state): State<AppState>,
    seller: SellerContext,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let entries = state
        .orchestrator
        .history(&seller.seller_id, query.limit)
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(entries))
}

/// PUT /api/payouts/payout-details
pub async fn save_payout_details(
    State(state): State<AppState>,
    seller: SellerContext,
    ApiJson(raw): ApiJson<JsonValue>,
) -> Result<Response, AppError> {
    let details: PayoutDetails = serde_json::from_value(raw)
        .map_err(|e| seller.fail(AppError::validation("paymentDetails", e.to_string())))?;
    let saved = state
        .orchestrator
        .save_payout_details(&seller.seller_id, details)
        .await
        .map_err(|e| seller.fail(e))?;
    Ok(success_response(serde_json::json!({
        "type": saved.method(),
        "accountName": saved.account_name(),
        "destination": saved.masked_destination(),
    })))
}
