//! HTTP-level tests for the payout routes, the internal ledger routes and
//! the gateway webhook.

mod support;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use marketplace_payouts::api::{self, AppState};
use marketplace_payouts::cache::InMemoryCache;
use marketplace_payouts::health::HealthChecker;
use marketplace_payouts::payouts::PaymentRequestStatus;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use support::{dec, Harness, SELLER, VALID_OTP, VALID_SIGNATURE};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    api::router(AppState {
        orchestrator: h.orchestrator.clone(),
        webhook_cache: Arc::new(InMemoryCache::<String>::new()),
        health_checker: HealthChecker::default(),
    })
}

fn seller_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-seller-id", SELLER)
        .header("x-request-id", "req-test-1");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn webhook(signature: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/paystack")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-paystack-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn withdrawal_body(amount: &str) -> Value {
    json!({
        "amount": amount,
        "payoutMethod": "bank",
        "paymentDetails": {
            "accountNumber": "2001234567",
            "bankCode": "50211",
            "accountName": "Ada Obi"
        }
    })
}

fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_missing_seller_identity_is_unauthorized() {
    let h = Harness::new();
    let app = app(&h);

    let request = Request::builder()
        .uri("/api/payouts/balance")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_withdrawal_returns_created() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        seller_request("POST", "/api/payouts/withdrawals", Some(withdrawal_body("200"))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "awaiting_paystack_otp");
    assert_eq!(body["data"]["transferCode"], "TRF_1");
    assert!(body["data"]["message"].as_str().unwrap().contains("OTP"));
    assert!(!body["data"]["destination"]
        .as_str()
        .unwrap()
        .contains("2001234567"));

    let (status, body) = send(&app, seller_request("GET", "/api/payouts/balance", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["data"]["pendingBalance"]), dec(200));
    assert_eq!(money(&body["data"]["withdrawableBalance"]), dec(300));
}

#[tokio::test]
async fn test_insufficient_balance_maps_to_bad_request() {
    let h = Harness::new();
    h.credit(SELLER, 100, "order-1").await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        seller_request("POST", "/api/payouts/withdrawals", Some(withdrawal_body("200"))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INSUFFICIENT_BALANCE");
    assert_eq!(body["request_id"], "req-test-1");
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let h = Harness::new();
    let app = app(&h);

    let request = Request::builder()
        .method("POST")
        .uri("/api/payouts/withdrawals")
        .header("x-seller-id", SELLER)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_invalid_request_id_is_rejected() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(
        &app,
        seller_request("GET", "/api/payouts/withdrawals/not-a-uuid", None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_request_is_not_found() {
    let h = Harness::new();
    let app = app(&h);

    let uri = format!("/api/payouts/withdrawals/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, seller_request("GET", &uri, None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "REQUEST_NOT_FOUND");
}

#[tokio::test]
async fn test_submit_otp_over_http() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let request = h.withdraw(SELLER, 200).await;
    let app = app(&h);
    let uri = format!("/api/payouts/withdrawals/{}/submit-otp", request.id);

    let (status, body) = send(
        &app,
        seller_request("POST", &uri, Some(json!({ "otp": "000000" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_OTP");
    assert_eq!(body["retryable"], true);

    let (status, body) = send(
        &app,
        seller_request("POST", &uri, Some(json!({ "otp": VALID_OTP }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");
}

#[tokio::test]
async fn test_resend_otp_accepts_empty_body() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let request = h.withdraw(SELLER, 200).await;
    let app = app(&h);

    let uri = format!("/api/payouts/withdrawals/{}/resend-otp", request.id);
    let (status, body) = send(&app, seller_request("POST", &uri, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "awaiting_paystack_otp");
    assert!(h.gateway.called("resend:TRF_1"));
}

#[tokio::test]
async fn test_reversal_after_payout_is_forbidden() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let request = h.withdraw(SELLER, 200).await;
    h.orchestrator
        .submit_otp(SELLER, request.id, VALID_OTP, &support::actor(SELLER))
        .await
        .unwrap();
    let app = app(&h);

    let uri = format!("/api/payouts/withdrawals/{}/request-reversal", request.id);
    let (status, body) = send(
        &app,
        seller_request(
            "POST",
            &uri,
            Some(json!({ "amount": "200", "reason": "wrong account" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "REVERSAL_NOT_ALLOWED");
}

#[tokio::test]
async fn test_cancel_of_awaiting_request_is_rejected() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let request = h.withdraw(SELLER, 200).await;
    let app = app(&h);

    let uri = format!("/api/payouts/withdrawals/{}/cancel", request.id);
    let (status, body) = send(&app, seller_request("PATCH", &uri, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_STATUS_TRANSITION");
}

#[tokio::test]
async fn test_internal_earnings_and_lock() {
    let h = Harness::new();
    let app = app(&h);

    let earnings = Request::builder()
        .method("POST")
        .uri(format!("/internal/sellers/{}/earnings", SELLER))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "amount": "500", "orderId": "order-9" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, earnings).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicate"], false);
    assert_eq!(money(&body["data"]["balance"]["balance"]), dec(500));

    let lock = Request::builder()
        .method("POST")
        .uri(format!("/internal/sellers/{}/lock", SELLER))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "amount": "900", "reference": "DISPUTE-1" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, lock).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn test_webhook_requires_valid_signature() {
    let h = Harness::new();
    let app = app(&h);
    let payload = json!({ "event": "transfer.success", "data": { "transfer_code": "TRF_1" } });

    let response = app
        .clone()
        .oneshot(webhook(None, payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(webhook(Some("forged"), payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_success_webhook_settles_request() {
    let h = Harness::new();
    h.credit(SELLER, 500, "order-1").await;
    let request = h.withdraw(SELLER, 200).await;
    let app = app(&h);
    let payload = json!({ "event": "transfer.success", "data": { "transfer_code": "TRF_1" } });

    let (status, body) = send(&app, webhook(Some(VALID_SIGNATURE), payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let settled = h.orchestrator.get_request(SELLER, request.id).await.unwrap();
    assert_eq!(settled.status, PaymentRequestStatus::Paid);

    // Redelivery is acknowledged without touching the ledger again.
    let (status, _) = send(&app, webhook(Some(VALID_SIGNATURE), payload)).await;
    assert_eq!(status, StatusCode::OK);
    let balance = h.orchestrator.get_balance(SELLER).await.unwrap();
    assert_eq!(balance.total_withdrawn, dec(200));
}

#[tokio::test]
async fn test_non_transfer_webhook_is_acknowledged() {
    let h = Harness::new();
    let app = app(&h);

    let (status, _) = send(
        &app,
        webhook(Some(VALID_SIGNATURE), json!({ "event": "charge.success", "data": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_liveness_probe() {
    let h = Harness::new();
    let app = app(&h);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
