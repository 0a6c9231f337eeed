use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::cache::cache::ttl;
use crate::cache::keys::payout::WebhookEventKey;
use crate::payments::types::{TransferEvent, TransferEventKind};

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

fn ok() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

fn event_key(event: &TransferEvent) -> Option<WebhookEventKey> {
    let kind = match event.kind {
        TransferEventKind::Success => "transfer.success",
        TransferEventKind::Failed => "transfer.failed",
        TransferEventKind::Reversed => "transfer.reversed",
    };
    event
        .transfer_code
        .as_deref()
        .or(event.reference.as_deref())
        .map(|transfer| WebhookEventKey::new(kind, transfer))
}

/// POST /webhooks/paystack
///
/// 401 when the signature is missing or wrong. Everything else is
/// acknowledged with 200 so the gateway stops redelivering; processing
/// failures are logged and left for the reconciler.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let gateway = state.orchestrator.gateway();

    let signature = match headers
        .get(PAYSTACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(signature) => signature,
        None => {
            warn!(provider = gateway.name(), "Missing webhook signature");
            return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
        }
    };

    if let Err(e) = gateway.verify_webhook(&body, signature) {
        warn!(provider = gateway.name(), error = %e, "Invalid webhook signature");
        return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
    }

    let event = match gateway.parse_transfer_event(&body) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(provider = gateway.name(), "Ignoring non-transfer webhook");
            return ok();
        }
        Err(e) => {
            error!(provider = gateway.name(), error = %e, "Unreadable webhook payload");
            return ok();
        }
    };

    let key = event_key(&event).map(|k| k.to_string());
    if let Some(key) = &key {
        if state.webhook_cache.exists(key).await.unwrap_or(false) {
            info!(key = %key, "Webhook already processed");
            return ok();
        }
    }

    match state.orchestrator.handle_transfer_event(&event).await {
        Ok(Some(request)) => {
            info!(
                request_id = %request.id,
                status = %request.status,
                event = ?event.kind,
                "Webhook processed successfully"
            );
            if let Some(key) = &key {
                if let Err(e) = state
                    .webhook_cache
                    .set(key, &request.id.to_string(), Some(ttl::WEBHOOK_EVENT))
                    .await
                {
                    warn!(key = %key, error = %e, "Failed to record processed webhook");
                }
            }
        }
        Ok(None) => {
            info!(
                transfer_code = ?event.transfer_code,
                reference = ?event.reference,
                "Webhook for unknown transfer ignored"
            );
        }
        Err(e) => {
            error!(
                transfer_code = ?event.transfer_code,
                reference = ?event.reference,
                error = %e,
                "Webhook processing failed"
            );
        }
    }

    ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn event_key_prefers_transfer_code() {
        let event = TransferEvent {
            kind: TransferEventKind::Success,
            transfer_code: Some("TRF_1".to_string()),
            reference: Some("wd-abc-1".to_string()),
            received_at: Utc::now(),
        };
        assert_eq!(
            event_key(&event).unwrap().to_string(),
            "v1:payout:webhook:transfer.success:TRF_1"
        );

        let event = TransferEvent {
            transfer_code: None,
            ..event
        };
        assert_eq!(event_key(&event).unwrap().transfer, "wd-abc-1");
    }
}
