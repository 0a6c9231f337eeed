use crate::payouts::PaymentRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutNotificationType {
    PayoutCompleted,
    PayoutFailed,
    OtpExpired,
}

/// Delivers payout notifications to sellers.
#[async_trait]
pub trait PayoutNotifier: Send + Sync {
    async fn notify(
        &self,
        request: &PaymentRequest,
        notification_type: PayoutNotificationType,
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Real delivery lives outside this service.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl PayoutNotifier for LoggingNotifier {
    async fn notify(
        &self,
        request: &PaymentRequest,
        notification_type: PayoutNotificationType,
    ) -> anyhow::Result<()> {
        match notification_type {
            PayoutNotificationType::PayoutCompleted => {
                info!(
                    request_id = %request.id,
                    seller_id = %request.seller_id,
                    amount = %request.amount_paid_to_seller,
                    currency = %request.currency,
                    destination = %request.payment_details.masked_destination(),
                    "🔔 NOTIFICATION: Payout completed"
                );
            }
            PayoutNotificationType::PayoutFailed => {
                error!(
                    request_id = %request.id,
                    seller_id = %request.seller_id,
                    reason = request.failure_reason.as_deref().unwrap_or("unknown"),
                    "🔔 NOTIFICATION: Payout failed, funds returned to balance"
                );
            }
            PayoutNotificationType::OtpExpired => {
                info!(
                    request_id = %request.id,
                    seller_id = %request.seller_id,
                    "🔔 NOTIFICATION: Payout OTP expired, resend to try again"
                );
            }
        }
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and never reach the caller.
pub fn dispatch(
    notifier: Arc<dyn PayoutNotifier>,
    request: PaymentRequest,
    notification_type: PayoutNotificationType,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&request, notification_type).await {
            warn!(
                request_id = %request.id,
                notification = ?notification_type,
                error = %e,
                "payout notification failed"
            );
        }
    });
}
