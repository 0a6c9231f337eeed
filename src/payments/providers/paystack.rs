use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::TransferGateway;
use crate::payments::types::{
    PayoutDetails, ResendReason, TransferEvent, TransferEventKind, TransferInitiation,
    TransferOutcome, TransferRequest, TransferSnapshot, TransferStatus,
};
use crate::payments::utils::{verify_hmac_sha512_hex, HttpFailure, PaymentHttpClient};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let secret_key =
            std::env::var("PAYSTACK_SECRET_KEY").map_err(|_| GatewayError::Unavailable {
                message: "PAYSTACK_SECRET_KEY environment variable is required".to_string(),
            })?;

        Ok(Self {
            webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            timeout_secs: std::env::var("PAYSTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYSTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            secret_key,
        })
    }
}

/// The gateway call a failure came from. Paystack reuses messages across
/// endpoints, so the same text can mean different things.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    CreateRecipient,
    InitiateTransfer,
    FinalizeTransfer,
    ResendOtp,
    FetchTransfer,
    VerifyTransfer,
}

fn classify(operation: Operation, failure: HttpFailure, lookup_key: &str) -> GatewayError {
    let (status, message) = match failure {
        HttpFailure::Transport(err) => return err,
        HttpFailure::Status { status, message } => (status, message),
    };
    if status == 429 || status >= 500 {
        return HttpFailure::Status { status, message }.into_default_error();
    }

    let lower = message.to_lowercase();
    let not_awaiting = lower.contains("not awaiting otp")
        || lower.contains("not currently awaiting")
        || lower.contains("abandoned");

    match operation {
        Operation::CreateRecipient => GatewayError::InvalidAccountDetails { message },
        Operation::InitiateTransfer
            if lower.contains("balance is not enough") || lower.contains("insufficient") =>
        {
            GatewayError::InsufficientGatewayBalance { message }
        }
        Operation::InitiateTransfer
            if lower.contains("recipient")
                && (lower.contains("invalid") || lower.contains("not found")) =>
        {
            GatewayError::InvalidAccountDetails { message }
        }
        Operation::FinalizeTransfer if not_awaiting => {
            GatewayError::TransferNotAwaitingOtp { message }
        }
        Operation::FinalizeTransfer if lower.contains("expired") => {
            GatewayError::OtpExpired { message }
        }
        Operation::FinalizeTransfer
            if lower.contains("otp") && (lower.contains("invalid") || lower.contains("incorrect")) =>
        {
            GatewayError::InvalidOtp { message }
        }
        Operation::ResendOtp if not_awaiting || lower.contains("expired") => {
            GatewayError::TransferNotAwaitingOtp { message }
        }
        Operation::FetchTransfer | Operation::VerifyTransfer if status == 404 => {
            GatewayError::TransferNotFound {
                reference: lookup_key.to_string(),
            }
        }
        _ => GatewayError::Rejected {
            message,
            provider_code: Some(status.to_string()),
        },
    }
}

pub struct PaystackProvider {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackProvider {
    pub fn new(config: PaystackConfig) -> GatewayResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(PaystackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: Operation,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        lookup_key: &str,
    ) -> GatewayResult<T> {
        let envelope: PaystackEnvelope<T> = self
            .http
            .request_json(
                method,
                &self.endpoint(path),
                Some(&self.config.secret_key),
                body,
            )
            .await
            .map_err(|failure| classify(operation, failure, lookup_key))?;

        if !envelope.status {
            return Err(classify(
                operation,
                HttpFailure::Status {
                    status: 400,
                    message: envelope.message,
                },
                lookup_key,
            ));
        }

        envelope.data.ok_or_else(|| GatewayError::UnexpectedResponse {
            message: format!("paystack {:?} response carried no data", operation),
        })
    }
}

#[async_trait]
impl TransferGateway for PaystackProvider {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn create_recipient(
        &self,
        details: &PayoutDetails,
        currency: &str,
    ) -> GatewayResult<String> {
        let payload = match details {
            PayoutDetails::Bank {
                account_number,
                bank_code,
                account_name,
                ..
            } => serde_json::json!({
                "type": "nuban",
                "name": account_name,
                "account_number": account_number,
                "bank_code": bank_code,
                "currency": currency,
            }),
            PayoutDetails::MobileMoney {
                phone_number,
                network,
                account_name,
            } => serde_json::json!({
                "type": "mobile_money",
                "name": account_name,
                "account_number": phone_number,
                "bank_code": network.paystack_code(),
                "currency": currency,
            }),
        };

        let data: PaystackRecipientData = self
            .call(
                Operation::CreateRecipient,
                Method::POST,
                "/transferrecipient",
                Some(&payload),
                "",
            )
            .await?;

        debug!(
            destination = %details.masked_destination(),
            "paystack transfer recipient created"
        );
        Ok(data.recipient_code)
    }

    async fn initiate_transfer(
        &self,
        request: TransferRequest,
    ) -> GatewayResult<TransferInitiation> {
        let payload = serde_json::json!({
            "source": "balance",
            "amount": request.amount_minor,
            "recipient": request.recipient_code,
            "reference": request.reference,
            "reason": request.reason,
            "currency": request.currency,
        });

        let data: PaystackTransferData = self
            .call(
                Operation::InitiateTransfer,
                Method::POST,
                "/transfer",
                Some(&payload),
                &request.reference,
            )
            .await?;

        let status = TransferStatus::parse(&data.status)?;
        info!(
            reference = %request.reference,
            transfer_code = %data.transfer_code,
            status = %status,
            "paystack transfer initiated"
        );

        Ok(TransferInitiation {
            transfer_code: data.transfer_code,
            reference: data.reference.unwrap_or(request.reference),
            status,
        })
    }

    async fn finalize_with_otp(
        &self,
        transfer_code: &str,
        otp: &str,
    ) -> GatewayResult<TransferOutcome> {
        let payload = serde_json::json!({
            "transfer_code": transfer_code,
            "otp": otp,
        });

        let data: PaystackTransferData = self
            .call(
                Operation::FinalizeTransfer,
                Method::POST,
                "/transfer/finalize_transfer",
                Some(&payload),
                transfer_code,
            )
            .await?;

        Ok(TransferOutcome {
            status: TransferStatus::parse(&data.status)?,
            reference: data.reference,
        })
    }

    async fn resend_otp(&self, transfer_code: &str, reason: ResendReason) -> GatewayResult<()> {
        let payload = serde_json::json!({
            "transfer_code": transfer_code,
            "reason": reason.as_str(),
        });

        let _: JsonValue = self
            .call(
                Operation::ResendOtp,
                Method::POST,
                "/transfer/resend_otp",
                Some(&payload),
                transfer_code,
            )
            .await
            .or_else(|err| match err {
                // resend_otp answers with no data on success
                GatewayError::UnexpectedResponse { .. } => Ok(JsonValue::Null),
                other => Err(other),
            })?;
        Ok(())
    }

    async fn check_status(&self, transfer_code: &str) -> GatewayResult<TransferSnapshot> {
        let data: PaystackTransferData = self
            .call(
                Operation::FetchTransfer,
                Method::GET,
                &format!("/transfer/{}", transfer_code),
                None,
                transfer_code,
            )
            .await?;
        data.into_snapshot(transfer_code)
    }

    async fn verify_transfer(&self, reference: &str) -> GatewayResult<TransferSnapshot> {
        let data: PaystackTransferData = self
            .call(
                Operation::VerifyTransfer,
                Method::GET,
                &format!("/transfer/verify/{}", reference),
                None,
                reference,
            )
            .await?;
        data.into_snapshot("")
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<()> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.secret_key);
        if verify_hmac_sha512_hex(payload, secret, signature) {
            Ok(())
        } else {
            Err(GatewayError::WebhookVerification {
                message: "invalid paystack signature".to_string(),
            })
        }
    }

    fn parse_transfer_event(&self, payload: &[u8]) -> GatewayResult<Option<TransferEvent>> {
        let parsed: PaystackWebhook = serde_json::from_slice(payload).map_err(|e| {
            GatewayError::WebhookVerification {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let kind = match parsed.event.as_str() {
            "transfer.success" => TransferEventKind::Success,
            "transfer.failed" => TransferEventKind::Failed,
            "transfer.reversed" => TransferEventKind::Reversed,
            other => {
                debug!(event = %other, "ignoring paystack event");
                return Ok(None);
            }
        };

        let transfer_code = parsed
            .data
            .get("transfer_code")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let reference = parsed
            .data
            .get("reference")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if transfer_code.is_none() && reference.is_none() {
            warn!(event = %parsed.event, "paystack transfer event without identifiers");
            return Err(GatewayError::WebhookVerification {
                message: "transfer event carries neither transfer_code nor reference".to_string(),
            });
        }

        Ok(Some(TransferEvent {
            kind,
            transfer_code,
            reference,
            received_at: chrono::Utc::now(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackRecipientData {
    recipient_code: String,
}

#[derive(Debug, Deserialize)]
struct PaystackTransferData {
    #[serde(default)]
    transfer_code: String,
    #[serde(default)]
    reference: Option<String>,
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl PaystackTransferData {
    fn into_snapshot(self, fallback_code: &str) -> GatewayResult<TransferSnapshot> {
        let status = TransferStatus::parse(&self.status)?;
        let transfer_code = if self.transfer_code.is_empty() {
            fallback_code.to_string()
        } else {
            self.transfer_code
        };
        Ok(TransferSnapshot {
            transfer_code,
            reference: self.reference.unwrap_or_default(),
            status,
            amount_minor: self.amount,
            failure_reason: self.failure_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackWebhook {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::utils::sign_hmac_sha512_hex;

    fn provider() -> PaystackProvider {
        PaystackProvider::new(PaystackConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("provider init should succeed")
    }

    fn status(status: u16, message: &str) -> HttpFailure {
        HttpFailure::Status {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn webhook_signature_validation() {
        let provider = provider();
        let payload = br#"{"event":"transfer.success"}"#;
        assert!(provider.verify_webhook(payload, "invalid_signature").is_err());

        let signature = sign_hmac_sha512_hex(payload, "whsec_test");
        assert!(provider.verify_webhook(payload, &signature).is_ok());
    }

    #[test]
    fn finalize_failures_are_split_by_message() {
        assert!(matches!(
            classify(Operation::FinalizeTransfer, status(400, "Invalid OTP"), "TRF_1"),
            GatewayError::InvalidOtp { .. }
        ));
        assert!(matches!(
            classify(Operation::FinalizeTransfer, status(400, "OTP has expired"), "TRF_1"),
            GatewayError::OtpExpired { .. }
        ));
        assert!(matches!(
            classify(
                Operation::FinalizeTransfer,
                status(400, "Transfer is not currently awaiting OTP"),
                "TRF_1"
            ),
            GatewayError::TransferNotAwaitingOtp { .. }
        ));
    }

    #[test]
    fn any_recipient_rejection_is_bad_account_details() {
        assert!(matches!(
            classify(
                Operation::CreateRecipient,
                status(422, "Cannot resolve account"),
                ""
            ),
            GatewayError::InvalidAccountDetails { .. }
        ));
    }

    #[test]
    fn low_gateway_balance_is_distinct() {
        assert!(matches!(
            classify(
                Operation::InitiateTransfer,
                status(400, "Your balance is not enough to fulfil this request"),
                "wd-1"
            ),
            GatewayError::InsufficientGatewayBalance { .. }
        ));
    }

    #[test]
    fn server_errors_are_unavailable_everywhere() {
        assert!(matches!(
            classify(Operation::FinalizeTransfer, status(502, "Invalid OTP"), "TRF_1"),
            GatewayError::Unavailable { .. }
        ));
        assert!(matches!(
            classify(Operation::InitiateTransfer, status(429, "slow down"), "wd-1"),
            GatewayError::Unavailable { .. }
        ));
    }

    #[test]
    fn unknown_reference_is_not_found() {
        assert_eq!(
            classify(Operation::VerifyTransfer, status(404, "Transfer not found"), "wd-x-1"),
            GatewayError::TransferNotFound {
                reference: "wd-x-1".to_string()
            }
        );
    }

    #[test]
    fn transfer_webhooks_are_parsed() {
        let provider = provider();
        let payload = br#"{"event":"transfer.success","data":{"transfer_code":"TRF_1","reference":"wd-abc-1"}}"#;
        let event = provider.parse_transfer_event(payload).unwrap().unwrap();
        assert_eq!(event.kind, TransferEventKind::Success);
        assert_eq!(event.transfer_code.as_deref(), Some("TRF_1"));
        assert_eq!(event.reference.as_deref(), Some("wd-abc-1"));

        let ignored = br#"{"event":"charge.success","data":{"reference":"x"}}"#;
        assert!(provider.parse_transfer_event(ignored).unwrap().is_none());
    }

    #[test]
    fn snapshot_maps_gateway_statuses() {
        let data = PaystackTransferData {
            transfer_code: String::new(),
            reference: Some("wd-1".to_string()),
            status: "received".to_string(),
            amount: Some(20000),
            failure_reason: None,
        };
        let snapshot = data.into_snapshot("TRF_9").unwrap();
        assert_eq!(snapshot.status, TransferStatus::Pending);
        assert_eq!(snapshot.transfer_code, "TRF_9");
    }
}
