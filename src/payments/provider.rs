use crate::payments::error::GatewayResult;
use crate::payments::types::{
    PayoutDetails, ResendReason, TransferEvent, TransferInitiation, TransferOutcome,
    TransferRequest, TransferSnapshot,
};
use async_trait::async_trait;

/// A payout rail that moves money to a seller's bank or mobile wallet.
///
/// Only `check_status` and `verify_transfer` are safe to retry blindly. The
/// other calls may change state at the gateway even when they time out.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register the destination and return the gateway's recipient code.
    async fn create_recipient(&self, details: &PayoutDetails, currency: &str)
        -> GatewayResult<String>;

    async fn initiate_transfer(&self, request: TransferRequest)
        -> GatewayResult<TransferInitiation>;

    async fn finalize_with_otp(
        &self,
        transfer_code: &str,
        otp: &str,
    ) -> GatewayResult<TransferOutcome>;

    async fn resend_otp(&self, transfer_code: &str, reason: ResendReason) -> GatewayResult<()>;

    async fn check_status(&self, transfer_code: &str) -> GatewayResult<TransferSnapshot>;

    /// Look a transfer up by the reference we generated.
    async fn verify_transfer(&self, reference: &str) -> GatewayResult<TransferSnapshot>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<()>;

    /// Parse a verified webhook body. `Ok(None)` for events we do not act on.
    fn parse_transfer_event(&self, payload: &[u8]) -> GatewayResult<Option<TransferEvent>>;
}
