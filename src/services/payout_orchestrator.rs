//! Payout Orchestrator Service
//!
//! Drives a withdrawal from reservation to settlement or compensation. This is
//! the only code that changes `PaymentRequest.status`. Gateway calls always run
//! outside store transactions; every write is a compare-and-set on the status
//! the decision was based on, so a concurrent webhook or reconciler pass can
//! never apply the same outcome twice.

use crate::cache::cache::{ttl, Cache};
use crate::cache::keys::payout::RecipientKey;
use crate::ledger::{LedgerError, LedgerOperation, SellerBalance, MONEY_SCALE};
use crate::payments::error::GatewayError;
use crate::payments::provider::TransferGateway;
use crate::payments::types::{
    to_minor_units, PayoutDetails, PayoutDetailsError, PayoutMethod, ResendReason,
    TransferEvent, TransferEventKind, TransferRequest, TransferStatus,
};
use crate::payouts::{
    Actor, LedgerMutation, MutationOutcome, Page, PaymentRequest, PaymentRequestStatus,
    PayoutStore, PayoutStoreError, RequestFilter, RequestUpdate,
    METADATA_PREVIOUS_TRANSFER_CODES, METADATA_RECONCILIATION_REQUIRED,
};
use crate::services::notification::{dispatch, PayoutNotificationType, PayoutNotifier};
use crate::services::revenue_history::{references, RevenueEntryType, RevenueHistoryEntry};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use PaymentRequestStatus as Status;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Smallest gross amount a seller may withdraw
    pub min_withdrawal_amount: Decimal,
    /// Fraction of the gross amount withheld, 0 disables withholding
    pub withholding_tax_rate: Decimal,
    pub currency: String,
    /// How long a gateway recipient code is reused for the same destination
    pub recipient_cache_ttl: Duration,
    /// Narration sent with every transfer
    pub transfer_reason: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_withdrawal_amount: Decimal::from(10),
            withholding_tax_rate: Decimal::ZERO,
            currency: "NGN".to_string(),
            recipient_cache_ttl: ttl::RECIPIENT_CODE,
            transfer_reason: "Seller payout".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_withdrawal_amount: std::env::var("PAYOUT_MIN_WITHDRAWAL_AMOUNT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.min_withdrawal_amount),
            withholding_tax_rate: std::env::var("PAYOUT_WITHHOLDING_TAX_RATE")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|rate: &Decimal| *rate >= Decimal::ZERO && *rate < Decimal::ONE)
                .unwrap_or(defaults.withholding_tax_rate),
            currency: std::env::var("PAYOUT_CURRENCY").unwrap_or(defaults.currency),
            recipient_cache_ttl: defaults.recipient_cache_ttl,
            transfer_reason: std::env::var("PAYOUT_TRANSFER_REASON")
                .unwrap_or(defaults.transfer_reason),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Insufficient withdrawable balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("You already have an active withdrawal request")]
    ActiveRequestExists,

    #[error("Withdrawal request {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {action} a withdrawal request that is {status}")]
    InvalidStatus {
        status: PaymentRequestStatus,
        action: &'static str,
    },

    #[error("Withdrawal request is already {status}")]
    AlreadySettled { status: PaymentRequestStatus },

    #[error("Invalid OTP: {message}")]
    InvalidOtp { message: String },

    #[error("OTP was not accepted, please try again")]
    OtpNotAccepted,

    #[error("OTP expired. Click resend to receive a new OTP")]
    OtpExpired,

    #[error("Invalid payout account details: {message}")]
    InvalidAccountDetails { message: String },

    #[error("Transfer failed: {reason}")]
    TransferFailed { reason: String },

    #[error("Reversal not allowed: {message}")]
    ReversalNotAllowed { message: String },

    #[error("Payment gateway unavailable: {message}")]
    GatewayUnavailable { message: String },

    #[error("Payment gateway timed out after {timeout_secs}s")]
    GatewayTimeout { timeout_secs: u64 },

    #[error("Storage error: {message}")]
    Store { message: String, retryable: bool },

    #[error("Ledger consistency error: {0}")]
    Consistency(String),
}

pub type PayoutResult<T> = Result<T, PayoutError>;

impl PayoutError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PayoutError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PayoutError::Store { retryable, .. } => *retryable,
            other => matches!(
                other,
                PayoutError::InvalidOtp { .. }
                    | PayoutError::OtpNotAccepted
                    | PayoutError::GatewayUnavailable { .. }
                    | PayoutError::GatewayTimeout { .. }
            ),
        }
    }
}

impl From<PayoutDetailsError> for PayoutError {
    fn from(err: PayoutDetailsError) -> Self {
        PayoutError::Validation {
            field: err.field.to_string(),
            message: err.message,
        }
    }
}

impl From<LedgerError> for PayoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                available,
                requested,
            } => PayoutError::InsufficientBalance {
                available,
                requested,
            },
            LedgerError::NonPositiveAmount { amount } => {
                PayoutError::validation("amount", format!("must be positive, got {}", amount))
            }
            LedgerError::InsufficientLocked { locked, requested } => PayoutError::validation(
                "amount",
                format!("{} exceeds locked balance {}", requested, locked),
            ),
            other => PayoutError::Consistency(other.to_string()),
        }
    }
}

impl From<PayoutStoreError> for PayoutError {
    fn from(err: PayoutStoreError) -> Self {
        match err {
            PayoutStoreError::Ledger(e) => e.into(),
            PayoutStoreError::ActiveRequestExists => PayoutError::ActiveRequestExists,
            PayoutStoreError::RequestNotFound(id) => PayoutError::NotFound(id),
            PayoutStoreError::StatusConflict { current, .. } => PayoutError::InvalidStatus {
                status: current,
                action: "update",
            },
            PayoutStoreError::Database(e) => PayoutError::Store {
                retryable: e.is_retryable(),
                message: e.to_string(),
            },
        }
    }
}

impl From<GatewayError> for PayoutError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidAccountDetails { message } => {
                PayoutError::InvalidAccountDetails { message }
            }
            GatewayError::InvalidOtp { message } => PayoutError::InvalidOtp { message },
            GatewayError::OtpExpired { .. } | GatewayError::TransferNotAwaitingOtp { .. } => {
                PayoutError::OtpExpired
            }
            GatewayError::Timeout { timeout_secs } => PayoutError::GatewayTimeout { timeout_secs },
            GatewayError::Rejected { message, .. } => PayoutError::TransferFailed { reason: message },
            other => PayoutError::GatewayUnavailable {
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Inputs & Results
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateWithdrawal {
    pub amount: Decimal,
    pub payout_method: String,
    pub payment_details: Option<PayoutDetails>,
    pub save_as_default: bool,
}

/// Result of a lock, unlock or credit issued by another subsystem.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub reference: String,
    pub duplicate: bool,
    pub balance: SellerBalance,
}

/// How reserved funds are returned to the seller.
#[derive(Debug, Clone)]
enum Compensation {
    Failed { reason: String },
    OtpExpired,
    Cancelled { deactivate: bool },
    Reversed { reason: String },
}

impl Compensation {
    fn status(&self) -> Status {
        match self {
            Compensation::Failed { .. } => Status::Failed,
            Compensation::OtpExpired => Status::OtpExpired,
            Compensation::Cancelled { .. } | Compensation::Reversed { .. } => Status::Cancelled,
        }
    }

    fn entry_type(&self) -> RevenueEntryType {
        match self {
            Compensation::Failed { .. } => RevenueEntryType::WithdrawalFailed,
            Compensation::OtpExpired => RevenueEntryType::OtpExpired,
            Compensation::Cancelled { .. } | Compensation::Reversed { .. } => {
                RevenueEntryType::WithdrawalRefunded
            }
        }
    }

    fn reference(&self, request: &PaymentRequest) -> String {
        match self {
            Compensation::Failed { .. } => references::failed(request.id),
            Compensation::OtpExpired => {
                references::otp_expired(request.id, request.transfer_attempts)
            }
            Compensation::Cancelled { .. } | Compensation::Reversed { .. } => {
                references::refunded(request.id)
            }
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Compensation::Failed { .. } => "transfer_failed",
            Compensation::OtpExpired => "otp_expired",
            Compensation::Cancelled { deactivate: false } => "cancelled",
            Compensation::Cancelled { deactivate: true } => "deleted",
            Compensation::Reversed { .. } => "reversed",
        }
    }
}

/// A committed transition, or the state a concurrent writer already reached.
struct Transitioned {
    request: PaymentRequest,
    applied: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct PayoutOrchestrator {
    store: Arc<dyn PayoutStore>,
    gateway: Arc<dyn TransferGateway>,
    recipient_cache: Arc<dyn Cache<String>>,
    notifier: Arc<dyn PayoutNotifier>,
    config: OrchestratorConfig,
}

impl PayoutOrchestrator {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        gateway: Arc<dyn TransferGateway>,
        recipient_cache: Arc<dyn Cache<String>>,
        notifier: Arc<dyn PayoutNotifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            recipient_cache,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn TransferGateway> {
        &self.gateway
    }

    // ------------------------------------------------------------------------
    // Seller operations
    // ------------------------------------------------------------------------

    /// Reserve funds, persist a `pending` request and try to start the transfer.
    ///
    /// A gateway outage after the reservation is not an error: the request
    /// stays `pending` and the reconciler picks it up.
    pub async fn create_withdrawal(
        &self,
        seller_id: &str,
        input: CreateWithdrawal,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let amount = self.validate_amount(input.amount)?;
        let method: PayoutMethod = input.payout_method.parse()?;

        let details = match input.payment_details {
            Some(details) => details,
            None => self.store.default_details(seller_id).await?.ok_or_else(|| {
                PayoutError::validation(
                    "paymentDetails",
                    "no payment details provided and no saved default",
                )
            })?,
        }
        .validated()?;
        if details.method() != method {
            return Err(PayoutError::validation(
                "payoutMethod",
                format!(
                    "{} does not match payment details of type {}",
                    method,
                    details.method()
                ),
            ));
        }

        let withholding_tax = (amount * self.config.withholding_tax_rate).round_dp(MONEY_SCALE);
        if amount - withholding_tax <= Decimal::ZERO {
            return Err(PayoutError::validation(
                "amount",
                "nothing left to pay out after withholding tax",
            ));
        }

        let request = PaymentRequest::new(
            seller_id,
            amount,
            withholding_tax,
            &self.config.currency,
            details.clone(),
            actor,
        );
        let mutation = LedgerMutation::new(
            seller_id,
            LedgerOperation::Reserve(request.amount_requested),
            RevenueEntryType::WithdrawalCreated,
            references::created(request.id),
        )
        .with_metadata(json!({ "requestId": request.id }));

        let committed = self.store.create_request(request, mutation).await?;
        let request = committed.value;
        info!(
            request_id = %request.id,
            seller_id = %seller_id,
            amount = %request.amount_requested,
            net = %request.amount_paid_to_seller,
            destination = %request.payment_details.masked_destination(),
            "withdrawal reserved"
        );

        if input.save_as_default {
            if let Err(e) = self.store.save_default_details(seller_id, &details).await {
                warn!(seller_id = %seller_id, error = %e, "failed to save default payout details");
            }
        }

        match self.initiate_transfer(request.clone(), actor).await {
            Ok(request) => Ok(request),
            Err(e @ (PayoutError::GatewayUnavailable { .. } | PayoutError::GatewayTimeout { .. })) => {
                warn!(
                    request_id = %request.id,
                    error = %e,
                    "transfer not started; request left pending for the reconciler"
                );
                self.reload(request.id).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn submit_otp(
        &self,
        seller_id: &str,
        request_id: Uuid,
        otp: &str,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let request = self.owned_request(seller_id, request_id).await?;
        if request.status.is_settled() {
            return Err(PayoutError::AlreadySettled {
                status: request.status,
            });
        }
        let otp = otp.trim();
        if !(4..=8).contains(&otp.len()) || !otp.chars().all(|c| c.is_ascii_digit()) {
            return Err(PayoutError::validation("otp", "must be 4 to 8 digits"));
        }
        if request.status != Status::AwaitingPaystackOtp {
            return Err(PayoutError::InvalidStatus {
                status: request.status,
                action: "submit an OTP for",
            });
        }
        let Some(code) = request.paystack_transfer_code.clone() else {
            return Err(PayoutError::OtpExpired);
        };

        match self.gateway.check_status(&code).await {
            Ok(snapshot) if snapshot.status != TransferStatus::Otp => {
                info!(
                    request_id = %request.id,
                    transfer_code = %code,
                    gateway_status = %snapshot.status,
                    "transfer no longer awaiting OTP"
                );
                return self
                    .conclude(request, snapshot.status, snapshot.failure_reason, actor)
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "OTP pre-check failed; finalizing anyway");
            }
        }

        match self.gateway.finalize_with_otp(&code, otp).await {
            Ok(outcome) => self.conclude(request, outcome.status, None, actor).await,
            Err(GatewayError::InvalidOtp { message }) => Err(PayoutError::InvalidOtp { message }),
            Err(e) if e.requires_new_transfer() => {
                self.compensate(&request, Compensation::OtpExpired, RequestUpdate::default(), actor)
                    .await?;
                Err(PayoutError::OtpExpired)
            }
            Err(e) if e.is_transport() => {
                warn!(request_id = %request.id, error = %e, "finalize outcome unknown; checking status");
                match self.gateway.check_status(&code).await {
                    Ok(snapshot) if snapshot.status != TransferStatus::Otp => {
                        self.conclude(request, snapshot.status, snapshot.failure_reason, actor)
                            .await
                    }
                    Ok(_) => Err(PayoutError::GatewayUnavailable {
                        message: e.to_string(),
                    }),
                    Err(lookup) => Err(PayoutError::GatewayUnavailable {
                        message: lookup.to_string(),
                    }),
                }
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "finalize rejected by gateway");
                Err(e.into())
            }
        }
    }

    pub async fn resend_otp(
        &self,
        seller_id: &str,
        request_id: Uuid,
        reason: ResendReason,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let request = self.owned_request(seller_id, request_id).await?;

        match (request.status, request.paystack_transfer_code.clone()) {
            (Status::OtpExpired, _) => {
                let attempt = request.transfer_attempts + 1;
                let mutation = LedgerMutation::new(
                    &request.seller_id,
                    LedgerOperation::Reserve(request.amount_requested),
                    RevenueEntryType::WithdrawalCreated,
                    references::reserved(request.id, attempt),
                )
                .with_metadata(json!({ "requestId": request.id, "attempt": attempt }));
                let mut update = RequestUpdate::to_status(Status::Pending)
                    .with_audit(actor.entry("re_reserved", None));
                update.failure_reason = Some(None);

                let reserved = self
                    .transition(&request, &[Status::OtpExpired], update, Some(mutation))
                    .await?;
                info!(request_id = %request.id, attempt, "funds re-reserved for a new transfer");
                self.initiate_transfer(reserved.request, actor).await
            }
            (Status::AwaitingPaystackOtp, Some(code)) => {
                let snapshot = self.gateway.check_status(&code).await.map_err(unavailable)?;
                match snapshot.status {
                    TransferStatus::Abandoned => self.reinitiate(request, actor).await,
                    TransferStatus::Otp => match self.gateway.resend_otp(&code, reason).await {
                        Ok(()) => {
                            info!(request_id = %request.id, transfer_code = %code, "OTP resent");
                            let update = RequestUpdate::default()
                                .with_audit(actor.entry("otp_resent", Some(reason.as_str().to_string())));
                            Ok(self
                                .transition(&request, &[Status::AwaitingPaystackOtp], update, None)
                                .await?
                                .request)
                        }
                        Err(e) if e.requires_new_transfer() => self.reinitiate(request, actor).await,
                        Err(e) if e.is_transport() => Err(unavailable(e)),
                        Err(e) => Err(e.into()),
                    },
                    status => self.conclude(request, status, snapshot.failure_reason, actor).await,
                }
            }
            (Status::AwaitingPaystackOtp, None) => self.reinitiate(request, actor).await,
            (Status::Pending, None) => self.initiate_transfer(request, actor).await,
            (status, _) => Err(PayoutError::InvalidStatus {
                status,
                action: "resend the OTP for",
            }),
        }
    }

    pub async fn cancel(
        &self,
        seller_id: &str,
        request_id: Uuid,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        self.release_pending(seller_id, request_id, false, actor).await
    }

    /// Cancel and soft-delete. Rows are never removed.
    pub async fn delete(
        &self,
        seller_id: &str,
        request_id: Uuid,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        self.release_pending(seller_id, request_id, true, actor).await
    }

    async fn release_pending(
        &self,
        seller_id: &str,
        request_id: Uuid,
        deactivate: bool,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let action = if deactivate { "delete" } else { "cancel" };
        let request = self.owned_request(seller_id, request_id).await?;
        if request.status != Status::Pending || !request.is_active {
            return Err(PayoutError::InvalidStatus {
                status: request.status,
                action,
            });
        }

        let request = self.resolve_unanswered_initiate(request, actor).await?;
        if request.status != Status::Pending {
            if request.status.is_settled() {
                return Err(PayoutError::AlreadySettled {
                    status: request.status,
                });
            }
            return Err(PayoutError::InvalidStatus {
                status: request.status,
                action,
            });
        }

        let mut update = RequestUpdate::default();
        if deactivate {
            update.is_active = Some(false);
        }
        self.compensate(&request, Compensation::Cancelled { deactivate }, update, actor)
            .await
    }

    /// Seller-initiated reversal before the transfer succeeds.
    pub async fn request_reversal(
        &self,
        seller_id: &str,
        request_id: Uuid,
        amount: Decimal,
        reason: &str,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let request = self.owned_request(seller_id, request_id).await?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PayoutError::validation("reason", "a reversal reason is required"));
        }
        if amount.round_dp(MONEY_SCALE) != request.amount_requested {
            return Err(PayoutError::validation(
                "amount",
                format!("must equal the requested amount {}", request.amount_requested),
            ));
        }

        let request = if request.status == Status::Pending && request.is_active {
            self.resolve_unanswered_initiate(request, actor).await?
        } else {
            request
        };

        let reversal = Compensation::Reversed {
            reason: reason.to_string(),
        };
        match (request.status, request.paystack_transfer_code.clone()) {
            (Status::Paid | Status::Approved, _) => Err(PayoutError::ReversalNotAllowed {
                message: "the payout has already been completed".to_string(),
            }),
            (Status::Pending, _) | (Status::AwaitingPaystackOtp, None) => {
                self.compensate(&request, reversal, RequestUpdate::default(), actor)
                    .await
            }
            (Status::AwaitingPaystackOtp, Some(code)) => {
                // A finalize that timed out may have completed the transfer.
                let snapshot = self.gateway.check_status(&code).await.map_err(|e| {
                    warn!(request_id = %request.id, error = %e, "reversal lookup failed");
                    PayoutError::GatewayUnavailable {
                        message: e.to_string(),
                    }
                })?;
                self.reverse_in_flight(request, snapshot.status, reversal, reason, actor)
                    .await
            }
            (Status::Processing, code) => {
                let lookup = match code {
                    Some(code) => self.gateway.check_status(&code).await.ok(),
                    None => None,
                };
                match lookup {
                    Some(snapshot) => {
                        self.reverse_in_flight(request, snapshot.status, reversal, reason, actor)
                            .await
                    }
                    None => self.flag_reversal(&request, reason, actor).await,
                }
            }
            (status, _) => Err(PayoutError::InvalidStatus {
                status,
                action: "reverse",
            }),
        }
    }

    /// Reversal of a request whose transfer exists at the gateway.
    async fn reverse_in_flight(
        &self,
        request: PaymentRequest,
        status: TransferStatus,
        reversal: Compensation,
        reason: &str,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        match status {
            TransferStatus::Success => {
                self.settle(&request, RequestUpdate::default(), actor).await?;
                Err(PayoutError::ReversalNotAllowed {
                    message: "the transfer completed before the reversal".to_string(),
                })
            }
            TransferStatus::Otp
            | TransferStatus::Failed
            | TransferStatus::Abandoned
            | TransferStatus::Reversed => {
                self.compensate(&request, reversal, RequestUpdate::default(), actor)
                    .await
            }
            TransferStatus::Pending => self.flag_reversal(&request, reason, actor).await,
        }
    }

    async fn flag_reversal(
        &self,
        request: &PaymentRequest,
        reason: &str,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let update = RequestUpdate {
            status: Some(Status::Processing),
            reversal_requested: Some(true),
            reverse_reason: Some(reason.to_string()),
            ..RequestUpdate::default()
        }
        .with_audit(actor.entry("reversal_requested", Some(reason.to_string())));
        warn!(
            request_id = %request.id,
            "reversal requested while transfer in flight; flagged for review"
        );
        Ok(self
            .transition(
                request,
                &[Status::AwaitingPaystackOtp, Status::Processing],
                update,
                None,
            )
            .await?
            .request)
    }

    pub async fn get_balance(&self, seller_id: &str) -> PayoutResult<SellerBalance> {
        Ok(self.store.get_balance(seller_id).await?)
    }

    pub async fn list_requests(
        &self,
        seller_id: &str,
        filter: RequestFilter,
    ) -> PayoutResult<Page<PaymentRequest>> {
        Ok(self.store.list_requests(seller_id, filter).await?)
    }

    pub async fn get_request(
        &self,
        seller_id: &str,
        request_id: Uuid,
    ) -> PayoutResult<PaymentRequest> {
        self.owned_request(seller_id, request_id).await
    }

    pub async fn history(
        &self,
        seller_id: &str,
        limit: Option<i64>,
    ) -> PayoutResult<Vec<RevenueHistoryEntry>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store.history(seller_id, limit).await?)
    }

    pub async fn save_payout_details(
        &self,
        seller_id: &str,
        details: PayoutDetails,
    ) -> PayoutResult<PayoutDetails> {
        let details = details.validated()?;
        self.store.save_default_details(seller_id, &details).await?;
        info!(
            seller_id = %seller_id,
            destination = %details.masked_destination(),
            "default payout details saved"
        );
        Ok(details)
    }

    // ------------------------------------------------------------------------
    // Collaborator ledger entry points
    // ------------------------------------------------------------------------

    pub async fn lock_funds(
        &self,
        seller_id: &str,
        amount: Decimal,
        reference: &str,
        reason: Option<&str>,
    ) -> PayoutResult<LedgerReceipt> {
        self.collaborator_mutation(
            seller_id,
            LedgerOperation::Lock(amount),
            RevenueEntryType::BalanceLocked,
            reference,
            json!({ "reason": reason }),
        )
        .await
    }

    pub async fn unlock_funds(
        &self,
        seller_id: &str,
        amount: Decimal,
        reference: &str,
        reason: Option<&str>,
    ) -> PayoutResult<LedgerReceipt> {
        self.collaborator_mutation(
            seller_id,
            LedgerOperation::Unlock(amount),
            RevenueEntryType::BalanceUnlocked,
            reference,
            json!({ "reason": reason }),
        )
        .await
    }

    pub async fn credit_earnings(
        &self,
        seller_id: &str,
        amount: Decimal,
        order_id: &str,
    ) -> PayoutResult<LedgerReceipt> {
        if order_id.trim().is_empty() {
            return Err(PayoutError::validation("orderId", "is required"));
        }
        self.collaborator_mutation(
            seller_id,
            LedgerOperation::Credit(amount),
            RevenueEntryType::OrderRevenue,
            &references::order_revenue(order_id.trim()),
            json!({ "orderId": order_id.trim() }),
        )
        .await
    }

    async fn collaborator_mutation(
        &self,
        seller_id: &str,
        operation: LedgerOperation,
        entry_type: RevenueEntryType,
        reference: &str,
        metadata: JsonValue,
    ) -> PayoutResult<LedgerReceipt> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PayoutError::validation("reference", "is required"));
        }
        if seller_id.trim().is_empty() {
            return Err(PayoutError::validation("sellerId", "is required"));
        }
        if operation.amount().round_dp(MONEY_SCALE) <= Decimal::ZERO {
            return Err(PayoutError::validation("amount", "must be positive"));
        }

        let mutation = LedgerMutation::new(seller_id, operation, entry_type, reference.to_string())
            .with_metadata(metadata);
        let committed = self.store.apply_mutation(mutation).await?;
        let duplicate = committed.value == MutationOutcome::Duplicate;
        if duplicate {
            debug!(seller_id = %seller_id, reference = %reference, "ledger reference already applied");
        } else {
            info!(
                seller_id = %seller_id,
                operation = operation.name(),
                amount = %operation.amount(),
                reference = %reference,
                "seller balance updated"
            );
        }

        let balance = match committed.balance {
            Some(balance) => balance,
            None => self.store.get_balance(seller_id).await?,
        };
        Ok(LedgerReceipt {
            reference: reference.to_string(),
            duplicate,
            balance,
        })
    }

    // ------------------------------------------------------------------------
    // Gateway-driven resolution
    // ------------------------------------------------------------------------

    /// Apply a verified transfer webhook. Unknown transfers are ignored.
    pub async fn handle_transfer_event(
        &self,
        event: &TransferEvent,
    ) -> PayoutResult<Option<PaymentRequest>> {
        let Some(request) = self
            .store
            .find_by_transfer(event.transfer_code.as_deref(), event.reference.as_deref())
            .await?
        else {
            warn!(
                transfer_code = ?event.transfer_code,
                reference = ?event.reference,
                "transfer event for unknown payout request"
            );
            return Ok(None);
        };

        let actor = Actor::gateway(self.gateway.name());
        let status = event.kind.status();

        if request.status.is_settled() {
            if event.kind == TransferEventKind::Reversed {
                return self.flag_for_reconciliation(request, "transfer reversed after payout", &actor)
                    .await
                    .map(Some);
            }
            debug!(request_id = %request.id, status = %request.status, "event for settled request ignored");
            return Ok(Some(request));
        }

        if !request.is_active() {
            if event.kind == TransferEventKind::Success {
                return self
                    .flag_for_reconciliation(request, "transfer succeeded after funds were released", &actor)
                    .await
                    .map(Some);
            }
            debug!(request_id = %request.id, status = %request.status, "event for closed request ignored");
            return Ok(Some(request));
        }

        self.apply_gateway_status(request, status, None, &actor)
            .await
            .map(Some)
    }

    /// Resolve one stuck request against the gateway. Used by the reconciler.
    pub async fn reconcile_request(&self, request: PaymentRequest) -> PayoutResult<PaymentRequest> {
        if !request.is_active() {
            return Ok(request);
        }
        let actor = Actor::system();

        match (request.status, request.paystack_transfer_code.clone()) {
            (Status::Pending, None) => {
                // An earlier initiate may have reached the gateway before timing out.
                let reference = request.next_transfer_reference();
                match self.gateway.verify_transfer(&reference).await {
                    Ok(snapshot) => {
                        let recipient_code = request.paystack_recipient_code.clone();
                        self.record_initiation(
                            request,
                            recipient_code,
                            snapshot.transfer_code,
                            reference,
                            snapshot.status,
                            &actor,
                        )
                        .await
                    }
                    Err(GatewayError::TransferNotFound { .. }) => {
                        self.initiate_transfer(request, &actor).await
                    }
                    Err(e) => Err(unavailable(e)),
                }
            }
            (_, Some(code)) => {
                let snapshot = self.gateway.check_status(&code).await.map_err(unavailable)?;
                self.apply_gateway_status(request, snapshot.status, snapshot.failure_reason, &actor)
                    .await
            }
            (_, None) => match request.transfer_reference.clone() {
                Some(reference) => {
                    let snapshot = self
                        .gateway
                        .verify_transfer(&reference)
                        .await
                        .map_err(unavailable)?;
                    self.apply_gateway_status(request, snapshot.status, snapshot.failure_reason, &actor)
                        .await
                }
                None => Err(PayoutError::Consistency(format!(
                    "request {} is {} without a transfer",
                    request.id, request.status
                ))),
            },
        }
    }

    /// The shared branch table for a known gateway status. Compensations are
    /// returned as the updated request, not as errors.
    async fn apply_gateway_status(
        &self,
        request: PaymentRequest,
        status: TransferStatus,
        failure_reason: Option<String>,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        match status {
            TransferStatus::Success => self.settle(&request, RequestUpdate::default(), actor).await,
            TransferStatus::Pending => {
                if request.status == Status::Processing {
                    return Ok(request);
                }
                self.mark_processing(&request, RequestUpdate::default(), actor)
                    .await
            }
            TransferStatus::Otp => Ok(request),
            TransferStatus::Abandoned => {
                self.compensate(&request, Compensation::OtpExpired, RequestUpdate::default(), actor)
                    .await
            }
            TransferStatus::Failed | TransferStatus::Reversed => {
                let reason = failure_reason
                    .unwrap_or_else(|| format!("transfer {} at gateway", status));
                self.compensate(&request, Compensation::Failed { reason }, RequestUpdate::default(), actor)
                    .await
            }
        }
    }

    /// Seller-facing wrapper around the branch table: compensations surface as
    /// the error the seller needs to act on.
    async fn conclude(
        &self,
        request: PaymentRequest,
        status: TransferStatus,
        failure_reason: Option<String>,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        if status == TransferStatus::Otp {
            return Err(PayoutError::OtpNotAccepted);
        }
        let updated = self
            .apply_gateway_status(request, status, failure_reason, actor)
            .await?;
        match updated.status {
            Status::Failed => Err(PayoutError::TransferFailed {
                reason: updated
                    .failure_reason
                    .unwrap_or_else(|| "transfer failed at gateway".to_string()),
            }),
            Status::OtpExpired => Err(PayoutError::OtpExpired),
            _ => Ok(updated),
        }
    }

    // ------------------------------------------------------------------------
    // Transfer initiation
    // ------------------------------------------------------------------------

    /// Start a transfer for a `pending` request that has no live transfer code.
    async fn initiate_transfer(
        &self,
        request: PaymentRequest,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let recipient_code = match self.recipient_code(&request).await {
            Ok(code) => code,
            Err(e) if e.is_transport() => return Err(unavailable(e)),
            Err(e) => return self.reject_transfer(request, e, actor).await,
        };

        let reference = request.next_transfer_reference();
        let transfer = TransferRequest {
            amount_minor: to_minor_units(request.amount_paid_to_seller)?,
            currency: request.currency.clone(),
            recipient_code: recipient_code.clone(),
            reference: reference.clone(),
            reason: self.config.transfer_reason.clone(),
        };

        // Record the reference before the call so an unanswered initiate can
        // still be found by cancel, reversal and the reconciler.
        let request = if request.transfer_reference.as_deref() == Some(reference.as_str()) {
            request
        } else {
            let attempt = RequestUpdate {
                recipient_code: Some(recipient_code.clone()),
                transfer_reference: Some(reference.clone()),
                ..RequestUpdate::default()
            };
            self.transition(&request, &[Status::Pending], attempt, None)
                .await?
                .request
        };

        match self.gateway.initiate_transfer(transfer).await {
            Ok(initiation) => {
                self.record_initiation(
                    request,
                    Some(recipient_code),
                    initiation.transfer_code,
                    reference,
                    initiation.status,
                    actor,
                )
                .await
            }
            Err(e) if e.is_transport() => {
                warn!(
                    request_id = %request.id,
                    reference = %reference,
                    error = %e,
                    "initiate outcome unknown; verifying by reference"
                );
                match self.gateway.verify_transfer(&reference).await {
                    Ok(snapshot) => {
                        self.record_initiation(
                            request,
                            Some(recipient_code),
                            snapshot.transfer_code,
                            reference,
                            snapshot.status,
                            actor,
                        )
                        .await
                    }
                    Err(lookup) => {
                        debug!(request_id = %request.id, error = %lookup, "transfer lookup failed");
                        Err(unavailable(e))
                    }
                }
            }
            Err(e) => {
                let base = RequestUpdate {
                    recipient_code: Some(recipient_code),
                    ..RequestUpdate::default()
                };
                self.reject_transfer_with(request, base, e, actor).await
            }
        }
    }

    /// Settle the fate of an initiate that was sent but never answered before
    /// funds are released from a `pending` request. Returns the request as it
    /// stands afterwards; a gateway that cannot be asked leaves it untouched.
    async fn resolve_unanswered_initiate(
        &self,
        request: PaymentRequest,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let Some(reference) = request.unresolved_attempt() else {
            return Ok(request);
        };
        match self.gateway.verify_transfer(&reference).await {
            Ok(snapshot) => {
                info!(
                    request_id = %request.id,
                    reference = %reference,
                    gateway_status = %snapshot.status,
                    "unanswered initiate found at gateway"
                );
                let request_id = request.id;
                let recipient_code = request.paystack_recipient_code.clone();
                match self
                    .record_initiation(
                        request,
                        recipient_code,
                        snapshot.transfer_code,
                        reference,
                        snapshot.status,
                        actor,
                    )
                    .await
                {
                    Err(PayoutError::TransferFailed { .. }) => self.reload(request_id).await,
                    other => other,
                }
            }
            Err(GatewayError::TransferNotFound { .. }) => Ok(request),
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    reference = %reference,
                    error = %e,
                    "cannot confirm unanswered initiate; funds stay reserved"
                );
                Err(PayoutError::GatewayUnavailable {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Abandon the current transfer code and start over. Funds stay reserved.
    async fn reinitiate(
        &self,
        request: PaymentRequest,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let mut update = RequestUpdate::to_status(Status::Pending)
            .clearing_transfer_code()
            .with_audit(actor.entry("transfer_abandoned", request.paystack_transfer_code.clone()));
        if let Some(code) = &request.paystack_transfer_code {
            update = update.push_metadata(
                METADATA_PREVIOUS_TRANSFER_CODES,
                JsonValue::String(code.clone()),
            );
        }
        let reset = self
            .transition(&request, &[Status::AwaitingPaystackOtp], update, None)
            .await?;
        info!(
            request_id = %request.id,
            previous_code = ?request.paystack_transfer_code,
            "re-initiating abandoned transfer"
        );
        self.initiate_transfer(reset.request, actor).await
    }

    async fn record_initiation(
        &self,
        request: PaymentRequest,
        recipient_code: Option<String>,
        transfer_code: String,
        reference: String,
        status: TransferStatus,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let base = RequestUpdate {
            recipient_code,
            transfer_code: Some(Some(transfer_code.clone())),
            transfer_reference: Some(reference.clone()),
            increment_attempts: true,
            ..RequestUpdate::default()
        };
        info!(
            request_id = %request.id,
            transfer_code = %transfer_code,
            reference = %reference,
            gateway_status = %status,
            "transfer initiated"
        );

        match status {
            TransferStatus::Otp => {
                let update = RequestUpdate {
                    status: Some(Status::AwaitingPaystackOtp),
                    ..base
                }
                .with_audit(actor.entry("transfer_initiated", Some(transfer_code)));
                Ok(self
                    .transition(&request, &[Status::Pending], update, None)
                    .await?
                    .request)
            }
            TransferStatus::Pending => self.mark_processing(&request, base, actor).await,
            TransferStatus::Success => self.settle(&request, base, actor).await,
            TransferStatus::Failed | TransferStatus::Abandoned | TransferStatus::Reversed => {
                let reason = format!("transfer {} at gateway on initiation", status);
                self.compensate(
                    &request,
                    Compensation::Failed {
                        reason: reason.clone(),
                    },
                    base,
                    actor,
                )
                .await?;
                Err(PayoutError::TransferFailed { reason })
            }
        }
    }

    async fn reject_transfer(
        &self,
        request: PaymentRequest,
        err: GatewayError,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        self.reject_transfer_with(request, RequestUpdate::default(), err, actor)
            .await
    }

    /// Business rejection of a recipient or transfer.
    async fn reject_transfer_with(
        &self,
        request: PaymentRequest,
        base: RequestUpdate,
        err: GatewayError,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        match err {
            GatewayError::InvalidAccountDetails { message } => {
                self.compensate(
                    &request,
                    Compensation::Failed {
                        reason: message.clone(),
                    },
                    base,
                    actor,
                )
                .await?;
                Err(PayoutError::InvalidAccountDetails { message })
            }
            GatewayError::InsufficientGatewayBalance { message } => {
                error!(
                    request_id = %request.id,
                    amount = %request.amount_paid_to_seller,
                    error = %message,
                    "platform transfer balance too low; payout left pending"
                );
                let update = base
                    .with_failure_reason(message.clone())
                    .with_audit(actor.entry("transfer_deferred", Some(message.clone())));
                self.transition(&request, &[Status::Pending], update, None)
                    .await?;
                Err(PayoutError::GatewayUnavailable { message })
            }
            other => {
                let reason = other.to_string();
                self.compensate(
                    &request,
                    Compensation::Failed {
                        reason: reason.clone(),
                    },
                    base,
                    actor,
                )
                .await?;
                Err(PayoutError::TransferFailed { reason })
            }
        }
    }

    /// Recipient code from the request, then the cache, then the gateway.
    async fn recipient_code(&self, request: &PaymentRequest) -> Result<String, GatewayError> {
        if let Some(code) = &request.paystack_recipient_code {
            return Ok(code.clone());
        }

        let key = RecipientKey::new(request.payment_details.fingerprint()).to_string();
        match self.recipient_cache.get(&key).await {
            Ok(Some(code)) => {
                debug!(request_id = %request.id, "recipient code served from cache");
                return Ok(code);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "recipient cache read failed"),
        }

        let code = self
            .gateway
            .create_recipient(&request.payment_details, &request.currency)
            .await?;
        if let Err(e) = self
            .recipient_cache
            .set(&key, &code, Some(self.config.recipient_cache_ttl))
            .await
        {
            warn!(error = %e, "recipient cache write failed");
        }
        Ok(code)
    }

    // ------------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------------

    async fn settle(
        &self,
        request: &PaymentRequest,
        base: RequestUpdate,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let mutation = LedgerMutation::new(
            &request.seller_id,
            LedgerOperation::Finalize(request.amount_requested),
            RevenueEntryType::Payout,
            references::payout(request.id),
        )
        .with_metadata(json!({
            "requestId": request.id,
            "amountPaidToSeller": request.amount_paid_to_seller,
            "withholdingTax": request.withholding_tax,
        }));
        let mut update = RequestUpdate {
            status: Some(Status::Paid),
            paid_at: Some(Utc::now()),
            ..base
        }
        .with_audit(actor.entry("paid", None));
        update.failure_reason = Some(None);

        let done = self
            .transition(request, &Status::ACTIVE, update, Some(mutation))
            .await?;
        if done.applied {
            info!(
                request_id = %request.id,
                seller_id = %request.seller_id,
                amount = %request.amount_requested,
                "payout settled"
            );
            self.notify(&done.request, PayoutNotificationType::PayoutCompleted);
        }
        Ok(done.request)
    }

    async fn mark_processing(
        &self,
        request: &PaymentRequest,
        base: RequestUpdate,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let update = RequestUpdate {
            status: Some(Status::Processing),
            ..base
        }
        .with_audit(actor.entry("processing", None));
        let done = self
            .transition(
                request,
                &[Status::Pending, Status::AwaitingPaystackOtp],
                update,
                None,
            )
            .await?;
        Ok(done.request)
    }

    async fn compensate(
        &self,
        request: &PaymentRequest,
        compensation: Compensation,
        base: RequestUpdate,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        let target = compensation.status();
        let expected: &[Status] = match &compensation {
            Compensation::Cancelled { .. } => &[Status::Pending],
            Compensation::Reversed { .. } => &Status::ACTIVE,
            Compensation::Failed { .. } | Compensation::OtpExpired => &Status::ACTIVE,
        };

        let mutation = LedgerMutation::new(
            &request.seller_id,
            LedgerOperation::Release(request.amount_requested),
            compensation.entry_type(),
            compensation.reference(request),
        )
        .with_metadata(json!({ "requestId": request.id, "action": compensation.action() }));

        let note = match &compensation {
            Compensation::Failed { reason } | Compensation::Reversed { reason } => {
                Some(reason.clone())
            }
            _ => None,
        };
        let mut update = RequestUpdate {
            status: Some(target),
            ..base
        }
        .with_audit(actor.entry(compensation.action(), note));

        match &compensation {
            Compensation::Failed { reason } => {
                update = update.with_failure_reason(reason.clone());
            }
            Compensation::OtpExpired => {
                update = update.clearing_transfer_code();
                if let Some(code) = &request.paystack_transfer_code {
                    update = update.push_metadata(
                        METADATA_PREVIOUS_TRANSFER_CODES,
                        JsonValue::String(code.clone()),
                    );
                }
            }
            Compensation::Cancelled { .. } => {}
            Compensation::Reversed { reason } => {
                update.reversed = Some(true);
                update.reverse_reason = Some(reason.clone());
            }
        }

        let done = self
            .transition(request, expected, update, Some(mutation))
            .await?;
        if done.applied {
            info!(
                request_id = %request.id,
                seller_id = %request.seller_id,
                status = %target,
                amount = %request.amount_requested,
                "reserved funds released"
            );
            match target {
                Status::Failed => self.notify(&done.request, PayoutNotificationType::PayoutFailed),
                Status::OtpExpired => self.notify(&done.request, PayoutNotificationType::OtpExpired),
                _ => {}
            }
        }
        Ok(done.request)
    }

    async fn flag_for_reconciliation(
        &self,
        request: PaymentRequest,
        cause: &str,
        actor: &Actor,
    ) -> PayoutResult<PaymentRequest> {
        error!(
            request_id = %request.id,
            seller_id = %request.seller_id,
            status = %request.status,
            reconciliation_required = true,
            cause = %cause,
            "gateway outcome conflicts with settled ledger state"
        );
        let update = RequestUpdate::default()
            .set_metadata(METADATA_RECONCILIATION_REQUIRED, JsonValue::Bool(true))
            .with_audit(actor.entry("reconciliation_required", Some(cause.to_string())));
        Ok(self
            .transition(&request, &[request.status], update, None)
            .await?
            .request)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Compare-and-set through the store. Losing the race to a writer that
    /// already reached the same status is a no-op.
    async fn transition(
        &self,
        request: &PaymentRequest,
        expected: &[Status],
        update: RequestUpdate,
        mutation: Option<LedgerMutation>,
    ) -> PayoutResult<Transitioned> {
        let target = update.status;
        match self
            .store
            .transition(request.id, expected, update, mutation)
            .await
        {
            Ok(committed) => {
                if !committed.history_recorded {
                    warn!(request_id = %request.id, "transition committed with a history gap");
                }
                Ok(Transitioned {
                    request: committed.value,
                    applied: true,
                })
            }
            Err(PayoutStoreError::StatusConflict { current, .. }) if Some(current) == target => {
                debug!(request_id = %request.id, status = %current, "transition already applied");
                Ok(Transitioned {
                    request: self.reload(request.id).await?,
                    applied: false,
                })
            }
            Err(PayoutStoreError::StatusConflict { current, .. }) => {
                if current.is_settled() {
                    return Err(PayoutError::AlreadySettled { status: current });
                }
                Err(PayoutError::InvalidStatus {
                    status: current,
                    action: "update",
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn owned_request(&self, seller_id: &str, request_id: Uuid) -> PayoutResult<PaymentRequest> {
        match self.store.find_request(request_id).await? {
            Some(request) if request.seller_id == seller_id => Ok(request),
            _ => Err(PayoutError::NotFound(request_id)),
        }
    }

    async fn reload(&self, request_id: Uuid) -> PayoutResult<PaymentRequest> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or(PayoutError::NotFound(request_id))
    }

    fn validate_amount(&self, amount: Decimal) -> PayoutResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(PayoutError::validation("amount", "must be positive"));
        }
        if amount.normalize().scale() > MONEY_SCALE {
            return Err(PayoutError::validation(
                "amount",
                "must have at most 2 decimal places",
            ));
        }
        if amount < self.config.min_withdrawal_amount {
            return Err(PayoutError::validation(
                "amount",
                format!(
                    "minimum withdrawal is {} {}",
                    self.config.min_withdrawal_amount, self.config.currency
                ),
            ));
        }
        Ok(amount.round_dp(MONEY_SCALE))
    }

    fn notify(&self, request: &PaymentRequest, notification_type: PayoutNotificationType) {
        dispatch(self.notifier.clone(), request.clone(), notification_type);
    }
}

fn unavailable(err: GatewayError) -> PayoutError {
    match err {
        GatewayError::Timeout { timeout_secs } => PayoutError::GatewayTimeout { timeout_secs },
        other => PayoutError::GatewayUnavailable {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.min_withdrawal_amount, Decimal::from(10));
        assert_eq!(config.withholding_tax_rate, Decimal::ZERO);
        assert_eq!(config.currency, "NGN");
    }

    #[test]
    fn store_errors_map_to_payout_errors() {
        let err: PayoutError = PayoutStoreError::Ledger(LedgerError::InsufficientBalance {
            available: Decimal::from(5),
            requested: Decimal::from(50),
        })
        .into();
        assert!(matches!(err, PayoutError::InsufficientBalance { .. }));

        let err: PayoutError = PayoutStoreError::ActiveRequestExists.into();
        assert!(matches!(err, PayoutError::ActiveRequestExists));

        let err: PayoutError = PayoutStoreError::StatusConflict {
            current: Status::Paid,
            expected: vec![Status::Pending],
        }
        .into();
        assert!(matches!(err, PayoutError::InvalidStatus { .. }));
    }

    #[test]
    fn gateway_errors_map_to_payout_errors() {
        let err: PayoutError = GatewayError::InvalidOtp {
            message: "wrong".to_string(),
        }
        .into();
        assert!(err.is_retryable());

        let err: PayoutError = GatewayError::TransferNotAwaitingOtp {
            message: "abandoned".to_string(),
        }
        .into();
        assert!(matches!(err, PayoutError::OtpExpired));
        assert_eq!(
            err.to_string(),
            "OTP expired. Click resend to receive a new OTP"
        );

        let err = unavailable(GatewayError::Timeout { timeout_secs: 30 });
        assert!(matches!(err, PayoutError::GatewayTimeout { timeout_secs: 30 }));
    }

    #[test]
    fn compensation_references_are_per_outcome() {
        let request = PaymentRequest::new(
            "seller-1",
            Decimal::from(100),
            Decimal::ZERO,
            "NGN",
            PayoutDetails::Bank {
                account_number: "2001234567".to_string(),
                bank_code: "50211".to_string(),
                account_name: "Ada Obi".to_string(),
                bank_name: None,
            },
            &Actor::seller("seller-1", None),
        );
        let failed = Compensation::Failed {
            reason: "x".to_string(),
        };
        assert!(failed.reference(&request).ends_with("-FAILED"));
        assert_eq!(failed.status(), Status::Failed);
        assert!(Compensation::OtpExpired
            .reference(&request)
            .ends_with("-OTP_EXPIRED-0"));
        assert_eq!(
            Compensation::Cancelled { deactivate: true }.entry_type(),
            RevenueEntryType::WithdrawalRefunded
        );
    }
}
