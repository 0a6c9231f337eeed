//! Shared fixtures for the integration tests: a scripted gateway and a
//! fully wired orchestrator over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use marketplace_payouts::cache::{Cache, InMemoryCache};
use marketplace_payouts::payments::{
    GatewayError, GatewayResult, PayoutDetails, ResendReason, TransferEvent, TransferEventKind,
    TransferGateway, TransferInitiation, TransferOutcome, TransferRequest, TransferSnapshot,
    TransferStatus,
};
use marketplace_payouts::payouts::{Actor, InMemoryPayoutStore, PaymentRequest};
use marketplace_payouts::services::{
    CreateWithdrawal, LoggingNotifier, OrchestratorConfig, PayoutOrchestrator,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const SELLER: &str = "seller-1";
pub const VALID_OTP: &str = "123456";
pub const VALID_SIGNATURE: &str = "valid-signature";

/// What the next `initiate_transfer` call does.
#[derive(Debug, Clone)]
pub enum InitiateScript {
    Respond(TransferStatus),
    Fail(GatewayError),
    /// The transfer is created at the gateway but the response is lost.
    TimeoutAfterCreating(TransferStatus),
}

#[derive(Debug, Clone)]
struct MockTransfer {
    reference: String,
    status: TransferStatus,
    amount_minor: i64,
}

#[derive(Default)]
struct MockState {
    next_code: u32,
    transfers: HashMap<String, MockTransfer>,
    initiate: VecDeque<InitiateScript>,
    finalize_errors: VecDeque<GatewayError>,
    lose_finalize_response: bool,
    recipient_error: Option<GatewayError>,
    status_unavailable: bool,
    calls: Vec<String>,
}

/// In-process stand-in for the transfer gateway.
///
/// Transfers get codes `TRF_1`, `TRF_2`, ... and start in `otp` unless a
/// script says otherwise. The gateway deduplicates by reference like the
/// real one does.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_initiate(&self, script: InitiateScript) {
        self.state.lock().unwrap().initiate.push_back(script);
    }

    pub fn fail_next_finalize(&self, err: GatewayError) {
        self.state.lock().unwrap().finalize_errors.push_back(err);
    }

    /// The next finalize completes at the gateway but the caller times out.
    pub fn lose_next_finalize_response(&self) {
        self.state.lock().unwrap().lose_finalize_response = true;
    }

    pub fn reject_recipients(&self, err: GatewayError) {
        self.state.lock().unwrap().recipient_error = Some(err);
    }

    pub fn make_status_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().status_unavailable = unavailable;
    }

    /// Change a transfer's status on the gateway side.
    pub fn set_status(&self, transfer_code: &str, status: TransferStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(transfer) = state.transfers.get_mut(transfer_code) {
            transfer.status = status;
        }
    }

    pub fn status_of(&self, transfer_code: &str) -> Option<TransferStatus> {
        self.state
            .lock()
            .unwrap()
            .transfers
            .get(transfer_code)
            .map(|t| t.status)
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().unwrap().transfers.len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    fn snapshot(code: &str, transfer: &MockTransfer) -> TransferSnapshot {
        TransferSnapshot {
            transfer_code: code.to_string(),
            reference: transfer.reference.clone(),
            status: transfer.status,
            amount_minor: Some(transfer.amount_minor),
            failure_reason: match transfer.status {
                TransferStatus::Failed => Some("Account closed".to_string()),
                _ => None,
            },
        }
    }
}

#[async_trait]
impl TransferGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_recipient(
        &self,
        _details: &PayoutDetails,
        _currency: &str,
    ) -> GatewayResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_recipient".to_string());
        match &state.recipient_error {
            Some(err) => Err(err.clone()),
            None => Ok("RCP_1".to_string()),
        }
    }

    async fn initiate_transfer(
        &self,
        request: TransferRequest,
    ) -> GatewayResult<TransferInitiation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("initiate:{}", request.reference));

        if let Some((code, existing)) = state
            .transfers
            .iter()
            .find(|(_, t)| t.reference == request.reference)
        {
            return Ok(TransferInitiation {
                transfer_code: code.clone(),
                reference: existing.reference.clone(),
                status: existing.status,
            });
        }

        let script = state
            .initiate
            .pop_front()
            .unwrap_or(InitiateScript::Respond(TransferStatus::Otp));
        let (status, lost) = match script {
            InitiateScript::Respond(status) => (status, false),
            InitiateScript::TimeoutAfterCreating(status) => (status, true),
            InitiateScript::Fail(err) => return Err(err),
        };

        state.next_code += 1;
        let code = format!("TRF_{}", state.next_code);
        state.transfers.insert(
            code.clone(),
            MockTransfer {
                reference: request.reference.clone(),
                status,
                amount_minor: request.amount_minor,
            },
        );

        if lost {
            return Err(GatewayError::Timeout { timeout_secs: 30 });
        }
        Ok(TransferInitiation {
            transfer_code: code,
            reference: request.reference,
            status,
        })
    }

    async fn finalize_with_otp(
        &self,
        transfer_code: &str,
        otp: &str,
    ) -> GatewayResult<TransferOutcome> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("finalize:{}", transfer_code));
        if let Some(err) = state.finalize_errors.pop_front() {
            return Err(err);
        }

        let transfer = state
            .transfers
            .get_mut(transfer_code)
            .ok_or_else(|| GatewayError::TransferNotFound {
                reference: transfer_code.to_string(),
            })?;
        match transfer.status {
            TransferStatus::Otp => {}
            TransferStatus::Abandoned => {
                return Err(GatewayError::TransferNotAwaitingOtp {
                    message: "Transfer is not currently awaiting OTP".to_string(),
                })
            }
            other => {
                return Ok(TransferOutcome {
                    status: other,
                    reference: Some(transfer.reference.clone()),
                })
            }
        }
        if otp != VALID_OTP {
            return Err(GatewayError::InvalidOtp {
                message: "Invalid OTP".to_string(),
            });
        }

        transfer.status = TransferStatus::Success;
        let reference = transfer.reference.clone();
        if std::mem::take(&mut state.lose_finalize_response) {
            return Err(GatewayError::Timeout { timeout_secs: 30 });
        }
        Ok(TransferOutcome {
            status: TransferStatus::Success,
            reference: Some(reference),
        })
    }

    async fn resend_otp(&self, transfer_code: &str, _reason: ResendReason) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("resend:{}", transfer_code));
        match state.transfers.get(transfer_code).map(|t| t.status) {
            Some(TransferStatus::Otp) => Ok(()),
            Some(_) => Err(GatewayError::TransferNotAwaitingOtp {
                message: "Transfer is not currently awaiting OTP".to_string(),
            }),
            None => Err(GatewayError::TransferNotFound {
                reference: transfer_code.to_string(),
            }),
        }
    }

    async fn check_status(&self, transfer_code: &str) -> GatewayResult<TransferSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("check_status:{}", transfer_code));
        if state.status_unavailable {
            return Err(GatewayError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        state
            .transfers
            .get(transfer_code)
            .map(|t| Self::snapshot(transfer_code, t))
            .ok_or_else(|| GatewayError::TransferNotFound {
                reference: transfer_code.to_string(),
            })
    }

    async fn verify_transfer(&self, reference: &str) -> GatewayResult<TransferSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("verify:{}", reference));
        if state.status_unavailable {
            return Err(GatewayError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        state
            .transfers
            .iter()
            .find(|(_, t)| t.reference == reference)
            .map(|(code, t)| Self::snapshot(code, t))
            .ok_or_else(|| GatewayError::TransferNotFound {
                reference: reference.to_string(),
            })
    }

    fn verify_webhook(&self, _payload: &[u8], signature: &str) -> GatewayResult<()> {
        if signature == VALID_SIGNATURE {
            Ok(())
        } else {
            Err(GatewayError::WebhookVerification {
                message: "signature mismatch".to_string(),
            })
        }
    }

    fn parse_transfer_event(&self, payload: &[u8]) -> GatewayResult<Option<TransferEvent>> {
        let body: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| GatewayError::UnexpectedResponse {
                message: e.to_string(),
            })?;
        let kind = match body["event"].as_str() {
            Some("transfer.success") => TransferEventKind::Success,
            Some("transfer.failed") => TransferEventKind::Failed,
            Some("transfer.reversed") => TransferEventKind::Reversed,
            _ => return Ok(None),
        };
        Ok(Some(TransferEvent {
            kind,
            transfer_code: body["data"]["transfer_code"].as_str().map(str::to_string),
            reference: body["data"]["reference"].as_str().map(str::to_string),
            received_at: Utc::now(),
        }))
    }
}

pub struct Harness {
    pub orchestrator: Arc<PayoutOrchestrator>,
    pub store: Arc<InMemoryPayoutStore>,
    pub gateway: Arc<MockGateway>,
    pub recipient_cache: Arc<InMemoryCache<String>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let store = Arc::new(InMemoryPayoutStore::new());
        let gateway = Arc::new(MockGateway::new());
        let recipient_cache = Arc::new(InMemoryCache::<String>::new());
        let cache: Arc<dyn Cache<String>> = recipient_cache.clone();
        let orchestrator = Arc::new(PayoutOrchestrator::new(
            store.clone(),
            gateway.clone(),
            cache,
            Arc::new(LoggingNotifier::default()),
            config,
        ));
        Self {
            orchestrator,
            store,
            gateway,
            recipient_cache,
        }
    }

    pub async fn credit(&self, seller_id: &str, amount: i64, order_id: &str) {
        self.orchestrator
            .credit_earnings(seller_id, Decimal::from(amount), order_id)
            .await
            .unwrap();
    }

    pub async fn withdraw(&self, seller_id: &str, amount: i64) -> PaymentRequest {
        self.orchestrator
            .create_withdrawal(seller_id, withdrawal(amount), &actor(seller_id))
            .await
            .unwrap()
    }
}

pub fn actor(seller_id: &str) -> Actor {
    Actor::seller(seller_id, Some("203.0.113.9".to_string()))
}

pub fn bank_details() -> PayoutDetails {
    PayoutDetails::Bank {
        account_number: "2001234567".to_string(),
        bank_code: "50211".to_string(),
        account_name: "Ada Obi".to_string(),
        bank_name: Some("Kuda".to_string()),
    }
}

pub fn withdrawal(amount: i64) -> CreateWithdrawal {
    CreateWithdrawal {
        amount: Decimal::from(amount),
        payout_method: "bank".to_string(),
        payment_details: Some(bank_details()),
        save_as_default: false,
    }
}

pub fn dec(amount: i64) -> Decimal {
    Decimal::from(amount)
}
