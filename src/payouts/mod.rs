//! Payout request model and the storage seam used by the orchestrator.

pub mod memory;
pub mod store;

use crate::ledger::LedgerOperation;
use crate::payments::types::{PayoutDetails, PayoutMethod};
use crate::services::revenue_history::RevenueEntryType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

pub use memory::InMemoryPayoutStore;
pub use store::{
    Committed, MutationOutcome, Page, PayoutStore, PayoutStoreError, RequestFilter, StoreResult,
};

pub const METADATA_PREVIOUS_TRANSFER_CODES: &str = "previousTransferCodes";
pub const METADATA_HISTORY_GAPS: &str = "historyGaps";
pub const METADATA_RECONCILIATION_REQUIRED: &str = "reconciliationRequired";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    AwaitingPaystackOtp,
    Processing,
    OtpExpired,
    Paid,
    Approved,
    Failed,
    Rejected,
    Cancelled,
}

impl PaymentRequestStatus {
    /// Statuses that hold reserved funds and count against the one-active rule.
    pub const ACTIVE: [PaymentRequestStatus; 3] = [
        PaymentRequestStatus::Pending,
        PaymentRequestStatus::AwaitingPaystackOtp,
        PaymentRequestStatus::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Pending => "pending",
            PaymentRequestStatus::AwaitingPaystackOtp => "awaiting_paystack_otp",
            PaymentRequestStatus::Processing => "processing",
            PaymentRequestStatus::OtpExpired => "otp_expired",
            PaymentRequestStatus::Paid => "paid",
            PaymentRequestStatus::Approved => "approved",
            PaymentRequestStatus::Failed => "failed",
            PaymentRequestStatus::Rejected => "rejected",
            PaymentRequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn holds_reservation(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentRequestStatus::Paid | PaymentRequestStatus::Approved
        )
    }
}

impl std::fmt::Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentRequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentRequestStatus::Pending),
            "awaiting_paystack_otp" => Ok(PaymentRequestStatus::AwaitingPaystackOtp),
            "processing" => Ok(PaymentRequestStatus::Processing),
            "otp_expired" => Ok(PaymentRequestStatus::OtpExpired),
            "paid" => Ok(PaymentRequestStatus::Paid),
            "approved" => Ok(PaymentRequestStatus::Approved),
            "failed" => Ok(PaymentRequestStatus::Failed),
            "rejected" => Ok(PaymentRequestStatus::Rejected),
            "cancelled" => Ok(PaymentRequestStatus::Cancelled),
            other => Err(format!("unknown payment request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Seller,
    Admin,
    System,
    Gateway,
}

/// Who triggered a transition. Recorded in the request's audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn seller(seller_id: impl Into<String>, ip_address: Option<String>) -> Self {
        Self {
            id: seller_id.into(),
            role: ActorRole::Seller,
            ip_address,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "payout-reconciler".to_string(),
            role: ActorRole::System,
            ip_address: None,
        }
    }

    pub fn gateway(name: &str) -> Self {
        Self {
            id: name.to_string(),
            role: ActorRole::Gateway,
            ip_address: None,
        }
    }

    pub fn entry(&self, action: &str, note: Option<String>) -> AuditEntry {
        AuditEntry {
            action: action.to_string(),
            actor_id: self.id.clone(),
            actor_role: self.role,
            ip_address: self.ip_address.clone(),
            at: Utc::now(),
            note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub actor_id: String,
    pub actor_role: ActorRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A seller's withdrawal and the durable state of its transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: Uuid,
    pub seller_id: String,
    pub amount: Decimal,
    pub amount_requested: Decimal,
    pub withholding_tax: Decimal,
    pub amount_paid_to_seller: Decimal,
    pub currency: String,
    pub status: PaymentRequestStatus,
    pub payment_method: PayoutMethod,
    pub payment_details: PayoutDetails,
    pub paystack_recipient_code: Option<String>,
    pub paystack_transfer_code: Option<String>,
    pub transfer_reference: Option<String>,
    pub transfer_attempts: i32,
    pub is_active: bool,
    pub reversed: bool,
    pub reverse_reason: Option<String>,
    pub reversal_requested: bool,
    pub failure_reason: Option<String>,
    pub audit_history: Vec<AuditEntry>,
    pub metadata: JsonValue,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn new(
        seller_id: &str,
        amount: Decimal,
        withholding_tax: Decimal,
        currency: &str,
        details: PayoutDetails,
        actor: &Actor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id: seller_id.to_string(),
            amount,
            amount_requested: amount,
            withholding_tax,
            amount_paid_to_seller: amount - withholding_tax,
            currency: currency.to_string(),
            status: PaymentRequestStatus::Pending,
            payment_method: details.method(),
            payment_details: details,
            paystack_recipient_code: None,
            paystack_transfer_code: None,
            transfer_reference: None,
            transfer_attempts: 0,
            is_active: true,
            reversed: false,
            reverse_reason: None,
            reversal_requested: false,
            failure_reason: None,
            audit_history: vec![actor.entry("created", None)],
            metadata: serde_json::json!({}),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active && self.status.holds_reservation()
    }

    /// Gateway reference for the next transfer attempt. Deterministic so a
    /// retried initiate is deduplicated by the gateway.
    pub fn next_transfer_reference(&self) -> String {
        transfer_reference(self.id, self.transfer_attempts + 1)
    }

    /// Reference of an initiate that was sent but never answered: the request
    /// is still `pending` without a code, yet the next attempt's reference is
    /// already recorded.
    pub fn unresolved_attempt(&self) -> Option<String> {
        if self.status != PaymentRequestStatus::Pending || self.paystack_transfer_code.is_some() {
            return None;
        }
        let reference = self.next_transfer_reference();
        (self.transfer_reference.as_deref() == Some(reference.as_str())).then_some(reference)
    }

    pub fn previous_transfer_codes(&self) -> Vec<String> {
        metadata_strings(&self.metadata, METADATA_PREVIOUS_TRANSFER_CODES)
    }

    pub fn history_gaps(&self) -> Vec<String> {
        metadata_strings(&self.metadata, METADATA_HISTORY_GAPS)
    }

    pub fn reconciliation_required(&self) -> bool {
        self.metadata
            .get(METADATA_RECONCILIATION_REQUIRED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Record a missing history entry so a sweep can backfill it.
    pub fn note_history_gap(&mut self, reference: &str) {
        push_metadata(
            &mut self.metadata,
            METADATA_HISTORY_GAPS,
            JsonValue::String(reference.to_string()),
        );
    }
}

pub fn transfer_reference(request_id: Uuid, attempt: i32) -> String {
    format!("wd-{}-{}", request_id.simple(), attempt)
}

fn metadata_strings(metadata: &JsonValue, key: &str) -> Vec<String> {
    metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn push_metadata(metadata: &mut JsonValue, key: &str, value: JsonValue) {
    if !metadata.is_object() {
        *metadata = serde_json::json!({});
    }
    if let Some(object) = metadata.as_object_mut() {
        let slot = object
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        match slot.as_array_mut() {
            Some(items) => items.push(value),
            None => *slot = JsonValue::Array(vec![value]),
        }
    }
}

fn set_metadata(metadata: &mut JsonValue, key: &str, value: JsonValue) {
    if !metadata.is_object() {
        *metadata = serde_json::json!({});
    }
    if let Some(object) = metadata.as_object_mut() {
        object.insert(key.to_string(), value);
    }
}

/// Field changes applied by a status transition. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestUpdate {
    pub status: Option<PaymentRequestStatus>,
    pub recipient_code: Option<String>,
    /// `Some(None)` clears the code.
    pub transfer_code: Option<Option<String>>,
    pub transfer_reference: Option<String>,
    pub increment_attempts: bool,
    pub failure_reason: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub reversed: Option<bool>,
    pub reverse_reason: Option<String>,
    pub reversal_requested: Option<bool>,
    pub paid_at: Option<DateTime<Utc>>,
    pub audit: Vec<AuditEntry>,
    pub metadata_push: Vec<(String, JsonValue)>,
    pub metadata_set: Vec<(String, JsonValue)>,
}

impl RequestUpdate {
    pub fn to_status(status: PaymentRequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_audit(mut self, entry: AuditEntry) -> Self {
        self.audit.push(entry);
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(Some(reason.into()));
        self
    }

    pub fn clearing_transfer_code(mut self) -> Self {
        self.transfer_code = Some(None);
        self
    }

    pub fn push_metadata(mut self, key: &str, value: JsonValue) -> Self {
        self.metadata_push.push((key.to_string(), value));
        self
    }

    pub fn set_metadata(mut self, key: &str, value: JsonValue) -> Self {
        self.metadata_set.push((key.to_string(), value));
        self
    }

    pub fn apply_to(&self, request: &mut PaymentRequest, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(code) = &self.recipient_code {
            request.paystack_recipient_code = Some(code.clone());
        }
        if let Some(code) = &self.transfer_code {
            request.paystack_transfer_code = code.clone();
        }
        if let Some(reference) = &self.transfer_reference {
            request.transfer_reference = Some(reference.clone());
        }
        if self.increment_attempts {
            request.transfer_attempts += 1;
        }
        if let Some(reason) = &self.failure_reason {
            request.failure_reason = reason.clone();
        }
        if let Some(active) = self.is_active {
            request.is_active = active;
        }
        if let Some(reversed) = self.reversed {
            request.reversed = reversed;
        }
        if let Some(reason) = &self.reverse_reason {
            request.reverse_reason = Some(reason.clone());
        }
        if let Some(flag) = self.reversal_requested {
            request.reversal_requested = flag;
        }
        if let Some(paid_at) = self.paid_at {
            request.paid_at = Some(paid_at);
        }
        request.audit_history.extend(self.audit.iter().cloned());
        for (key, value) in &self.metadata_push {
            push_metadata(&mut request.metadata, key, value.clone());
        }
        for (key, value) in &self.metadata_set {
            set_metadata(&mut request.metadata, key, value.clone());
        }
        request.updated_at = now;
    }
}

/// One balance operation plus the history entry that describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerMutation {
    pub seller_id: String,
    pub operation: LedgerOperation,
    pub entry_type: RevenueEntryType,
    pub reference: String,
    pub metadata: JsonValue,
}

impl LedgerMutation {
    pub fn new(
        seller_id: &str,
        operation: LedgerOperation,
        entry_type: RevenueEntryType,
        reference: String,
    ) -> Self {
        Self {
            seller_id: seller_id.to_string(),
            operation,
            entry_type,
            reference,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest::new(
            "seller-1",
            Decimal::from(200),
            Decimal::ZERO,
            "NGN",
            PayoutDetails::Bank {
                account_number: "2001234567".to_string(),
                bank_code: "50211".to_string(),
                account_name: "Ada Obi".to_string(),
                bank_name: None,
            },
            &Actor::seller("seller-1", None),
        )
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PaymentRequestStatus::AwaitingPaystackOtp,
            PaymentRequestStatus::OtpExpired,
            PaymentRequestStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<PaymentRequestStatus>(), Ok(status));
        }
        assert!("unknown".parse::<PaymentRequestStatus>().is_err());
    }

    #[test]
    fn soft_deleted_request_is_not_active() {
        let mut req = request();
        assert!(req.is_active());
        req.is_active = false;
        assert!(!req.is_active());

        let mut req = request();
        req.status = PaymentRequestStatus::OtpExpired;
        assert!(!req.is_active());
    }

    #[test]
    fn transfer_reference_is_per_attempt() {
        let mut req = request();
        let first = req.next_transfer_reference();
        assert!(first.starts_with("wd-"));
        assert!(first.ends_with("-1"));
        assert_eq!(first, req.next_transfer_reference());

        req.transfer_attempts = 1;
        assert!(req.next_transfer_reference().ends_with("-2"));
    }

    #[test]
    fn unresolved_attempt_tracks_the_next_reference() {
        let mut req = request();
        assert_eq!(req.unresolved_attempt(), None);

        req.transfer_reference = Some(req.next_transfer_reference());
        assert_eq!(req.unresolved_attempt(), req.transfer_reference.clone());

        // Once the attempt is recorded the reference belongs to the past.
        req.transfer_attempts = 1;
        req.paystack_transfer_code = Some("TRF_1".to_string());
        assert_eq!(req.unresolved_attempt(), None);
        req.paystack_transfer_code = None;
        assert_eq!(req.unresolved_attempt(), None);
    }

    #[test]
    fn update_clears_code_and_appends_metadata() {
        let mut req = request();
        req.paystack_transfer_code = Some("TRF_1".to_string());

        RequestUpdate::to_status(PaymentRequestStatus::OtpExpired)
            .clearing_transfer_code()
            .push_metadata(
                METADATA_PREVIOUS_TRANSFER_CODES,
                JsonValue::String("TRF_1".to_string()),
            )
            .apply_to(&mut req, Utc::now());

        assert_eq!(req.status, PaymentRequestStatus::OtpExpired);
        assert_eq!(req.paystack_transfer_code, None);
        assert_eq!(req.previous_transfer_codes(), vec!["TRF_1".to_string()]);
    }

    #[test]
    fn history_gaps_accumulate() {
        let mut req = request();
        req.note_history_gap("WITHDRAWAL-x-CREATED");
        req.note_history_gap("WITHDRAWAL-x-PAYOUT");
        assert_eq!(req.history_gaps().len(), 2);
    }
}
