//! Revenue history recorder
//! Builds the audit entry that accompanies every ledger mutation and owns the
//! reference formats used to detect duplicates.

use crate::ledger::SellerBalance;
use crate::payouts::LedgerMutation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueEntryType {
    OrderRevenue,
    WithdrawalCreated,
    Payout,
    WithdrawalFailed,
    OtpExpired,
    WithdrawalRefunded,
    BalanceLocked,
    BalanceUnlocked,
}

impl RevenueEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueEntryType::OrderRevenue => "ORDER_REVENUE",
            RevenueEntryType::WithdrawalCreated => "WITHDRAWAL_CREATED",
            RevenueEntryType::Payout => "PAYOUT",
            RevenueEntryType::WithdrawalFailed => "WITHDRAWAL_FAILED",
            RevenueEntryType::OtpExpired => "OTP_EXPIRED",
            RevenueEntryType::WithdrawalRefunded => "WITHDRAWAL_REFUNDED",
            RevenueEntryType::BalanceLocked => "BALANCE_LOCKED",
            RevenueEntryType::BalanceUnlocked => "BALANCE_UNLOCKED",
        }
    }
}

impl FromStr for RevenueEntryType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ORDER_REVENUE" => Ok(RevenueEntryType::OrderRevenue),
            "WITHDRAWAL_CREATED" => Ok(RevenueEntryType::WithdrawalCreated),
            "PAYOUT" => Ok(RevenueEntryType::Payout),
            "WITHDRAWAL_FAILED" => Ok(RevenueEntryType::WithdrawalFailed),
            "OTP_EXPIRED" => Ok(RevenueEntryType::OtpExpired),
            "WITHDRAWAL_REFUNDED" => Ok(RevenueEntryType::WithdrawalRefunded),
            "BALANCE_LOCKED" => Ok(RevenueEntryType::BalanceLocked),
            "BALANCE_UNLOCKED" => Ok(RevenueEntryType::BalanceUnlocked),
            other => Err(format!("unknown revenue entry type: {}", other)),
        }
    }
}

/// Immutable audit record of one balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevenueHistoryEntry {
    pub id: Uuid,
    pub seller_id: String,
    #[serde(rename = "type")]
    pub entry_type: RevenueEntryType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference: String,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// History references. Withdrawal steps share the `WITHDRAWAL-<id>-` prefix.
pub mod references {
    use uuid::Uuid;

    pub fn created(request_id: Uuid) -> String {
        format!("WITHDRAWAL-{}-CREATED", request_id)
    }

    pub fn payout(request_id: Uuid) -> String {
        format!("WITHDRAWAL-{}-PAYOUT", request_id)
    }

    pub fn failed(request_id: Uuid) -> String {
        format!("WITHDRAWAL-{}-FAILED", request_id)
    }

    pub fn refunded(request_id: Uuid) -> String {
        format!("WITHDRAWAL-{}-REFUNDED", request_id)
    }

    pub fn reserved(request_id: Uuid, attempt: i32) -> String {
        format!("WITHDRAWAL-{}-RESERVED-{}", request_id, attempt)
    }

    pub fn otp_expired(request_id: Uuid, attempt: i32) -> String {
        format!("WITHDRAWAL-{}-OTP_EXPIRED-{}", request_id, attempt)
    }

    pub fn order_revenue(order_id: &str) -> String {
        format!("ORDER-{}-REVENUE", order_id)
    }
}

pub struct RevenueHistoryRecorder;

impl RevenueHistoryRecorder {
    /// Build the entry for a mutation that moved `before` to `after`.
    pub fn entry_for(
        mutation: &LedgerMutation,
        before: &SellerBalance,
        after: &SellerBalance,
        now: DateTime<Utc>,
    ) -> RevenueHistoryEntry {
        let mut metadata = match &mutation.metadata {
            JsonValue::Object(map) => map.clone(),
            JsonValue::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other.clone());
                map
            }
        };
        metadata.insert(
            "operation".to_string(),
            JsonValue::String(mutation.operation.name().to_string()),
        );
        metadata.insert("before".to_string(), snapshot(before));
        metadata.insert("after".to_string(), snapshot(after));

        RevenueHistoryEntry {
            id: Uuid::new_v4(),
            seller_id: mutation.seller_id.clone(),
            entry_type: mutation.entry_type,
            amount: mutation.operation.amount(),
            balance_before: before.balance,
            balance_after: after.balance,
            reference: mutation.reference.clone(),
            metadata: JsonValue::Object(metadata),
            created_at: now,
        }
    }

    /// Log a history write that was rolled back while the ledger committed.
    pub fn report_gap(entry: &RevenueHistoryEntry, cause: &str) {
        error!(
            seller_id = %entry.seller_id,
            reference = %entry.reference,
            entry_type = entry.entry_type.as_str(),
            amount = %entry.amount,
            reconciliation_required = true,
            error = %cause,
            "revenue history write failed; ledger mutation kept"
        );
    }
}

fn snapshot(balance: &SellerBalance) -> JsonValue {
    serde_json::to_value(balance).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerOperation;

    #[test]
    fn entry_carries_balance_field_and_full_snapshots() {
        let before = SellerBalance::empty().credit(Decimal::from(500)).unwrap();
        let after = before.reserve(Decimal::from(200)).unwrap();
        let request_id = Uuid::new_v4();
        let mutation = LedgerMutation::new(
            "seller-1",
            LedgerOperation::Reserve(Decimal::from(200)),
            RevenueEntryType::WithdrawalCreated,
            references::created(request_id),
        )
        .with_metadata(serde_json::json!({ "requestId": request_id }));

        let entry = RevenueHistoryRecorder::entry_for(&mutation, &before, &after, Utc::now());

        assert_eq!(entry.balance_before, Decimal::from(500));
        assert_eq!(entry.balance_after, Decimal::from(500));
        assert_eq!(entry.amount, Decimal::from(200));
        let pending: Decimal = entry.metadata["after"]["pendingBalance"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(pending, Decimal::from(200));
        assert_eq!(entry.metadata["operation"], "reserve");
        assert!(entry.metadata.get("requestId").is_some());
    }

    #[test]
    fn references_follow_withdrawal_prefix() {
        let id = Uuid::nil();
        let prefix = format!("WITHDRAWAL-{}-", id);
        for reference in [
            references::created(id),
            references::payout(id),
            references::failed(id),
            references::refunded(id),
            references::reserved(id, 2),
            references::otp_expired(id, 1),
        ] {
            assert!(reference.starts_with(&prefix), "{}", reference);
        }
        assert_eq!(references::order_revenue("77"), "ORDER-77-REVENUE");
    }

    #[test]
    fn entry_type_serializes_screaming() {
        assert_eq!(
            serde_json::to_value(RevenueEntryType::OtpExpired).unwrap(),
            "OTP_EXPIRED"
        );
        assert_eq!(
            "BALANCE_LOCKED".parse::<RevenueEntryType>(),
            Ok(RevenueEntryType::BalanceLocked)
        );
    }
}
