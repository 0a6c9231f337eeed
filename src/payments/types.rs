use crate::payments::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Bank,
    MobileMoney,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::Bank => "bank",
            PayoutMethod::MobileMoney => "mobile_money",
        }
    }
}

impl std::fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayoutMethod {
    type Err = PayoutDetailsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "bank" | "bank_transfer" => Ok(PayoutMethod::Bank),
            "mobile_money" | "momo" => Ok(PayoutMethod::MobileMoney),
            other => Err(PayoutDetailsError::new(
                "payoutMethod",
                format!("unsupported payout method: {}", other),
            )),
        }
    }
}

/// Mobile money networks Paystack can pay out to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MobileMoneyNetwork {
    Mtn,
    AirtelTigo,
    Vodafone,
    Mpesa,
}

impl MobileMoneyNetwork {
    /// Value Paystack expects in `bank_code` for mobile money recipients.
    pub fn paystack_code(&self) -> &'static str {
        match self {
            MobileMoneyNetwork::Mtn => "MTN",
            MobileMoneyNetwork::AirtelTigo => "ATL",
            MobileMoneyNetwork::Vodafone => "VOD",
            MobileMoneyNetwork::Mpesa => "MPESA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct PayoutDetailsError {
    pub field: &'static str,
    pub message: String,
}

impl PayoutDetailsError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Where a payout goes. Each variant carries exactly the fields its rail needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum PayoutDetails {
    Bank {
        account_number: String,
        bank_code: String,
        account_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bank_name: Option<String>,
    },
    MobileMoney {
        phone_number: String,
        network: MobileMoneyNetwork,
        account_name: String,
    },
}

fn account_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{10}$").expect("account number pattern"))
}

fn bank_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{3,6}$").expect("bank code pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?\d{10,15}$").expect("phone pattern"))
}

const MAX_ACCOUNT_NAME_LEN: usize = 100;

impl PayoutDetails {
    pub fn method(&self) -> PayoutMethod {
        match self {
            PayoutDetails::Bank { .. } => PayoutMethod::Bank,
            PayoutDetails::MobileMoney { .. } => PayoutMethod::MobileMoney,
        }
    }

    pub fn account_name(&self) -> &str {
        match self {
            PayoutDetails::Bank { account_name, .. }
            | PayoutDetails::MobileMoney { account_name, .. } => account_name,
        }
    }

    /// Trim and validate every field, returning the normalized details.
    pub fn validated(self) -> Result<Self, PayoutDetailsError> {
        match self {
            PayoutDetails::Bank {
                account_number,
                bank_code,
                account_name,
                bank_name,
            } => {
                let account_number = account_number.trim().to_string();
                let bank_code = bank_code.trim().to_string();
                let account_name = validate_account_name(&account_name)?;

                if !account_number_pattern().is_match(&account_number) {
                    return Err(PayoutDetailsError::new(
                        "accountNumber",
                        "account number must be exactly 10 digits",
                    ));
                }
                if !bank_code_pattern().is_match(&bank_code) {
                    return Err(PayoutDetailsError::new(
                        "bankCode",
                        "bank code must be 3 to 6 digits",
                    ));
                }
                // CBN-coded commercial banks carry a NUBAN check digit.
                if bank_code.len() == 3 && nuban::Nuban::new(&bank_code, &account_number).is_err()
                {
                    return Err(PayoutDetailsError::new(
                        "accountNumber",
                        "account number failed NUBAN validation for this bank",
                    ));
                }

                Ok(PayoutDetails::Bank {
                    account_number,
                    bank_code,
                    account_name,
                    bank_name: bank_name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty()),
                })
            }
            PayoutDetails::MobileMoney {
                phone_number,
                network,
                account_name,
            } => {
                let phone_number: String = phone_number
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '-')
                    .collect();
                let account_name = validate_account_name(&account_name)?;
                if !phone_pattern().is_match(&phone_number) {
                    return Err(PayoutDetailsError::new(
                        "phoneNumber",
                        "phone number must contain 10 to 15 digits",
                    ));
                }
                Ok(PayoutDetails::MobileMoney {
                    phone_number,
                    network,
                    account_name,
                })
            }
        }
    }

    /// Stable identifier for the destination, used to cache recipient codes.
    pub fn fingerprint(&self) -> String {
        let raw = match self {
            PayoutDetails::Bank {
                account_number,
                bank_code,
                ..
            } => format!("bank:{}:{}", bank_code, account_number),
            PayoutDetails::MobileMoney {
                phone_number,
                network,
                ..
            } => format!("mobile_money:{}:{}", network.paystack_code(), phone_number),
        };
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    /// Destination with everything but the last four digits hidden.
    pub fn masked_destination(&self) -> String {
        match self {
            PayoutDetails::Bank { account_number, .. } => mask_digits(account_number),
            PayoutDetails::MobileMoney { phone_number, .. } => mask_digits(phone_number),
        }
    }
}

fn validate_account_name(name: &str) -> Result<String, PayoutDetailsError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PayoutDetailsError::new(
            "accountName",
            "account name is required",
        ));
    }
    if name.chars().count() > MAX_ACCOUNT_NAME_LEN {
        return Err(PayoutDetailsError::new(
            "accountName",
            format!("account name must be at most {} characters", MAX_ACCOUNT_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

pub fn mask_digits(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Transfer status as reported by the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Otp,
    Pending,
    Success,
    Failed,
    Abandoned,
    Reversed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Otp => "otp",
            TransferStatus::Pending => "pending",
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
            TransferStatus::Abandoned => "abandoned",
            TransferStatus::Reversed => "reversed",
        }
    }

    /// Map a raw gateway status. Unknown values are an error, never a state.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "otp" => Ok(TransferStatus::Otp),
            "pending" | "received" | "queued" => Ok(TransferStatus::Pending),
            "success" => Ok(TransferStatus::Success),
            "failed" | "blocked" | "rejected" => Ok(TransferStatus::Failed),
            "abandoned" => Ok(TransferStatus::Abandoned),
            "reversed" => Ok(TransferStatus::Reversed),
            other => Err(GatewayError::UnexpectedResponse {
                message: format!("unrecognised transfer status '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason passed along with an OTP resend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResendReason {
    #[default]
    ResendOtp,
    Transfer,
}

impl ResendReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResendReason::ResendOtp => "resend_otp",
            ResendReason::Transfer => "transfer",
        }
    }
}

impl FromStr for ResendReason {
    type Err = PayoutDetailsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "resend_otp" => Ok(ResendReason::ResendOtp),
            "transfer" => Ok(ResendReason::Transfer),
            other => Err(PayoutDetailsError::new(
                "reason",
                format!("reason must be resend_otp or transfer, got {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Amount in the currency's minor unit.
    pub amount_minor: i64,
    pub currency: String,
    pub recipient_code: String,
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInitiation {
    pub transfer_code: String,
    pub reference: String,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub status: TransferStatus,
    pub reference: Option<String>,
}

/// Point-in-time view of a transfer, from a status or reference lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub transfer_code: String,
    pub reference: String,
    pub status: TransferStatus,
    pub amount_minor: Option<i64>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferEventKind {
    Success,
    Failed,
    Reversed,
}

impl TransferEventKind {
    pub fn status(&self) -> TransferStatus {
        match self {
            TransferEventKind::Success => TransferStatus::Success,
            TransferEventKind::Failed => TransferStatus::Failed,
            TransferEventKind::Reversed => TransferStatus::Reversed,
        }
    }
}

/// A verified transfer webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub kind: TransferEventKind,
    pub transfer_code: Option<String>,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Convert a major-unit amount to the gateway's minor unit (kobo, pesewas).
pub fn to_minor_units(amount: Decimal) -> GatewayResult<i64> {
    let minor = (amount * Decimal::ONE_HUNDRED).round();
    if minor <= Decimal::ZERO {
        return Err(GatewayError::Rejected {
            message: format!("transfer amount must be positive, got {}", amount),
            provider_code: None,
        });
    }
    minor.to_i64().ok_or_else(|| GatewayError::Rejected {
        message: format!("transfer amount {} is out of range", amount),
        provider_code: None,
    })
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(account_number: &str, bank_code: &str) -> PayoutDetails {
        PayoutDetails::Bank {
            account_number: account_number.to_string(),
            bank_code: bank_code.to_string(),
            account_name: "Ada Obi".to_string(),
            bank_name: None,
        }
    }

    #[test]
    fn minor_unit_conversion_multiplies_by_hundred() {
        assert_eq!(to_minor_units(Decimal::new(20050, 2)).unwrap(), 20050);
        assert_eq!(to_minor_units(Decimal::from(200)).unwrap(), 20000);
        assert_eq!(from_minor_units(20050), Decimal::new(20050, 2));
        assert!(to_minor_units(Decimal::ZERO).is_err());
    }

    #[test]
    fn bank_details_require_ten_digits() {
        let err = bank("12345", "50211").validated().unwrap_err();
        assert_eq!(err.field, "accountNumber");

        let err = bank("12345abcde", "50211").validated().unwrap_err();
        assert_eq!(err.field, "accountNumber");
    }

    #[test]
    fn bank_code_must_be_numeric() {
        let err = bank("0123456789", "ABC").validated().unwrap_err();
        assert_eq!(err.field, "bankCode");
    }

    #[test]
    fn three_digit_bank_codes_are_nuban_checked() {
        // 0123456785 is the valid check digit for bank 058; 9 is not.
        let err = bank("0123456789", "058").validated().unwrap_err();
        assert_eq!(err.field, "accountNumber");
    }

    #[test]
    fn fintech_bank_codes_skip_nuban_and_trim_fields() {
        let details = PayoutDetails::Bank {
            account_number: " 2001234567 ".to_string(),
            bank_code: "50211".to_string(),
            account_name: "  Ada Obi ".to_string(),
            bank_name: Some("  ".to_string()),
        }
        .validated()
        .unwrap();

        assert_eq!(
            details,
            PayoutDetails::Bank {
                account_number: "2001234567".to_string(),
                bank_code: "50211".to_string(),
                account_name: "Ada Obi".to_string(),
                bank_name: None,
            }
        );
    }

    #[test]
    fn mobile_money_phone_is_normalized() {
        let details = PayoutDetails::MobileMoney {
            phone_number: "+233 24-123 4567".to_string(),
            network: MobileMoneyNetwork::Mtn,
            account_name: "Kofi".to_string(),
        }
        .validated()
        .unwrap();

        match details {
            PayoutDetails::MobileMoney { phone_number, .. } => {
                assert_eq!(phone_number, "+233241234567")
            }
            _ => panic!("expected mobile money"),
        }
    }

    #[test]
    fn payout_details_use_tagged_camel_case_json() {
        let json = serde_json::json!({
            "type": "bank",
            "accountNumber": "2001234567",
            "bankCode": "50211",
            "accountName": "Ada Obi"
        });
        let details: PayoutDetails = serde_json::from_value(json).unwrap();
        assert_eq!(details.method(), PayoutMethod::Bank);

        let momo = serde_json::json!({
            "type": "mobile_money",
            "phoneNumber": "0241234567",
            "network": "airtel_tigo",
            "accountName": "Kofi"
        });
        let details: PayoutDetails = serde_json::from_value(momo).unwrap();
        assert_eq!(details.method(), PayoutMethod::MobileMoney);
    }

    #[test]
    fn fingerprint_ignores_account_name() {
        let a = bank("2001234567", "50211");
        let b = PayoutDetails::Bank {
            account_number: "2001234567".to_string(),
            bank_code: "50211".to_string(),
            account_name: "Someone Else".to_string(),
            bank_name: None,
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), bank("2001234568", "50211").fingerprint());
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(mask_digits("0123456789"), "******6789");
        assert_eq!(mask_digits("123"), "***");
    }

    #[test]
    fn transfer_status_mapping_is_closed() {
        assert_eq!(TransferStatus::parse("otp").unwrap(), TransferStatus::Otp);
        assert_eq!(
            TransferStatus::parse("received").unwrap(),
            TransferStatus::Pending
        );
        assert_eq!(
            TransferStatus::parse("ABANDONED").unwrap(),
            TransferStatus::Abandoned
        );
        assert!(matches!(
            TransferStatus::parse("mystery"),
            Err(GatewayError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn resend_reason_defaults_to_resend_otp() {
        assert_eq!("".parse::<ResendReason>().unwrap(), ResendReason::ResendOtp);
        assert_eq!(
            "transfer".parse::<ResendReason>().unwrap(),
            ResendReason::Transfer
        );
        assert!("other".parse::<ResendReason>().is_err());
    }
}
