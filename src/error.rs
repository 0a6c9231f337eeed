//! Error handling for the payout service
//!
//! Every layer has its own thiserror enum. At the HTTP edge they are folded
//! into [`AppError`], which carries the status code, a machine-readable
//! [`ErrorCode`], a user-facing message and a retry hint.

use crate::database::error::DatabaseError;
use crate::payouts::PaymentRequestStatus;
use crate::services::payout_orchestrator::PayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Domain errors (4xx)
    InsufficientBalance,
    ActiveRequestExists,
    InvalidStatusTransition,
    InvalidOtp,
    InvalidAccountDetails,
    ReversalNotAllowed,
    RequestNotFound,
    AlreadySettled,
    OtpNotAccepted,
    OtpExpired,
    TransferFailed,

    // Infrastructure errors (5xx)
    DatabaseError,
    CacheError,
    ConfigurationError,
    ConsistencyError,

    // External errors (503, 504)
    PaymentProviderError,
    ExternalServiceTimeout,

    // Generic
    Unauthorized,
    InternalError,
    ValidationError,
}

/// Payout business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    InsufficientBalance { available: String, required: String },
    ActiveRequestExists,
    RequestNotFound { request_id: String },
    InvalidStatusTransition {
        status: PaymentRequestStatus,
        action: String,
    },
    AlreadySettled { status: PaymentRequestStatus },
    /// Wrong OTP; the same transfer can be retried
    InvalidOtp { message: String },
    /// Gateway kept the transfer waiting for an OTP
    OtpNotAccepted,
    /// The transfer is dead; a resend starts a new one
    OtpExpired,
    InvalidAccountDetails { message: String },
    TransferFailed { reason: String },
    ReversalNotAllowed { message: String },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    Configuration { message: String },
    /// Stored state broke a ledger invariant
    Consistency { message: String },
}

/// Transfer gateway errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    MissingField { field: String },
    /// Missing identity header or bad webhook signature
    Unauthorized { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::Unauthorized {
            reason: reason.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => 400,
                DomainError::ActiveRequestExists => 400,
                DomainError::InvalidStatusTransition { .. } => 400,
                DomainError::InvalidOtp { .. } => 400,
                DomainError::InvalidAccountDetails { .. } => 400,
                DomainError::ReversalNotAllowed { .. } => 403,
                DomainError::RequestNotFound { .. } => 404,
                DomainError::AlreadySettled { .. } => 409,
                DomainError::OtpNotAccepted => 409,
                DomainError::OtpExpired => 410, // Gone
                DomainError::TransferFailed { .. } => 422,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 503,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { .. } => 400,
                ValidationError::MissingField { .. } => 400,
                ValidationError::Unauthorized { .. } => 401,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
                DomainError::ActiveRequestExists => ErrorCode::ActiveRequestExists,
                DomainError::RequestNotFound { .. } => ErrorCode::RequestNotFound,
                DomainError::InvalidStatusTransition { .. } => ErrorCode::InvalidStatusTransition,
                DomainError::AlreadySettled { .. } => ErrorCode::AlreadySettled,
                DomainError::InvalidOtp { .. } => ErrorCode::InvalidOtp,
                DomainError::OtpNotAccepted => ErrorCode::OtpNotAccepted,
                DomainError::OtpExpired => ErrorCode::OtpExpired,
                DomainError::InvalidAccountDetails { .. } => ErrorCode::InvalidAccountDetails,
                DomainError::TransferFailed { .. } => ErrorCode::TransferFailed,
                DomainError::ReversalNotAllowed { .. } => ErrorCode::ReversalNotAllowed,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Consistency { .. } => ErrorCode::ConsistencyError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(ValidationError::Unauthorized { .. }) => {
                ErrorCode::Unauthorized
            }
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance {
                    available,
                    required,
                } => format!(
                    "Insufficient withdrawable balance. Available: {}, Requested: {}",
                    available, required
                ),
                DomainError::ActiveRequestExists => {
                    "You already have an active withdrawal request".to_string()
                }
                DomainError::RequestNotFound { request_id } => {
                    format!("Withdrawal request '{}' not found", request_id)
                }
                DomainError::InvalidStatusTransition { status, action } => {
                    format!("Cannot {} a withdrawal request that is {}", action, status)
                }
                DomainError::AlreadySettled { status } => {
                    format!("Withdrawal request is already {}", status)
                }
                DomainError::InvalidOtp { .. } => {
                    "Invalid OTP. Please check the code and try again".to_string()
                }
                DomainError::OtpNotAccepted => {
                    "OTP was not accepted. Please try again".to_string()
                }
                DomainError::OtpExpired => {
                    "OTP expired. Click resend to receive a new OTP".to_string()
                }
                DomainError::InvalidAccountDetails { message } => {
                    format!("Payout account details were rejected: {}", message)
                }
                DomainError::TransferFailed { reason } => {
                    format!("Transfer failed: {}. Your funds have been returned", reason)
                }
                DomainError::ReversalNotAllowed { message } => {
                    format!("Reversal not allowed: {}", message)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { provider, .. } => format!(
                    "Payment provider ({}) is temporarily unavailable. Please try again",
                    provider
                ),
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => format!(
                    "{} request timed out after {} seconds. Please try again",
                    service, timeout_secs
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid {}: {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::Unauthorized { reason } => reason.clone(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => matches!(
                err,
                DomainError::InvalidOtp { .. } | DomainError::OtpNotAccepted
            ),
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Consistency { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Structured details for the response body, when the error has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Validation(ValidationError::InvalidField { field, reason }) => {
                Some(serde_json::json!({ "field": field, "error": reason }))
            }
            AppErrorKind::Domain(DomainError::InsufficientBalance {
                available,
                required,
            }) => Some(serde_json::json!({ "available": available, "requested": required })),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from layer-specific error types

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        let kind = match err {
            PayoutError::Validation { field, message } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field,
                    reason: message,
                })
            }
            PayoutError::InsufficientBalance {
                available,
                requested,
            } => AppErrorKind::Domain(DomainError::InsufficientBalance {
                available: available.to_string(),
                required: requested.to_string(),
            }),
            PayoutError::ActiveRequestExists => {
                AppErrorKind::Domain(DomainError::ActiveRequestExists)
            }
            PayoutError::NotFound(id) => AppErrorKind::Domain(DomainError::RequestNotFound {
                request_id: id.to_string(),
            }),
            PayoutError::InvalidStatus { status, action } => {
                AppErrorKind::Domain(DomainError::InvalidStatusTransition {
                    status,
                    action: action.to_string(),
                })
            }
            PayoutError::AlreadySettled { status } => {
                AppErrorKind::Domain(DomainError::AlreadySettled { status })
            }
            PayoutError::InvalidOtp { message } => {
                AppErrorKind::Domain(DomainError::InvalidOtp { message })
            }
            PayoutError::OtpNotAccepted => AppErrorKind::Domain(DomainError::OtpNotAccepted),
            PayoutError::OtpExpired => AppErrorKind::Domain(DomainError::OtpExpired),
            PayoutError::InvalidAccountDetails { message } => {
                AppErrorKind::Domain(DomainError::InvalidAccountDetails { message })
            }
            PayoutError::TransferFailed { reason } => {
                AppErrorKind::Domain(DomainError::TransferFailed { reason })
            }
            PayoutError::ReversalNotAllowed { message } => {
                AppErrorKind::Domain(DomainError::ReversalNotAllowed { message })
            }
            PayoutError::GatewayUnavailable { message } => {
                AppErrorKind::External(ExternalError::PaymentProvider {
                    provider: "paystack".to_string(),
                    message,
                    is_retryable: true,
                })
            }
            PayoutError::GatewayTimeout { timeout_secs } => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "Paystack".to_string(),
                    timeout_secs,
                })
            }
            PayoutError::Store { message, retryable } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: retryable,
                })
            }
            PayoutError::Consistency(message) => {
                AppErrorKind::Infrastructure(InfrastructureError::Consistency { message })
            }
        };

        AppError::new(kind)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            is_retryable: err.is_retryable(),
            message: err.to_string(),
        }))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn status_of(err: PayoutError) -> (u16, ErrorCode, bool) {
        let app: AppError = err.into();
        (app.status_code(), app.error_code(), app.is_retryable())
    }

    #[test]
    fn test_insufficient_balance_error() {
        let (status, code, retryable) = status_of(PayoutError::InsufficientBalance {
            available: Decimal::from(50),
            requested: Decimal::from(100),
        });

        assert_eq!(status, 400);
        assert_eq!(code, ErrorCode::InsufficientBalance);
        assert!(!retryable);
    }

    #[test]
    fn test_otp_errors() {
        assert_eq!(
            status_of(PayoutError::InvalidOtp {
                message: "wrong".to_string()
            }),
            (400, ErrorCode::InvalidOtp, true)
        );
        assert_eq!(
            status_of(PayoutError::OtpNotAccepted),
            (409, ErrorCode::OtpNotAccepted, true)
        );
        assert_eq!(
            status_of(PayoutError::OtpExpired),
            (410, ErrorCode::OtpExpired, false)
        );

        let app: AppError = PayoutError::OtpExpired.into();
        assert_eq!(
            app.user_message(),
            "OTP expired. Click resend to receive a new OTP"
        );
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            status_of(PayoutError::ReversalNotAllowed {
                message: "paid".to_string()
            })
            .0,
            403
        );
        assert_eq!(status_of(PayoutError::NotFound(Uuid::new_v4())).0, 404);
        assert_eq!(
            status_of(PayoutError::AlreadySettled {
                status: PaymentRequestStatus::Paid
            })
            .0,
            409
        );
        assert_eq!(
            status_of(PayoutError::TransferFailed {
                reason: "declined".to_string()
            })
            .0,
            422
        );
        assert_eq!(
            status_of(PayoutError::GatewayUnavailable {
                message: "down".to_string()
            }),
            (503, ErrorCode::PaymentProviderError, true)
        );
        assert_eq!(
            status_of(PayoutError::GatewayTimeout { timeout_secs: 30 }).0,
            504
        );
        assert_eq!(
            status_of(PayoutError::Consistency("drift".to_string())).0,
            500
        );
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::validation("amount", "must be positive");

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(error.details().is_some());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidStatusTransition).unwrap();
        assert_eq!(json, "\"INVALID_STATUS_TRANSITION\"");
    }
}
