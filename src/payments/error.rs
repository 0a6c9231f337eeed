use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors reported by the transfer gateway client.
///
/// Business errors are kept apart because each one has a different recovery:
/// a wrong OTP is retried against the same transfer, an expired OTP needs a
/// new transfer, and bad account details need new input from the seller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("invalid account details: {message}")]
    InvalidAccountDetails { message: String },

    #[error("invalid OTP: {message}")]
    InvalidOtp { message: String },

    #[error("OTP expired: {message}")]
    OtpExpired { message: String },

    #[error("transfer is not awaiting OTP: {message}")]
    TransferNotAwaitingOtp { message: String },

    #[error("transfer not found: {reference}")]
    TransferNotFound { reference: String },

    #[error("gateway balance insufficient: {message}")]
    InsufficientGatewayBalance { message: String },

    #[error("gateway rejected request: {message}")]
    Rejected {
        message: String,
        provider_code: Option<String>,
    },

    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },

    #[error("gateway call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("unexpected gateway response: {message}")]
    UnexpectedResponse { message: String },

    #[error("webhook verification failed: {message}")]
    WebhookVerification { message: String },
}

impl GatewayError {
    /// The call may or may not have reached the gateway; its outcome has to be
    /// looked up before anything is compensated.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Unavailable { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::UnexpectedResponse { .. }
        )
    }

    /// The transfer code is dead and a fresh transfer is needed.
    pub fn requires_new_transfer(&self) -> bool {
        matches!(
            self,
            GatewayError::OtpExpired { .. } | GatewayError::TransferNotAwaitingOtp { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::InvalidOtp { .. } => true,
            GatewayError::InsufficientGatewayBalance { .. } => true,
            GatewayError::Unavailable { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::UnexpectedResponse { .. } => true,
            GatewayError::InvalidAccountDetails { .. }
            | GatewayError::OtpExpired { .. }
            | GatewayError::TransferNotAwaitingOtp { .. }
            | GatewayError::TransferNotFound { .. }
            | GatewayError::Rejected { .. }
            | GatewayError::WebhookVerification { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_distinguished() {
        assert!(GatewayError::Timeout { timeout_secs: 30 }.is_transport());
        assert!(GatewayError::Unavailable {
            message: "connection refused".to_string()
        }
        .is_transport());
        assert!(!GatewayError::InvalidOtp {
            message: "bad".to_string()
        }
        .is_transport());
    }

    #[test]
    fn only_expiry_errors_need_a_new_transfer() {
        assert!(GatewayError::OtpExpired {
            message: "expired".to_string()
        }
        .requires_new_transfer());
        assert!(GatewayError::TransferNotAwaitingOtp {
            message: "abandoned".to_string()
        }
        .requires_new_transfer());
        assert!(!GatewayError::InvalidOtp {
            message: "wrong".to_string()
        }
        .requires_new_transfer());
    }

    #[test]
    fn invalid_otp_is_retryable_but_bad_details_are_not() {
        assert!(GatewayError::InvalidOtp {
            message: "wrong".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::InvalidAccountDetails {
            message: "bad account".to_string()
        }
        .is_retryable());
    }
}
