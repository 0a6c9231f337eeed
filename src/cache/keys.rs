//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod payout {
    use super::*;

    pub const NAMESPACE: &str = "payout";

    /// Gateway recipient code for a payout destination, keyed by its fingerprint.
    #[derive(Debug, Clone)]
    pub struct RecipientKey {
        pub fingerprint: String,
    }

    impl RecipientKey {
        pub fn new(fingerprint: impl Into<String>) -> Self {
            Self {
                fingerprint: fingerprint.into(),
            }
        }
    }

    impl fmt::Display for RecipientKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}:recipient:{}",
                VERSION, NAMESPACE, self.fingerprint
            )
        }
    }

    /// Webhook events already handled, for short-lived replay suppression.
    #[derive(Debug, Clone)]
    pub struct WebhookEventKey {
        pub event: String,
        pub transfer: String,
    }

    impl WebhookEventKey {
        pub fn new(event: impl Into<String>, transfer: impl Into<String>) -> Self {
            Self {
                event: event.into(),
                transfer: transfer.into(),
            }
        }
    }

    impl fmt::Display for WebhookEventKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}:webhook:{}:{}",
                VERSION, NAMESPACE, self.event, self.transfer
            )
        }
    }
}
