//! Services module for payout business logic

pub mod notification;
pub mod payout_orchestrator;
pub mod revenue_history;

// Re-export orchestrator types
pub use crate::services::notification::{LoggingNotifier, PayoutNotificationType, PayoutNotifier};
pub use crate::services::payout_orchestrator::{
    CreateWithdrawal, LedgerReceipt, OrchestratorConfig, PayoutError, PayoutOrchestrator,
    PayoutResult,
};
