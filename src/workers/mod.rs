pub mod payout_reconciler;

pub use payout_reconciler::{CycleReport, PayoutReconciler, PayoutReconcilerConfig};
