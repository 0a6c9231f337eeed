use crate::payouts::{PaymentRequest, PaymentRequestStatus, PayoutStore};
use crate::services::PayoutOrchestrator;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PayoutReconcilerConfig {
    /// How often the worker wakes up.
    pub poll_interval: Duration,
    /// `processing` requests untouched this long are polled at the gateway.
    pub processing_stale_after: Duration,
    /// `awaiting_paystack_otp` requests untouched this long are checked for
    /// abandonment.
    pub awaiting_otp_stale_after: Duration,
    /// `pending` requests without a transfer are retried after this long.
    pub pending_retry_after: Duration,
    /// Maximum requests fetched per status group per cycle.
    pub batch_size: i64,
    /// Gateway lookups in flight at once.
    pub concurrency: usize,
}

impl Default for PayoutReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            processing_stale_after: Duration::from_secs(10 * 60),
            awaiting_otp_stale_after: Duration::from_secs(30 * 60),
            pending_retry_after: Duration::from_secs(5 * 60),
            batch_size: 50,
            concurrency: 4,
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default.as_secs()),
    )
}

impl PayoutReconcilerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = env_secs("PAYOUT_RECONCILER_POLL_INTERVAL_SECONDS", cfg.poll_interval);
        cfg.processing_stale_after = env_secs(
            "PAYOUT_RECONCILER_PROCESSING_STALE_SECONDS",
            cfg.processing_stale_after,
        );
        cfg.awaiting_otp_stale_after = env_secs(
            "PAYOUT_RECONCILER_AWAITING_OTP_STALE_SECONDS",
            cfg.awaiting_otp_stale_after,
        );
        cfg.pending_retry_after = env_secs(
            "PAYOUT_RECONCILER_PENDING_RETRY_SECONDS",
            cfg.pending_retry_after,
        );
        cfg.batch_size = std::env::var("PAYOUT_RECONCILER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(cfg.batch_size);
        cfg.concurrency = std::env::var("PAYOUT_RECONCILER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(cfg.concurrency);
        cfg
    }

    /// Status groups swept each cycle, with their staleness threshold.
    fn sweeps(&self) -> [(PaymentRequestStatus, Duration); 3] {
        [
            (PaymentRequestStatus::Processing, self.processing_stale_after),
            (
                PaymentRequestStatus::AwaitingPaystackOtp,
                self.awaiting_otp_stale_after,
            ),
            (PaymentRequestStatus::Pending, self.pending_retry_after),
        ]
    }
}

/// Counts from one reconciliation cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub examined: usize,
    /// Requests whose status changed.
    pub resolved: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Resolves requests the webhook path never settled by polling the gateway.
pub struct PayoutReconciler {
    store: Arc<dyn PayoutStore>,
    orchestrator: Arc<PayoutOrchestrator>,
    config: PayoutReconcilerConfig,
}

impl PayoutReconciler {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        orchestrator: Arc<PayoutOrchestrator>,
        config: PayoutReconcilerConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            processing_stale_secs = self.config.processing_stale_after.as_secs(),
            awaiting_otp_stale_secs = self.config.awaiting_otp_stale_after.as_secs(),
            pending_retry_secs = self.config.pending_retry_after.as_secs(),
            batch_size = self.config.batch_size,
            "payout reconciler started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("payout reconciler stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.run_cycle().await {
                        Ok(report) if report.examined > 0 => info!(
                            examined = report.examined,
                            resolved = report.resolved,
                            failed = report.failed,
                            "payout reconciliation cycle finished"
                        ),
                        Ok(_) => debug!("no stale payout requests"),
                        Err(e) => warn!(error = %e, "payout reconciliation cycle failed"),
                    }
                }
            }
        }

        info!("payout reconciler stopped");
    }

    /// Sweep every status group once.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let mut report = CycleReport::default();

        for (status, stale_after) in self.config.sweeps() {
            let cutoff = Utc::now() - chrono::Duration::from_std(stale_after)?;
            let mut stale = self
                .store
                .find_stale_requests(&[status], cutoff, self.config.batch_size)
                .await?;
            if status == PaymentRequestStatus::Pending {
                // Pending requests that already hold a transfer code are in
                // flight; only those without one need a retry.
                stale.retain(|r| r.paystack_transfer_code.is_none());
            }
            if stale.is_empty() {
                continue;
            }

            debug!(status = %status, count = stale.len(), "reconciling stale payout requests");
            let group = self.reconcile_all(stale).await;
            report.examined += group.examined;
            report.resolved += group.resolved;
            report.failed += group.failed;
        }

        Ok(report)
    }

    async fn reconcile_all(&self, requests: Vec<PaymentRequest>) -> CycleReport {
        let outcomes: Vec<Outcome> = stream::iter(requests)
            .map(|request| {
                let orchestrator = Arc::clone(&self.orchestrator);
                async move {
                    let id = request.id;
                    let before = request.status;
                    match orchestrator.reconcile_request(request).await {
                        Ok(after) if after.status != before => {
                            info!(
                                request_id = %id,
                                from = %before,
                                to = %after.status,
                                "payout request reconciled"
                            );
                            Outcome::Resolved
                        }
                        Ok(_) => Outcome::Unchanged,
                        Err(e) if e.is_retryable() => {
                            warn!(request_id = %id, error = %e, "reconciliation deferred");
                            Outcome::Failed
                        }
                        Err(e) => {
                            error!(request_id = %id, error = %e, "reconciliation failed");
                            Outcome::Failed
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        CycleReport {
            examined: outcomes.len(),
            resolved: outcomes.iter().filter(|o| **o == Outcome::Resolved).count(),
            failed: outcomes.iter().filter(|o| **o == Outcome::Failed).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    Resolved,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let cfg = PayoutReconcilerConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.processing_stale_after, Duration::from_secs(600));
        assert_eq!(cfg.awaiting_otp_stale_after, Duration::from_secs(1800));
        assert_eq!(cfg.pending_retry_after, Duration::from_secs(300));
        assert_eq!(cfg.batch_size, 50);
    }

    #[test]
    fn sweeps_cover_every_active_status() {
        let cfg = PayoutReconcilerConfig::default();
        let statuses: Vec<_> = cfg.sweeps().iter().map(|(s, _)| *s).collect();
        for status in PaymentRequestStatus::ACTIVE {
            assert!(statuses.contains(&status));
        }
    }
}
