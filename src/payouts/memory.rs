//! In-memory payout store used by tests and `SKIP_EXTERNALS` mode.

use crate::ledger::{LedgerOperation, SellerBalance};
use crate::payments::types::PayoutDetails;
use crate::payouts::store::{
    Committed, MutationOutcome, Page, PayoutStore, PayoutStoreError, RequestFilter, StoreResult,
};
use crate::payouts::{LedgerMutation, PaymentRequest, PaymentRequestStatus, RequestUpdate};
use crate::services::revenue_history::{RevenueHistoryEntry, RevenueHistoryRecorder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    balances: HashMap<String, SellerBalance>,
    defaults: HashMap<String, PayoutDetails>,
    requests: HashMap<Uuid, PaymentRequest>,
    history: Vec<RevenueHistoryEntry>,
    references: HashSet<String>,
}

impl State {
    fn balance(&self, seller_id: &str) -> SellerBalance {
        self.balances.get(seller_id).copied().unwrap_or_default()
    }

    fn other_active(&self, seller_id: &str, except: Option<Uuid>) -> bool {
        self.requests
            .values()
            .any(|r| r.seller_id == seller_id && Some(r.id) != except && r.is_active())
    }

    /// Returns false when the entry could not be stored.
    fn record(&mut self, entry: RevenueHistoryEntry, fail: bool) -> bool {
        if fail {
            RevenueHistoryRecorder::report_gap(&entry, "history writes disabled");
            return false;
        }
        if !self.references.insert(entry.reference.clone()) {
            RevenueHistoryRecorder::report_gap(&entry, "duplicate history reference");
            return false;
        }
        self.history.push(entry);
        true
    }
}

/// Mutex-guarded store. Every call holds the lock for its whole critical
/// section, which gives the same per-seller exclusion as row locks.
#[derive(Default)]
pub struct InMemoryPayoutStore {
    state: Mutex<State>,
    fail_history_writes: AtomicBool,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every history insert fail, as if the history table were down.
    pub fn fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }

    fn history_failing(&self) -> bool {
        self.fail_history_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn get_balance(&self, seller_id: &str) -> StoreResult<SellerBalance> {
        Ok(self.state.lock().await.balance(seller_id))
    }

    async fn apply_mutation(
        &self,
        mutation: LedgerMutation,
    ) -> StoreResult<Committed<MutationOutcome>> {
        let mut state = self.state.lock().await;
        let before = state.balance(&mutation.seller_id);

        if state.references.contains(&mutation.reference) {
            return Ok(Committed {
                value: MutationOutcome::Duplicate,
                balance: Some(before),
                history_recorded: true,
            });
        }

        let after = before.apply(mutation.operation)?;
        let entry = RevenueHistoryRecorder::entry_for(&mutation, &before, &after, Utc::now());
        let history_recorded = state.record(entry, self.history_failing());
        state.balances.insert(mutation.seller_id.clone(), after);

        Ok(Committed {
            value: MutationOutcome::Applied,
            balance: Some(after),
            history_recorded,
        })
    }

    async fn create_request(
        &self,
        mut request: PaymentRequest,
        mutation: LedgerMutation,
    ) -> StoreResult<Committed<PaymentRequest>> {
        let mut state = self.state.lock().await;
        let before = state.balance(&request.seller_id);
        let after = before.apply(mutation.operation)?;

        if state.other_active(&request.seller_id, None) {
            return Err(PayoutStoreError::ActiveRequestExists);
        }

        let now = Utc::now();
        let entry = RevenueHistoryRecorder::entry_for(&mutation, &before, &after, now);
        let history_recorded = state.record(entry, self.history_failing());
        if !history_recorded {
            request.note_history_gap(&mutation.reference);
        }

        state.balances.insert(request.seller_id.clone(), after);
        state.requests.insert(request.id, request.clone());

        Ok(Committed {
            value: request,
            balance: Some(after),
            history_recorded,
        })
    }

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<PaymentRequest>> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn find_by_transfer(
        &self,
        transfer_code: Option<&str>,
        reference: Option<&str>,
    ) -> StoreResult<Option<PaymentRequest>> {
        let state = self.state.lock().await;
        let found = state.requests.values().find(|r| {
            let code_match = transfer_code.is_some()
                && r.paystack_transfer_code.as_deref() == transfer_code;
            let reference_match =
                reference.is_some() && r.transfer_reference.as_deref() == reference;
            code_match || reference_match
        });
        Ok(found.cloned())
    }

    async fn list_requests(
        &self,
        seller_id: &str,
        filter: RequestFilter,
    ) -> StoreResult<Page<PaymentRequest>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&PaymentRequest> = state
            .requests
            .values()
            .filter(|r| r.seller_id == seller_id)
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: filter.page,
            limit: filter.limit,
            total,
        })
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[PaymentRequestStatus],
        update: RequestUpdate,
        mutation: Option<LedgerMutation>,
    ) -> StoreResult<Committed<PaymentRequest>> {
        let mut state = self.state.lock().await;
        let mut request = state
            .requests
            .get(&id)
            .cloned()
            .ok_or(PayoutStoreError::RequestNotFound(id))?;

        if !expected.contains(&request.status) {
            return Err(PayoutStoreError::StatusConflict {
                current: request.status,
                expected: expected.to_vec(),
            });
        }

        let now = Utc::now();
        let applied = match &mutation {
            Some(mutation) => {
                let before = state.balance(&request.seller_id);
                let after = before.apply(mutation.operation)?;
                if matches!(mutation.operation, LedgerOperation::Reserve(_))
                    && state.other_active(&request.seller_id, Some(id))
                {
                    return Err(PayoutStoreError::ActiveRequestExists);
                }
                Some((mutation, before, after))
            }
            None => None,
        };

        update.apply_to(&mut request, now);
        if request.is_active() && state.other_active(&request.seller_id, Some(id)) {
            return Err(PayoutStoreError::ActiveRequestExists);
        }

        let mut history_recorded = true;
        let mut balance = None;
        if let Some((mutation, before, after)) = applied {
            let entry = RevenueHistoryRecorder::entry_for(mutation, &before, &after, now);
            history_recorded = state.record(entry, self.history_failing());
            if !history_recorded {
                request.note_history_gap(&mutation.reference);
            }
            state.balances.insert(request.seller_id.clone(), after);
            balance = Some(after);
        }

        state.requests.insert(id, request.clone());
        Ok(Committed {
            value: request,
            balance,
            history_recorded,
        })
    }

    async fn find_stale_requests(
        &self,
        statuses: &[PaymentRequestStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRequest>> {
        let state = self.state.lock().await;
        let mut stale: Vec<PaymentRequest> = state
            .requests
            .values()
            .filter(|r| r.is_active && statuses.contains(&r.status) && r.updated_at <= older_than)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn save_default_details(
        &self,
        seller_id: &str,
        details: &PayoutDetails,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .defaults
            .insert(seller_id.to_string(), details.clone());
        Ok(())
    }

    async fn default_details(&self, seller_id: &str) -> StoreResult<Option<PayoutDetails>> {
        Ok(self.state.lock().await.defaults.get(seller_id).cloned())
    }

    async fn history(&self, seller_id: &str, limit: i64) -> StoreResult<Vec<RevenueHistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|e| e.seller_id == seller_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
