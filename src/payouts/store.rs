use crate::database::error::DatabaseError;
use crate::ledger::{LedgerError, SellerBalance};
use crate::payments::types::PayoutDetails;
use crate::payouts::{LedgerMutation, PaymentRequest, PaymentRequestStatus, RequestUpdate};
use crate::services::revenue_history::RevenueHistoryEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum PayoutStoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("seller already has an active payout request")]
    ActiveRequestExists,

    #[error("payout request {0} not found")]
    RequestNotFound(Uuid),

    #[error("payout request is {current}, expected one of {expected:?}")]
    StatusConflict {
        current: PaymentRequestStatus,
        expected: Vec<PaymentRequestStatus>,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type StoreResult<T> = Result<T, PayoutStoreError>;

/// A committed write together with the balance it left behind.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    /// Balance after the write, when the write touched the ledger.
    pub balance: Option<SellerBalance>,
    /// False when the history entry was rolled back and recorded as a gap.
    pub history_recorded: bool,
}

/// Outcome of a standalone ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// The reference was already in history. Nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<PaymentRequestStatus>,
    pub page: u32,
    pub limit: u32,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl RequestFilter {
    /// Clamp page to at least 1 and limit to `1..=MAX_PAGE_LIMIT`.
    pub fn new(status: Option<PaymentRequestStatus>, page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            status,
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Durable storage for balances, requests and revenue history.
///
/// Every method that takes a [`LedgerMutation`] applies the balance change,
/// its history entry and the request write as one atomic unit under the
/// seller's balance lock. A failed history write is rolled back on its own
/// and reported through [`Committed::history_recorded`].
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Current balance. A seller with no row has an empty balance.
    async fn get_balance(&self, seller_id: &str) -> StoreResult<SellerBalance>;

    /// Apply a mutation that is not tied to a payout request.
    async fn apply_mutation(
        &self,
        mutation: LedgerMutation,
    ) -> StoreResult<Committed<MutationOutcome>>;

    /// Reserve funds and insert a new `pending` request.
    ///
    /// The reservation is checked before the one-active rule, so a seller
    /// racing two requests sees `InsufficientBalance` whenever both do not fit.
    async fn create_request(
        &self,
        request: PaymentRequest,
        mutation: LedgerMutation,
    ) -> StoreResult<Committed<PaymentRequest>>;

    async fn find_request(&self, id: Uuid) -> StoreResult<Option<PaymentRequest>>;

    /// Find a request by its current transfer code or transfer reference.
    async fn find_by_transfer(
        &self,
        transfer_code: Option<&str>,
        reference: Option<&str>,
    ) -> StoreResult<Option<PaymentRequest>>;

    async fn list_requests(
        &self,
        seller_id: &str,
        filter: RequestFilter,
    ) -> StoreResult<Page<PaymentRequest>>;

    /// Compare-and-set on status.
    ///
    /// Fails with `StatusConflict` unless the stored status is in `expected`.
    /// A `Reserve` mutation additionally requires that the seller has no other
    /// active request.
    async fn transition(
        &self,
        id: Uuid,
        expected: &[PaymentRequestStatus],
        update: RequestUpdate,
        mutation: Option<LedgerMutation>,
    ) -> StoreResult<Committed<PaymentRequest>>;

    /// Active requests in `statuses` not updated since `older_than`, oldest first.
    async fn find_stale_requests(
        &self,
        statuses: &[PaymentRequestStatus],
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRequest>>;

    async fn save_default_details(
        &self,
        seller_id: &str,
        details: &PayoutDetails,
    ) -> StoreResult<()>;

    async fn default_details(&self, seller_id: &str) -> StoreResult<Option<PayoutDetails>>;

    /// Most recent history entries first.
    async fn history(&self, seller_id: &str, limit: i64) -> StoreResult<Vec<RevenueHistoryEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clamps_page_and_limit() {
        let filter = RequestFilter::new(None, Some(0), Some(500));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, MAX_PAGE_LIMIT);

        let filter = RequestFilter::new(None, Some(3), Some(10));
        assert_eq!(filter.offset(), 20);

        assert_eq!(RequestFilter::new(None, None, None), RequestFilter::default());
    }
}
