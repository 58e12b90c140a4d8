use crate::domain::entitlement::{PremiumPlan, ReferralLink, UserEntitlement, UserId};
use crate::domain::payment::{DecisionOutcome, PaymentRequest, PaymentStatus};
use crate::domain::ports::{EntitlementStore, HistoryStore, MediaStore, PaymentStore, ReferralStore};
use crate::domain::session::{BlobRef, HistoryRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for entitlement rows.
///
/// Uses `Arc<RwLock<HashMap>>` to allow shared concurrent access. Ideal for
/// tests and the replay driver where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryEntitlementStore {
    rows: Arc<RwLock<HashMap<UserId, UserEntitlement>>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserEntitlement>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&user_id).cloned())
    }

    async fn store(&self, row: UserEntitlement) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.insert(row.user_id, row);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<UserEntitlement>> {
        let rows = self.rows.read().await;
        Ok(rows.values().cloned().collect())
    }
}

/// A thread-safe in-memory store for payment requests. Ids are assigned from
/// a monotone counter held inside the same lock as the rows, so creation
/// and the decision compare-and-set are both race-free.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<PaymentRows>>,
}

#[derive(Default)]
struct PaymentRows {
    next_id: u64,
    rows: HashMap<u64, PaymentRequest>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(
        &self,
        user_id: UserId,
        amount_som: i64,
        plan: PremiumPlan,
        receipt: BlobRef,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let request = PaymentRequest {
            id: inner.next_id,
            user_id,
            amount_som,
            plan,
            receipt,
            status: PaymentStatus::Pending,
            admin_response: None,
            created_at: now,
            processed_at: None,
        };
        inner.rows.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, id: u64) -> Result<Option<PaymentRequest>> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn decide_if_pending(
        &self,
        id: u64,
        status: PaymentStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome> {
        let mut inner = self.inner.write().await;
        match inner.rows.get_mut(&id) {
            None => Ok(DecisionOutcome::NotFound),
            Some(request) if !request.is_pending() => {
                Ok(DecisionOutcome::AlreadyProcessed(request.clone()))
            }
            Some(request) => {
                request.status = status;
                request.admin_response = note;
                request.processed_at = Some(now);
                Ok(DecisionOutcome::Applied(request.clone()))
            }
        }
    }

    async fn pending(&self) -> Result<Vec<PaymentRequest>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<PaymentRequest> = inner
            .rows
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        Ok(pending)
    }
}

/// A thread-safe in-memory store for referral links, unique per referred
/// user.
#[derive(Default, Clone)]
pub struct InMemoryReferralStore {
    links: Arc<RwLock<HashMap<UserId, ReferralLink>>>,
}

impl InMemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferralStore for InMemoryReferralStore {
    async fn insert_if_absent(&self, link: ReferralLink) -> Result<bool> {
        let mut links = self.links.write().await;
        if links.contains_key(&link.referred_id) {
            return Ok(false);
        }
        links.insert(link.referred_id, link);
        Ok(true)
    }

    async fn get(&self, referred_id: UserId) -> Result<Option<ReferralLink>> {
        let links = self.links.read().await;
        Ok(links.get(&referred_id).cloned())
    }
}

/// A thread-safe in-memory store for delivery history, append order per
/// user.
#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    rows: Arc<RwLock<HashMap<UserId, Vec<HistoryRecord>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.entry(record.user_id).or_default().push(record);
        Ok(())
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<HistoryRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&user_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, user_id: UserId) -> Result<u64> {
        let rows = self.rows.read().await;
        Ok(rows.get(&user_id).map_or(0, |records| records.len() as u64))
    }
}

/// Tracks which blobs are still backed by a live temporary resource.
///
/// Blobs are registered as they enter the system; `discard` releases them.
/// Tests use `is_live` to assert that sessions actually reclaim staged
/// media.
#[derive(Default, Clone)]
pub struct InMemoryMediaStore {
    live: Arc<RwLock<HashSet<BlobRef>>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, blob: BlobRef) {
        let mut live = self.live.write().await;
        live.insert(blob);
    }

    pub async fn is_live(&self, blob: &BlobRef) -> bool {
        let live = self.live.read().await;
        live.contains(blob)
    }

    pub async fn live_count(&self) -> usize {
        let live = self.live.read().await;
        live.len()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn discard(&self, blob: &BlobRef) -> Result<()> {
        let mut live = self.live.write().await;
        live.remove(blob);
        Ok(())
    }
}
