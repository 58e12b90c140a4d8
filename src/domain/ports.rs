use crate::domain::entitlement::{ReferralLink, UserEntitlement, UserId};
use crate::domain::event::Reply;
use crate::domain::payment::{DecisionOutcome, PaymentRequest, PaymentStatus};
use crate::domain::session::{BlobRef, EffectPreset, HistoryRecord, MediaKind};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Durable store for `UserEntitlement` rows.
///
/// Read-modify-write cycles are serialized above this trait (the ledger
/// holds a per-user lock); implementations only need per-key atomicity of
/// individual operations.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<UserEntitlement>>;
    async fn store(&self, row: UserEntitlement) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<UserEntitlement>>;
}

/// Durable store for payment requests. Ids are store-assigned and monotone.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(
        &self,
        user_id: UserId,
        amount_som: i64,
        plan: crate::domain::entitlement::PremiumPlan,
        receipt: BlobRef,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest>;

    async fn get(&self, id: u64) -> Result<Option<PaymentRequest>>;

    /// Atomically moves a Pending request to `status`. The compare-and-set
    /// lives in the store so concurrent decisions cannot both observe
    /// Pending.
    async fn decide_if_pending(
        &self,
        id: u64,
        status: PaymentStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome>;

    async fn pending(&self) -> Result<Vec<PaymentRequest>>;
}

/// Durable store for referral links, unique per referred user.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Inserts the link unless one already exists for `link.referred_id`.
    /// Returns whether the insert happened; under concurrent attempts for
    /// the same referred user exactly one call returns true.
    async fn insert_if_absent(&self, link: ReferralLink) -> Result<bool>;

    async fn get(&self, referred_id: UserId) -> Result<Option<ReferralLink>>;
}

/// Append-only ledger of delivered kruzhoks, one row per delivery.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<()>;

    /// The user's most recent deliveries, newest first, at most `limit`.
    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<HistoryRecord>>;

    /// Total kruzhoks ever delivered to the user.
    async fn count(&self, user_id: UserId) -> Result<u64>;
}

/// Reclaims the temporary resource behind a staged blob. Discarding an
/// already-released blob is a no-op.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn discard(&self, blob: &BlobRef) -> Result<()>;
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}

#[derive(Error, Debug, PartialEq, Clone)]
#[error("transcode failed: {reason}")]
pub struct TranscodeError {
    pub reason: String,
}

impl TranscodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Media transcoding engine. Long-running; callers must not hold per-user
/// locks across this call.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transform(
        &self,
        input: &BlobRef,
        kind: MediaKind,
        effect: EffectPreset,
        duration_cap_secs: u32,
    ) -> std::result::Result<BlobRef, TranscodeError>;
}

/// Time source, injectable so daily resets and expiries are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type EntitlementStoreBox = Box<dyn EntitlementStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type ReferralStoreBox = Box<dyn ReferralStore>;
pub type HistoryStoreBox = Box<dyn HistoryStore>;
pub type SharedMediaStore = Arc<dyn MediaStore>;
pub type SharedMessenger = Arc<dyn Messenger>;
pub type SharedTranscoder = Arc<dyn Transcoder>;
pub type SharedClock = Arc<dyn Clock>;
