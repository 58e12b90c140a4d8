use crate::domain::entitlement::{PremiumPlan, ReferralLink, UserEntitlement, UserId};
use crate::domain::payment::{DecisionOutcome, PaymentRequest, PaymentStatus};
use crate::domain::ports::{EntitlementStore, HistoryStore, PaymentStore, ReferralStore};
use crate::domain::session::{BlobRef, HistoryRecord};
use crate::error::{KruzhokError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for entitlement rows.
pub const CF_ENTITLEMENTS: &str = "entitlements";
/// Column Family for payment requests.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for referral links, keyed by referred user.
pub const CF_REFERRALS: &str = "referrals";
/// Column Family for delivery history, keyed by user id + sequence.
pub const CF_HISTORY: &str = "history";
/// Column Family for counters and other single-key metadata.
pub const CF_META: &str = "meta";

const KEY_NEXT_PAYMENT_ID: &[u8] = b"payments/next_id";
const KEY_NEXT_HISTORY_SEQ: &[u8] = b"history/next_seq";

/// A persistent store implementation using RocksDB.
///
/// Entitlements, payment requests, referral links and delivery history live
/// in separate Column Families with JSON values. Check-then-write sequences
/// (id and sequence allocation, the pending-decision and referral-insert
/// compare-and-sets) are serialized through one write mutex, so they stay
/// race-free without RocksDB transactions.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ENTITLEMENTS, CF_PAYMENTS, CF_REFERRALS, CF_HISTORY, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            KruzhokError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            KruzhokError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {e}"),
            )))
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            KruzhokError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Deserialization error: {e}"),
            )))
        })
    }

    fn get_payment(&self, id: u64) -> Result<Option<PaymentRequest>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_payment(&self, request: &PaymentRequest) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        self.db
            .put_cf(cf, request.id.to_be_bytes(), Self::encode(request)?)?;
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for RocksDbStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserEntitlement>> {
        let cf = self.cf(CF_ENTITLEMENTS)?;
        match self.db.get_cf(cf, user_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, row: UserEntitlement) -> Result<()> {
        let cf = self.cf(CF_ENTITLEMENTS)?;
        self.db
            .put_cf(cf, row.user_id.to_be_bytes(), Self::encode(&row)?)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<UserEntitlement>> {
        let cf = self.cf(CF_ENTITLEMENTS)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(Self::decode(&value)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn create(
        &self,
        user_id: UserId,
        amount_som: i64,
        plan: PremiumPlan,
        receipt: BlobRef,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest> {
        let _guard = self.write_lock.lock().await;
        let meta = self.cf(CF_META)?;

        let next_id = match self.db.get_cf(meta, KEY_NEXT_PAYMENT_ID)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    KruzhokError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt payment id counter",
                    )))
                })?;
                u64::from_be_bytes(raw) + 1
            }
            None => 1,
        };
        self.db
            .put_cf(meta, KEY_NEXT_PAYMENT_ID, next_id.to_be_bytes())?;

        let request = PaymentRequest {
            id: next_id,
            user_id,
            amount_som,
            plan,
            receipt,
            status: PaymentStatus::Pending,
            admin_response: None,
            created_at: now,
            processed_at: None,
        };
        self.put_payment(&request)?;
        Ok(request)
    }

    async fn get(&self, id: u64) -> Result<Option<PaymentRequest>> {
        self.get_payment(id)
    }

    async fn decide_if_pending(
        &self,
        id: u64,
        status: PaymentStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome> {
        let _guard = self.write_lock.lock().await;
        match self.get_payment(id)? {
            None => Ok(DecisionOutcome::NotFound),
            Some(request) if !request.is_pending() => {
                Ok(DecisionOutcome::AlreadyProcessed(request))
            }
            Some(mut request) => {
                request.status = status;
                request.admin_response = note;
                request.processed_at = Some(now);
                self.put_payment(&request)?;
                Ok(DecisionOutcome::Applied(request))
            }
        }
    }

    async fn pending(&self) -> Result<Vec<PaymentRequest>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut pending = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let request: PaymentRequest = Self::decode(&value)?;
            if request.is_pending() {
                pending.push(request);
            }
        }
        pending.sort_by_key(|r| r.id);
        Ok(pending)
    }
}

#[async_trait]
impl ReferralStore for RocksDbStore {
    async fn insert_if_absent(&self, link: ReferralLink) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_REFERRALS)?;
        let key = link.referred_id.to_be_bytes();
        if self.db.get_pinned_cf(cf, key)?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, key, Self::encode(&link)?)?;
        Ok(true)
    }

    async fn get(&self, referred_id: UserId) -> Result<Option<ReferralLink>> {
        let cf = self.cf(CF_REFERRALS)?;
        match self.db.get_cf(cf, referred_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl HistoryStore for RocksDbStore {
    async fn append(&self, record: HistoryRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let meta = self.cf(CF_META)?;

        let seq = match self.db.get_cf(meta, KEY_NEXT_HISTORY_SEQ)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    KruzhokError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt history sequence counter",
                    )))
                })?;
                u64::from_be_bytes(raw) + 1
            }
            None => 1,
        };
        self.db
            .put_cf(meta, KEY_NEXT_HISTORY_SEQ, seq.to_be_bytes())?;

        let cf = self.cf(CF_HISTORY)?;
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&record.user_id.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        self.db.put_cf(cf, key, Self::encode(&record)?)?;
        Ok(())
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<HistoryRecord>> {
        let cf = self.cf(CF_HISTORY)?;
        let prefix = user_id.to_be_bytes();
        let mut upper = Vec::with_capacity(16);
        upper.extend_from_slice(&prefix);
        upper.extend_from_slice(&u64::MAX.to_be_bytes());

        let mut records = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) || records.len() == limit {
                break;
            }
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    async fn count(&self, user_id: UserId) -> Result<u64> {
        let cf = self.cf(CF_HISTORY)?;
        let prefix = user_id.to_be_bytes();

        let mut total = 0;
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            total += 1;
        }
        Ok(total)
    }
}
