use crate::domain::entitlement::{EntitlementSnapshot, PremiumPlan, UserEntitlement, UserId};
use crate::domain::ports::{EntitlementStoreBox, SharedClock};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

/// The entitlement ledger: per-user quota, bonus credits, premium status and
/// referral counters.
///
/// Every operation runs as a read-modify-write against the store under a
/// per-user async mutex, so the user's own session path and the admin
/// payment path serialize on the same row. The implicit daily reset is
/// applied (and persisted) at the head of every operation; there is no
/// background reset job.
pub struct EntitlementLedger {
    store: EntitlementStoreBox,
    clock: SharedClock,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl EntitlementLedger {
    pub fn new(store: EntitlementStoreBox, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the row lock for `user_id`. Lock entries are tiny and kept
    /// for the life of the process.
    async fn row_lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Loads the row, creating it lazily, and applies the daily reset.
    async fn load_current(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UserEntitlement> {
        let mut row = match self.store.get(user_id).await? {
            Some(row) => row,
            None => UserEntitlement::new(user_id, now),
        };
        row.roll_day(now.date_naive());
        Ok(row)
    }

    /// Whether the user may start one more unit of work. Premium users
    /// always pass; everyone else is measured against
    /// `daily_limit + bonus_credits` after the implicit daily reset.
    pub async fn check_admission(&self, user_id: UserId) -> Result<bool> {
        let _guard = self.row_lock(user_id).await;
        let now = self.clock.now();
        let row = self.load_current(user_id, now).await?;
        let admitted = row.may_admit(now);
        self.store.store(row).await?;
        Ok(admitted)
    }

    /// Records one consumed unit, bonus credits first. Applied
    /// unconditionally; calling this once per delivered kruzhok is the
    /// orchestrator's responsibility.
    pub async fn consume(&self, user_id: UserId) -> Result<()> {
        let _guard = self.row_lock(user_id).await;
        let now = self.clock.now();
        let mut row = self.load_current(user_id, now).await?;
        row.consume_one();
        self.store.store(row).await?;
        Ok(())
    }

    /// Activates or extends premium. Returns the new expiry.
    pub async fn grant_premium(
        &self,
        user_id: UserId,
        plan: PremiumPlan,
    ) -> Result<DateTime<Utc>> {
        let _guard = self.row_lock(user_id).await;
        let now = self.clock.now();
        let mut row = self.load_current(user_id, now).await?;
        row.extend_premium(plan, now);
        let expires_at = row.premium_expires_at.unwrap_or(now);
        self.store.store(row).await?;
        info!(user_id, ?plan, %expires_at, "premium granted");
        Ok(expires_at)
    }

    /// Credits a referrer for one successful referral.
    pub async fn grant_referral_bonus(&self, referrer_id: UserId, bonus: u32) -> Result<()> {
        let _guard = self.row_lock(referrer_id).await;
        let now = self.clock.now();
        let mut row = self.load_current(referrer_id, now).await?;
        row.referral_count += 1;
        row.bonus_credits += bonus;
        self.store.store(row).await?;
        info!(referrer_id, bonus, "referral bonus granted");
        Ok(())
    }

    /// Stamps who referred `user_id`. First writer wins; uniqueness of the
    /// link itself is enforced by the referral store.
    pub async fn set_referrer(&self, user_id: UserId, referrer_id: UserId) -> Result<()> {
        let _guard = self.row_lock(user_id).await;
        let now = self.clock.now();
        let mut row = self.load_current(user_id, now).await?;
        if row.referrer_id.is_none() {
            row.referrer_id = Some(referrer_id);
        }
        self.store.store(row).await?;
        Ok(())
    }

    /// Read-only view after the same implicit reset as `check_admission`.
    pub async fn snapshot(&self, user_id: UserId) -> Result<EntitlementSnapshot> {
        let _guard = self.row_lock(user_id).await;
        let now = self.clock.now();
        let row = self.load_current(user_id, now).await?;
        self.store.store(row.clone()).await?;
        Ok(row.snapshot(now))
    }

    /// Snapshots for every known user, sorted by user id. Reporting only;
    /// resets are applied to the view but not written back.
    pub async fn all_snapshots(&self) -> Result<Vec<EntitlementSnapshot>> {
        let now = self.clock.now();
        let mut rows = self.store.get_all().await?;
        rows.sort_by_key(|row| row.user_id);
        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.roll_day(now.date_naive());
                row.snapshot(now)
            })
            .collect())
    }
}
