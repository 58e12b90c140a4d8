use crate::application::ledger::EntitlementLedger;
use crate::domain::entitlement::{REFERRAL_BONUS, ReferralLink, UserId};
use crate::domain::ports::{ReferralStoreBox, SharedClock};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// One-time referral linking.
///
/// A user can be referred at most once, ever. The store's insert-if-absent
/// (keyed on the referred user) decides the winner under concurrent
/// attempts; only the winning call grants the referrer's bonus.
pub struct ReferralAccounting {
    store: ReferralStoreBox,
    ledger: Arc<EntitlementLedger>,
    clock: SharedClock,
}

impl ReferralAccounting {
    pub fn new(store: ReferralStoreBox, ledger: Arc<EntitlementLedger>, clock: SharedClock) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Links `referred_id` to `referrer_id` and grants the referral bonus.
    /// Returns false (no mutation) on self-referral or when the referred
    /// user already has a link.
    pub async fn link_referral(&self, referrer_id: UserId, referred_id: UserId) -> Result<bool> {
        if referrer_id == referred_id {
            return Ok(false);
        }

        let link = ReferralLink {
            referrer_id,
            referred_id,
            bonus_granted: REFERRAL_BONUS,
            created_at: self.clock.now(),
        };
        if !self.store.insert_if_absent(link).await? {
            return Ok(false);
        }

        self.ledger
            .grant_referral_bonus(referrer_id, REFERRAL_BONUS)
            .await?;
        self.ledger.set_referrer(referred_id, referrer_id).await?;
        info!(referrer_id, referred_id, "referral linked");
        Ok(true)
    }
}
