use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Chat-platform user identifier.
pub type UserId = i64;

/// Daily allowance for non-premium users.
pub const DEFAULT_DAILY_LIMIT: u32 = 5;

/// Bonus credits granted to a referrer per successful referral.
pub const REFERRAL_BONUS: u32 = 3;

/// Paid subscription plan.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PremiumPlan {
    Weekly,
    Monthly,
}

impl PremiumPlan {
    /// How long the plan extends premium for.
    pub fn duration(&self) -> Duration {
        match self {
            PremiumPlan::Weekly => Duration::days(7),
            PremiumPlan::Monthly => Duration::days(30),
        }
    }

    /// Plan price in som.
    pub fn price_som(&self) -> i64 {
        match self {
            PremiumPlan::Weekly => 5000,
            PremiumPlan::Monthly => 15000,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(PremiumPlan::Weekly),
            "monthly" => Some(PremiumPlan::Monthly),
            _ => None,
        }
    }
}

/// Per-user quota and subscription state.
///
/// One row per user, created lazily on the first quota check or referral
/// event and never deleted. Quota accounting works in whole units: a unit is
/// the right to produce one kruzhok. Bonus credits (earned via referrals) are
/// drained before the daily base allowance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserEntitlement {
    pub user_id: UserId,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub bonus_credits: u32,
    pub last_reset_date: NaiveDate,
    pub referrer_id: Option<UserId>,
    pub referral_count: u32,
    pub created_at: DateTime<Utc>,
}

impl UserEntitlement {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_premium: false,
            premium_expires_at: None,
            daily_used: 0,
            daily_limit: DEFAULT_DAILY_LIMIT,
            bonus_credits: 0,
            last_reset_date: now.date_naive(),
            referrer_id: None,
            referral_count: 0,
            created_at: now,
        }
    }

    /// Premium counts only while unexpired (no expiry means indefinite).
    pub fn is_premium_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.is_none_or(|at| at > now)
    }

    /// Applies the implicit daily reset. Returns true if the row changed and
    /// must be written back.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date < today {
            self.daily_used = 0;
            self.last_reset_date = today;
            true
        } else {
            false
        }
    }

    /// Whether one more unit of work may be admitted. Assumes `roll_day` has
    /// already run for `now`.
    pub fn may_admit(&self, now: DateTime<Utc>) -> bool {
        self.is_premium_effective(now) || self.daily_used < self.daily_limit + self.bonus_credits
    }

    /// Records one consumed unit, draining bonus credits before the daily
    /// base allowance.
    pub fn consume_one(&mut self) {
        if self.bonus_credits > 0 {
            self.bonus_credits -= 1;
        } else {
            self.daily_used += 1;
        }
    }

    /// Activates or extends premium for `plan`.
    ///
    /// When premium is already active the extension is anchored at the
    /// current expiry rather than `now`, so remaining paid time is kept.
    pub fn extend_premium(&mut self, plan: PremiumPlan, now: DateTime<Utc>) {
        let base = match self.premium_expires_at {
            Some(at) if self.is_premium && at > now => at,
            _ => now,
        };
        self.is_premium = true;
        self.premium_expires_at = Some(base + plan.duration());
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> EntitlementSnapshot {
        EntitlementSnapshot {
            user_id: self.user_id,
            daily_used: self.daily_used,
            daily_limit: self.daily_limit,
            bonus_credits: self.bonus_credits,
            is_premium_effective: self.is_premium_effective(now),
            referral_count: self.referral_count,
        }
    }
}

/// Read-only view of a user's current limits, reported after the implicit
/// daily reset has been applied.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EntitlementSnapshot {
    pub user_id: UserId,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub bonus_credits: u32,
    pub is_premium_effective: bool,
    pub referral_count: u32,
}

impl EntitlementSnapshot {
    /// Units still available today (meaningless for premium users).
    pub fn remaining(&self) -> u32 {
        (self.daily_limit + self.bonus_credits).saturating_sub(self.daily_used)
    }
}

/// Immutable record of a one-time referral. At most one link may ever exist
/// per referred user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ReferralLink {
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub bonus_granted: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_row_defaults() {
        let row = UserEntitlement::new(7, t0());
        assert_eq!(row.daily_limit, DEFAULT_DAILY_LIMIT);
        assert_eq!(row.daily_used, 0);
        assert_eq!(row.bonus_credits, 0);
        assert!(!row.is_premium_effective(t0()));
        assert!(row.may_admit(t0()));
    }

    #[test]
    fn test_consume_drains_bonus_first() {
        let mut row = UserEntitlement::new(1, t0());
        row.bonus_credits = 2;

        row.consume_one();
        row.consume_one();
        row.consume_one();

        assert_eq!(row.bonus_credits, 0);
        assert_eq!(row.daily_used, 1);
    }

    #[test]
    fn test_roll_day_resets_used_only() {
        let mut row = UserEntitlement::new(1, t0());
        row.daily_used = 5;
        row.bonus_credits = 2;

        assert!(!row.roll_day(t0().date_naive()));
        assert_eq!(row.daily_used, 5);

        let tomorrow = t0().date_naive().succ_opt().unwrap();
        assert!(row.roll_day(tomorrow));
        assert_eq!(row.daily_used, 0);
        assert_eq!(row.bonus_credits, 2);
        assert_eq!(row.last_reset_date, tomorrow);
    }

    #[test]
    fn test_premium_admits_past_limit() {
        let mut row = UserEntitlement::new(1, t0());
        row.daily_used = row.daily_limit;
        assert!(!row.may_admit(t0()));

        row.extend_premium(PremiumPlan::Weekly, t0());
        assert!(row.may_admit(t0()));
    }

    #[test]
    fn test_premium_expiry() {
        let mut row = UserEntitlement::new(1, t0());
        row.extend_premium(PremiumPlan::Weekly, t0());

        assert!(row.is_premium_effective(t0()));
        let later = t0() + Duration::days(8);
        assert!(!row.is_premium_effective(later));
    }

    #[test]
    fn test_extend_premium_keeps_remaining_time() {
        let mut row = UserEntitlement::new(1, t0());
        row.extend_premium(PremiumPlan::Weekly, t0());
        // Buy a month three days in: expiry anchors at the old expiry.
        let later = t0() + Duration::days(3);
        row.extend_premium(PremiumPlan::Monthly, later);

        assert_eq!(
            row.premium_expires_at,
            Some(t0() + Duration::days(7) + Duration::days(30))
        );
    }

    #[test]
    fn test_extend_premium_after_lapse_anchors_at_now() {
        let mut row = UserEntitlement::new(1, t0());
        row.extend_premium(PremiumPlan::Weekly, t0());
        let later = t0() + Duration::days(20);
        row.extend_premium(PremiumPlan::Weekly, later);

        assert_eq!(row.premium_expires_at, Some(later + Duration::days(7)));
    }

    #[test]
    fn test_snapshot_remaining() {
        let mut row = UserEntitlement::new(1, t0());
        row.daily_used = 3;
        row.bonus_credits = 2;
        let snap = row.snapshot(t0());
        assert_eq!(snap.remaining(), 4);
        assert!(!snap.is_premium_effective);
    }
}
