use crate::domain::entitlement::{PremiumPlan, UserId};
use crate::domain::session::{BlobRef, MediaKind};

/// Inbound event delivered by the messenger transport.
///
/// Delivery is at-least-once; handlers are expected to be idempotent at the
/// entity level (decided payments and existing referral links are no-ops).
#[derive(Debug, PartialEq, Clone)]
pub enum Event {
    /// A photo or video arrived from a user.
    NewMedia {
        user_id: UserId,
        kind: MediaKind,
        blob: BlobRef,
        duration_secs: u32,
    },
    /// The user picked an effect for their staged media.
    EffectChosen { user_id: UserId, effect_id: u8 },
    /// A payment receipt arrived from a user.
    ReceiptSubmitted {
        user_id: UserId,
        plan: PremiumPlan,
        receipt: BlobRef,
    },
    /// An admin decided a pending payment request.
    AdminDecision {
        request_id: u64,
        approve: bool,
        note: Option<String>,
    },
    /// A new user arrived through a referral deep link.
    ReferralArrival {
        referrer_id: UserId,
        referred_id: UserId,
    },
}

/// Outbound reply handed to the messenger transport.
#[derive(Debug, PartialEq, Clone)]
pub enum Reply {
    Text { chat: UserId, body: String },
    MediaNote {
        chat: UserId,
        blob: BlobRef,
        duration_cap_secs: u32,
    },
}

impl Reply {
    pub fn chat(&self) -> UserId {
        match self {
            Reply::Text { chat, .. } | Reply::MediaNote { chat, .. } => *chat,
        }
    }
}
