use crate::domain::entitlement::{PremiumPlan, UserId};
use crate::domain::session::BlobRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A submitted payment receipt awaiting an admin decision.
///
/// Status transitions are monotone: `Pending -> Approved | Rejected`, never
/// back. A decided request is terminal; a second decision is a no-op.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRequest {
    pub id: u64,
    pub user_id: UserId,
    pub amount_som: i64,
    pub plan: PremiumPlan,
    pub receipt: BlobRef,
    pub status: PaymentStatus,
    pub admin_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }
}

/// Result of applying an admin decision to a request.
#[derive(Debug, PartialEq, Clone)]
pub enum DecisionOutcome {
    /// The Pending -> decided transition happened now; side-effects (premium
    /// grant on approval) belong to this caller exactly once.
    Applied(PaymentRequest),
    /// The request had already been decided; current state returned, no
    /// side-effects re-applied.
    AlreadyProcessed(PaymentRequest),
    NotFound,
}
