use crate::application::ledger::EntitlementLedger;
use crate::domain::entitlement::{PremiumPlan, UserId};
use crate::domain::payment::{DecisionOutcome, PaymentRequest, PaymentStatus};
use crate::domain::ports::{PaymentStoreBox, SharedClock};
use crate::domain::session::BlobRef;
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// The payment approval workflow.
///
/// Submissions create a Pending request without touching the ledger. The
/// exactly-once side-effect guarantee on approval rests on the store's
/// compare-and-set: only the decision that actually moved the row out of
/// Pending applies `grant_premium`, so two racing admins cannot double-grant.
pub struct PaymentWorkflow {
    store: PaymentStoreBox,
    ledger: Arc<EntitlementLedger>,
    clock: SharedClock,
}

impl PaymentWorkflow {
    pub fn new(store: PaymentStoreBox, ledger: Arc<EntitlementLedger>, clock: SharedClock) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Records a submitted receipt as a Pending request.
    pub async fn submit(
        &self,
        user_id: UserId,
        plan: PremiumPlan,
        receipt: BlobRef,
    ) -> Result<PaymentRequest> {
        let request = self
            .store
            .create(user_id, plan.price_som(), plan, receipt, self.clock.now())
            .await?;
        info!(request_id = request.id, user_id, ?plan, "payment request submitted");
        Ok(request)
    }

    /// Approves a Pending request and grants premium exactly once.
    pub async fn approve(&self, request_id: u64, note: Option<String>) -> Result<DecisionOutcome> {
        let outcome = self
            .store
            .decide_if_pending(request_id, PaymentStatus::Approved, note, self.clock.now())
            .await?;
        if let DecisionOutcome::Applied(request) = &outcome {
            self.ledger
                .grant_premium(request.user_id, request.plan)
                .await?;
            info!(request_id, user_id = request.user_id, "payment approved");
        }
        Ok(outcome)
    }

    /// Rejects a Pending request. No ledger side-effect.
    pub async fn reject(&self, request_id: u64, reason: String) -> Result<DecisionOutcome> {
        let outcome = self
            .store
            .decide_if_pending(
                request_id,
                PaymentStatus::Rejected,
                Some(reason),
                self.clock.now(),
            )
            .await?;
        if let DecisionOutcome::Applied(request) = &outcome {
            info!(request_id, user_id = request.user_id, "payment rejected");
        }
        Ok(outcome)
    }

    /// Pending requests for the admin surface, oldest first.
    pub async fn pending(&self) -> Result<Vec<PaymentRequest>> {
        self.store.pending().await
    }

    pub async fn get(&self, request_id: u64) -> Result<Option<PaymentRequest>> {
        self.store.get(request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::EntitlementStore;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::{InMemoryEntitlementStore, InMemoryPaymentStore};
    use chrono::{Duration, TimeZone, Utc};

    fn workflow() -> (PaymentWorkflow, Arc<EntitlementLedger>, InMemoryEntitlementStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        ));
        let store = InMemoryEntitlementStore::new();
        let ledger = Arc::new(EntitlementLedger::new(Box::new(store.clone()), clock.clone()));
        let workflow = PaymentWorkflow::new(
            Box::new(InMemoryPaymentStore::new()),
            ledger.clone(),
            clock,
        );
        (workflow, ledger, store)
    }

    #[tokio::test]
    async fn test_submit_does_not_touch_ledger() {
        let (workflow, ledger, _store) = workflow();
        workflow
            .submit(1, PremiumPlan::Weekly, BlobRef::new("receipt"))
            .await
            .unwrap();

        let snap = ledger.snapshot(1).await.unwrap();
        assert!(!snap.is_premium_effective);
        assert_eq!(workflow.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_approve_grants_premium_once() {
        let (workflow, ledger, _store) = workflow();
        let request = workflow
            .submit(1, PremiumPlan::Weekly, BlobRef::new("receipt"))
            .await
            .unwrap();

        let first = workflow.approve(request.id, None).await.unwrap();
        assert!(matches!(first, DecisionOutcome::Applied(_)));

        let expiry_after_first = ledger.snapshot(1).await.unwrap();
        assert!(expiry_after_first.is_premium_effective);

        // Second approval is a no-op: no double extension.
        let second = workflow.approve(request.id, None).await.unwrap();
        assert!(matches!(second, DecisionOutcome::AlreadyProcessed(_)));

        let stored = workflow.get(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn test_double_approve_does_not_extend_expiry() {
        let (workflow, _ledger, store) = workflow();
        let request = workflow
            .submit(1, PremiumPlan::Weekly, BlobRef::new("receipt"))
            .await
            .unwrap();

        workflow.approve(request.id, None).await.unwrap();
        let first_expiry = store.get(1).await.unwrap().unwrap().premium_expires_at;
        assert_eq!(first_expiry, Some(request.created_at + Duration::days(7)));

        workflow.approve(request.id, None).await.unwrap();
        let second_expiry = store.get(1).await.unwrap().unwrap().premium_expires_at;
        assert_eq!(second_expiry, first_expiry);
    }

    #[tokio::test]
    async fn test_reject_has_no_ledger_effect() {
        let (workflow, ledger, _store) = workflow();
        let request = workflow
            .submit(1, PremiumPlan::Monthly, BlobRef::new("receipt"))
            .await
            .unwrap();

        let outcome = workflow
            .reject(request.id, "unreadable receipt".to_string())
            .await
            .unwrap();
        assert!(matches!(outcome, DecisionOutcome::Applied(_)));

        let snap = ledger.snapshot(1).await.unwrap();
        assert!(!snap.is_premium_effective);

        // A later approve cannot resurrect a rejected request.
        let late = workflow.approve(request.id, None).await.unwrap();
        assert!(matches!(late, DecisionOutcome::AlreadyProcessed(_)));
        let stored = workflow.get(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Rejected);
        assert_eq!(stored.admin_response.as_deref(), Some("unreadable receipt"));
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let (workflow, _ledger, _store) = workflow();
        let outcome = workflow.approve(999, None).await.unwrap();
        assert_eq!(outcome, DecisionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_decisions_apply_once() {
        let (workflow, ledger, _store) = workflow();
        let workflow = Arc::new(workflow);
        let request = workflow
            .submit(1, PremiumPlan::Weekly, BlobRef::new("receipt"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let workflow = workflow.clone();
            let id = request.id;
            handles.push(tokio::spawn(
                async move { workflow.approve(id, None).await.unwrap() },
            ));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), DecisionOutcome::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);

        let snap = ledger.snapshot(1).await.unwrap();
        assert!(snap.is_premium_effective);
    }
}
