mod common;

use chrono::Duration;
use common::{harness, produce, upload, ADMIN};
use kruzhok::application::orchestrator::{MSG_LIMIT_REACHED, MSG_PAYMENT_APPROVED};
use kruzhok::domain::entitlement::PremiumPlan;
use kruzhok::domain::event::Event;
use kruzhok::domain::session::BlobRef;

async fn submit_receipt(h: &common::Harness, user: i64, plan: PremiumPlan) {
    h.orchestrator
        .handle_event(Event::ReceiptSubmitted {
            user_id: user,
            plan,
            receipt: BlobRef::new(format!("receipt-{user}")),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_receipt_alone_grants_nothing() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Weekly).await;

    for i in 0..5 {
        produce(&h, 1, &format!("clip-{i}"), 1).await;
    }
    upload(&h, 1, "denied").await;
    let texts = h.messenger.texts_to(1).await;
    assert!(texts.iter().any(|t| t == MSG_LIMIT_REACHED));

    let snap = h.ledger.snapshot(1).await.unwrap();
    assert!(!snap.is_premium_effective);
}

#[tokio::test]
async fn test_approval_activates_premium() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Weekly).await;
    h.orchestrator
        .handle_event(Event::AdminDecision {
            request_id: 1,
            approve: true,
            note: None,
        })
        .await
        .unwrap();

    let texts = h.messenger.texts_to(1).await;
    assert!(texts.iter().any(|t| t == MSG_PAYMENT_APPROVED));

    // Unlimited now.
    for i in 0..9 {
        produce(&h, 1, &format!("clip-{i}"), 1).await;
    }
    assert_eq!(h.messenger.media_notes_to(1).await, 9);
}

#[tokio::test]
async fn test_replayed_approval_is_a_no_op() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Weekly).await;

    for _ in 0..3 {
        h.orchestrator
            .handle_event(Event::AdminDecision {
                request_id: 1,
                approve: true,
                note: None,
            })
            .await
            .unwrap();
    }

    // The user hears about it exactly once.
    let approvals = h
        .messenger
        .texts_to(1)
        .await
        .iter()
        .filter(|t| *t == MSG_PAYMENT_APPROVED)
        .count();
    assert_eq!(approvals, 1);
    assert!(
        h.messenger
            .texts_to(ADMIN)
            .await
            .iter()
            .any(|t| t.contains("already processed"))
    );

    // Premium lapses after exactly one week, proving a single grant.
    h.clock.advance(Duration::days(7) + Duration::hours(1));
    let snap = h.ledger.snapshot(1).await.unwrap();
    assert!(!snap.is_premium_effective);
}

#[tokio::test]
async fn test_rejection_grants_nothing_and_is_terminal() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Monthly).await;
    h.orchestrator
        .handle_event(Event::AdminDecision {
            request_id: 1,
            approve: false,
            note: Some("unreadable receipt".to_string()),
        })
        .await
        .unwrap();

    let texts = h.messenger.texts_to(1).await;
    assert!(texts.iter().any(|t| t.contains("unreadable receipt")));

    // A later approval of the same request cannot resurrect it.
    h.orchestrator
        .handle_event(Event::AdminDecision {
            request_id: 1,
            approve: true,
            note: None,
        })
        .await
        .unwrap();
    let snap = h.ledger.snapshot(1).await.unwrap();
    assert!(!snap.is_premium_effective);
}

#[tokio::test]
async fn test_decision_on_unknown_request() {
    let h = harness();
    h.orchestrator
        .handle_event(Event::AdminDecision {
            request_id: 7,
            approve: true,
            note: None,
        })
        .await
        .unwrap();
    assert!(
        h.messenger
            .texts_to(ADMIN)
            .await
            .iter()
            .any(|t| t.contains("not found"))
    );
}

#[tokio::test]
async fn test_stacked_plans_extend_from_current_expiry() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Weekly).await;
    submit_receipt(&h, 1, PremiumPlan::Monthly).await;
    for id in [1, 2] {
        h.orchestrator
            .handle_event(Event::AdminDecision {
                request_id: id,
                approve: true,
                note: None,
            })
            .await
            .unwrap();
    }

    // 7 + 30 days of premium, not 30.
    h.clock.advance(Duration::days(36));
    assert!(h.ledger.snapshot(1).await.unwrap().is_premium_effective);
    h.clock.advance(Duration::days(2));
    assert!(!h.ledger.snapshot(1).await.unwrap().is_premium_effective);
}

#[tokio::test]
async fn test_concurrent_decisions_apply_once() {
    let h = harness();
    submit_receipt(&h, 1, PremiumPlan::Weekly).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .handle_event(Event::AdminDecision {
                    request_id: 1,
                    approve: i % 2 == 0,
                    note: None,
                })
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Exactly one decision was applied; the rest were no-ops.
    let decisions = h
        .messenger
        .texts_to(1)
        .await
        .iter()
        .filter(|t| *t == MSG_PAYMENT_APPROVED || t.contains("rejected"))
        .count();
    assert_eq!(decisions, 1);
}
