use chrono::{Duration, TimeZone, Utc};
use kruzhok::application::ledger::EntitlementLedger;
use kruzhok::application::orchestrator::Orchestrator;
use kruzhok::application::payments::PaymentWorkflow;
use kruzhok::application::referrals::ReferralAccounting;
use kruzhok::application::sessions::SessionRegistry;
use kruzhok::domain::event::Event;
use kruzhok::domain::ports::SharedTranscoder;
use kruzhok::domain::session::{BlobRef, MediaKind};
use kruzhok::infrastructure::clock::ManualClock;
use kruzhok::infrastructure::in_memory::{
    InMemoryEntitlementStore, InMemoryHistoryStore, InMemoryMediaStore, InMemoryPaymentStore,
    InMemoryReferralStore,
};
use kruzhok::infrastructure::messenger::RecordingMessenger;
use kruzhok::infrastructure::transcode::StubTranscoder;
use std::sync::Arc;

/// Chat id the test engine reports admin traffic to.
pub const ADMIN: i64 = 999;

/// A fully wired in-process engine on a manual clock, with recording
/// doubles for everything that would otherwise touch the outside world.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub messenger: RecordingMessenger,
    pub media: Arc<InMemoryMediaStore>,
    pub history: InMemoryHistoryStore,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<EntitlementLedger>,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(StubTranscoder::new()), Duration::minutes(10))
}

pub fn harness_with(transcoder: SharedTranscoder, session_timeout: Duration) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
    ));
    let media = Arc::new(InMemoryMediaStore::new());
    let messenger = RecordingMessenger::new();
    let ledger = Arc::new(EntitlementLedger::new(
        Box::new(InMemoryEntitlementStore::new()),
        clock.clone(),
    ));
    let sessions = Arc::new(SessionRegistry::new(media.clone(), session_timeout));
    let payments = Arc::new(PaymentWorkflow::new(
        Box::new(InMemoryPaymentStore::new()),
        ledger.clone(),
        clock.clone(),
    ));
    let referrals = Arc::new(ReferralAccounting::new(
        Box::new(InMemoryReferralStore::new()),
        ledger.clone(),
        clock.clone(),
    ));
    let history = InMemoryHistoryStore::new();
    let orchestrator = Arc::new(Orchestrator::new(
        ledger.clone(),
        sessions,
        payments,
        referrals,
        transcoder,
        Arc::new(messenger.clone()),
        media.clone(),
        Box::new(history.clone()),
        clock.clone(),
        Some(ADMIN),
    ));
    Harness {
        orchestrator,
        messenger,
        media,
        history,
        clock,
        ledger,
    }
}

/// Registers `blob` as live media and sends it in as a video upload.
pub async fn upload(h: &Harness, user: i64, blob: &str) {
    h.media.register(BlobRef::new(blob)).await;
    h.orchestrator
        .handle_event(Event::NewMedia {
            user_id: user,
            kind: MediaKind::Video,
            blob: BlobRef::new(blob),
            duration_secs: 10,
        })
        .await
        .unwrap();
}

/// Uploads `blob` and immediately picks an effect for it.
pub async fn produce(h: &Harness, user: i64, blob: &str, effect_id: u8) {
    upload(h, user, blob).await;
    h.orchestrator
        .handle_event(Event::EffectChosen { user_id: user, effect_id })
        .await
        .unwrap();
}
