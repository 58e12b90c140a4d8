use crate::application::ledger::EntitlementLedger;
use crate::application::payments::PaymentWorkflow;
use crate::application::referrals::ReferralAccounting;
use crate::application::sessions::{ClaimOutcome, SessionRegistry, StageOutcome};
use crate::domain::entitlement::{PremiumPlan, UserId};
use crate::domain::event::{Event, Reply};
use crate::domain::payment::DecisionOutcome;
use crate::domain::ports::{
    HistoryStoreBox, SharedClock, SharedMediaStore, SharedMessenger, SharedTranscoder,
};
use crate::domain::session::{BlobRef, EffectPreset, HistoryRecord, MediaKind, StagedMedia};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const MSG_CHOOSE_EFFECT: &str = "Got it! Pick an effect (1-5).";
pub const MSG_BUSY: &str = "You already have media waiting. Pick an effect for it first.";
pub const MSG_LIMIT_REACHED: &str =
    "Daily limit reached. Invite friends or go premium to keep going.";
pub const MSG_STALE: &str = "Nothing is staged right now. Send a photo or video first.";
pub const MSG_IN_FLIGHT: &str = "Still processing your previous kruzhok, hang on.";
pub const MSG_PROCESSING: &str = "Applying the effect...";
pub const MSG_FAILED: &str = "Processing failed. Please try again.";
pub const MSG_UNKNOWN_EFFECT: &str = "Unknown effect. Pick one of 1-5.";
pub const MSG_RECEIPT_RECEIVED: &str =
    "Receipt received! Premium activates once an admin approves it.";
pub const MSG_PAYMENT_APPROVED: &str = "Your payment was approved. Premium is active!";
pub const MSG_REFERRAL_SUCCESS: &str = "Referral success! You earned 3 bonus kruzhoks.";

/// Drives the whole pipeline from inbound messenger events: session
/// transitions, ledger admission and consumption, transcoding, payment
/// decisions and referral grants.
///
/// Events for the same user are serialized through the registry's per-user
/// lock, except across the transcode call itself: the lock is dropped while
/// ffmpeg runs and re-acquired for the final transition, so a slow transcode
/// never blocks that user's ledger row (or the admin path touching it).
pub struct Orchestrator {
    ledger: Arc<EntitlementLedger>,
    sessions: Arc<SessionRegistry>,
    payments: Arc<PaymentWorkflow>,
    referrals: Arc<ReferralAccounting>,
    transcoder: SharedTranscoder,
    messenger: SharedMessenger,
    media: SharedMediaStore,
    history: HistoryStoreBox,
    clock: SharedClock,
    admin_chat: Option<UserId>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<EntitlementLedger>,
        sessions: Arc<SessionRegistry>,
        payments: Arc<PaymentWorkflow>,
        referrals: Arc<ReferralAccounting>,
        transcoder: SharedTranscoder,
        messenger: SharedMessenger,
        media: SharedMediaStore,
        history: HistoryStoreBox,
        clock: SharedClock,
        admin_chat: Option<UserId>,
    ) -> Self {
        Self {
            ledger,
            sessions,
            payments,
            referrals,
            transcoder,
            messenger,
            media,
            history,
            clock,
            admin_chat,
        }
    }

    pub async fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::NewMedia {
                user_id,
                kind,
                blob,
                duration_secs,
            } => self.handle_new_media(user_id, kind, blob, duration_secs).await,
            Event::EffectChosen { user_id, effect_id } => {
                self.handle_effect_chosen(user_id, effect_id).await
            }
            Event::ReceiptSubmitted {
                user_id,
                plan,
                receipt,
            } => self.handle_receipt(user_id, plan, receipt).await,
            Event::AdminDecision {
                request_id,
                approve,
                note,
            } => self.handle_admin_decision(request_id, approve, note).await,
            Event::ReferralArrival {
                referrer_id,
                referred_id,
            } => self.handle_referral(referrer_id, referred_id).await,
        }
    }

    /// Force-expires inactive sessions, releasing their staged media.
    /// Returns how many were reclaimed.
    pub async fn sweep_sessions(&self) -> usize {
        self.sessions.expire_stale(self.clock.now()).await.len()
    }

    async fn handle_new_media(
        &self,
        user_id: UserId,
        kind: MediaKind,
        blob: BlobRef,
        duration_secs: u32,
    ) -> Result<()> {
        let _guard = self.sessions.lock_user(user_id).await;
        let now = self.clock.now();

        if self.sessions.is_live(user_id).await {
            // Explicit busy reject: the first staged media stays in place.
            self.media.discard(&blob).await?;
            self.notify(text(user_id, MSG_BUSY)).await;
            return Ok(());
        }

        if !self.ledger.check_admission(user_id).await? {
            self.media.discard(&blob).await?;
            info!(user_id, "admission denied");
            self.notify(text(user_id, MSG_LIMIT_REACHED)).await;
            return Ok(());
        }

        let media = StagedMedia {
            blob,
            kind,
            duration_secs,
        };
        if self.sessions.stage(user_id, media, now).await == StageOutcome::Busy {
            // Unreachable while the user lock is held; recover anyway.
            warn!(user_id, "stage raced with a live session");
            self.notify(text(user_id, MSG_BUSY)).await;
            return Ok(());
        }
        self.notify(text(user_id, MSG_CHOOSE_EFFECT)).await;
        Ok(())
    }

    async fn handle_effect_chosen(&self, user_id: UserId, effect_id: u8) -> Result<()> {
        let Some(effect) = EffectPreset::from_id(effect_id) else {
            self.notify(text(user_id, MSG_UNKNOWN_EFFECT)).await;
            return Ok(());
        };

        let claim = {
            let _guard = self.sessions.lock_user(user_id).await;
            self.sessions
                .claim_for_processing(user_id, self.clock.now())
                .await
        };
        let (media, generation) = match claim {
            ClaimOutcome::Stale => {
                self.notify(text(user_id, MSG_STALE)).await;
                return Ok(());
            }
            ClaimOutcome::InFlight => {
                self.notify(text(user_id, MSG_IN_FLIGHT)).await;
                return Ok(());
            }
            ClaimOutcome::Claimed { media, generation } => (media, generation),
        };
        self.notify(text(user_id, MSG_PROCESSING)).await;

        // No per-user lock held here: the transcode is the long pole and
        // must not serialize against this user's other traffic.
        let transcoded = self
            .transcoder
            .transform(&media.blob, media.kind, effect, media.clip_duration())
            .await;

        let _guard = self.sessions.lock_user(user_id).await;
        if self.sessions.finish(user_id, generation).await.is_none() {
            // The session timed out while we were transcoding; the sweep
            // already released the input. No consume, no delivery.
            warn!(user_id, "transcode finished after session expiry, discarding result");
            if let Ok(output) = transcoded {
                self.media.discard(&output).await?;
            }
            return Ok(());
        }

        match transcoded {
            Ok(output) => {
                // Consume before delivery: a crash in between must never
                // leave a delivered kruzhok unbilled.
                self.ledger.consume(user_id).await?;
                self.history
                    .append(HistoryRecord {
                        user_id,
                        output: output.clone(),
                        effect,
                        kind: media.kind,
                        created_at: self.clock.now(),
                    })
                    .await?;
                info!(user_id, effect = effect.id(), "kruzhok produced");
                self.notify(Reply::MediaNote {
                    chat: user_id,
                    blob: output.clone(),
                    duration_cap_secs: media.clip_duration(),
                })
                .await;
                let snap = self.ledger.snapshot(user_id).await?;
                let status = if snap.is_premium_effective {
                    "Done! Premium: unlimited kruzhoks.".to_string()
                } else {
                    format!("Done! Remaining today: {}.", snap.remaining())
                };
                self.notify(text(user_id, status)).await;
                self.media.discard(&media.blob).await?;
                self.media.discard(&output).await?;
            }
            Err(e) => {
                info!(user_id, reason = %e.reason, "transcode failed");
                self.notify(text(user_id, MSG_FAILED)).await;
                self.media.discard(&media.blob).await?;
            }
        }
        Ok(())
    }

    async fn handle_receipt(
        &self,
        user_id: UserId,
        plan: PremiumPlan,
        receipt: BlobRef,
    ) -> Result<()> {
        let request = self.payments.submit(user_id, plan, receipt).await?;
        self.notify(text(user_id, MSG_RECEIPT_RECEIVED)).await;
        self.notify_admin(format!(
            "New payment request #{} from user {}: {} som ({:?})",
            request.id, request.user_id, request.amount_som, request.plan
        ))
        .await;
        Ok(())
    }

    async fn handle_admin_decision(
        &self,
        request_id: u64,
        approve: bool,
        note: Option<String>,
    ) -> Result<()> {
        let outcome = if approve {
            self.payments.approve(request_id, note).await?
        } else {
            let reason = note.unwrap_or_else(|| "rejected".to_string());
            self.payments.reject(request_id, reason).await?
        };

        match outcome {
            DecisionOutcome::Applied(request) => {
                let body = if approve {
                    MSG_PAYMENT_APPROVED.to_string()
                } else {
                    format!(
                        "Your payment was rejected: {}",
                        request.admin_response.as_deref().unwrap_or("no reason given")
                    )
                };
                self.notify(text(request.user_id, body)).await;
                self.notify_admin(format!(
                    "Payment request #{request_id} {}",
                    if approve { "approved" } else { "rejected" }
                ))
                .await;
            }
            DecisionOutcome::AlreadyProcessed(request) => {
                // Success-no-op by contract; only the admin hears about it.
                self.notify_admin(format!(
                    "Payment request #{request_id} was already processed ({:?})",
                    request.status
                ))
                .await;
            }
            DecisionOutcome::NotFound => {
                self.notify_admin(format!("Payment request #{request_id} not found"))
                    .await;
            }
        }
        Ok(())
    }

    async fn handle_referral(&self, referrer_id: UserId, referred_id: UserId) -> Result<()> {
        if self.referrals.link_referral(referrer_id, referred_id).await? {
            // Best-effort ping; the link and bonus stand regardless.
            self.notify(text(referrer_id, MSG_REFERRAL_SUCCESS)).await;
        }
        Ok(())
    }

    /// Best-effort send: delivery failures are logged and never roll back
    /// the state transition they report on.
    async fn notify(&self, reply: Reply) {
        if let Err(e) = self.messenger.send(reply).await {
            warn!(error = %e, "reply delivery failed");
        }
    }

    async fn notify_admin(&self, body: String) {
        if let Some(admin) = self.admin_chat {
            self.notify(text(admin, body)).await;
        }
    }
}

fn text(chat: UserId, body: impl Into<String>) -> Reply {
    Reply::Text {
        chat,
        body: body.into(),
    }
}
