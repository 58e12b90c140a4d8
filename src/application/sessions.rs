use crate::domain::entitlement::UserId;
use crate::domain::ports::SharedMediaStore;
use crate::domain::session::{Session, SessionState, StagedMedia};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Outcome of staging inbound media.
#[derive(Debug, PartialEq)]
pub enum StageOutcome {
    Staged,
    /// A live session already exists; the new upload is rejected and the
    /// first staged media stays in place.
    Busy,
}

/// Outcome of claiming a session for processing.
#[derive(Debug, PartialEq)]
pub enum ClaimOutcome {
    Claimed { media: StagedMedia, generation: u64 },
    /// A transcode is already running for this user.
    InFlight,
    /// No staged media (never uploaded, or the session expired).
    Stale,
}

/// Registry of per-user transient workflow state.
///
/// A user is Idle exactly when they have no entry here. The registry also
/// hands out the per-user serialization lock the orchestrator holds across
/// admission checks and state transitions (but not across transcodes).
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, Session>>,
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    generation: AtomicU64,
    timeout: Duration,
    media: SharedMediaStore,
}

impl SessionRegistry {
    pub fn new(media: SharedMediaStore, timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(1),
            timeout,
            media,
        }
    }

    /// The per-user critical-section lock. Must not be held across a
    /// transcode call.
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock().await;
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn is_live(&self, user_id: UserId) -> bool {
        self.sessions.lock().await.contains_key(&user_id)
    }

    /// Accepts media into a fresh session in `AwaitingEffect`. Rejects with
    /// `Busy` when any live session exists for the user.
    pub async fn stage(
        &self,
        user_id: UserId,
        media: StagedMedia,
        now: DateTime<Utc>,
    ) -> StageOutcome {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&user_id) {
            return StageOutcome::Busy;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        sessions.insert(
            user_id,
            Session {
                user_id,
                state: SessionState::AwaitingEffect,
                media,
                generation,
                created_at: now,
                last_activity: now,
            },
        );
        StageOutcome::Staged
    }

    /// Moves `AwaitingEffect -> Processing` and hands out the staged media
    /// plus the generation token the caller must present to `finish`.
    pub async fn claim_for_processing(&self, user_id: UserId, now: DateTime<Utc>) -> ClaimOutcome {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&user_id) {
            None => ClaimOutcome::Stale,
            Some(session) if session.state == SessionState::Processing => ClaimOutcome::InFlight,
            Some(session) => {
                session.state = SessionState::Processing;
                session.last_activity = now;
                ClaimOutcome::Claimed {
                    media: session.media.clone(),
                    generation: session.generation,
                }
            }
        }
    }

    /// Removes the session if it is still the one identified by
    /// `generation`. Returns it for resource cleanup; `None` means the
    /// session expired (or was replaced) while the transcode ran and the
    /// caller must discard its result.
    pub async fn finish(&self, user_id: UserId, generation: u64) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&user_id) {
            Some(session) if session.generation == generation => sessions.remove(&user_id),
            _ => None,
        }
    }

    /// Force-expires sessions inactive past the timeout, releasing their
    /// staged media. A failed release is logged and does not stop the sweep
    /// from releasing the rest. Returns the expired sessions.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<Session> {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.lock().await;
            let cutoff: Vec<UserId> = sessions
                .values()
                .filter(|s| s.last_activity + self.timeout <= now)
                .map(|s| s.user_id)
                .collect();
            cutoff
                .into_iter()
                .filter_map(|user_id| sessions.remove(&user_id))
                .collect()
        };
        for session in &expired {
            info!(user_id = session.user_id, "session expired, releasing staged media");
            if let Err(e) = self.media.discard(&session.media.blob).await {
                warn!(user_id = session.user_id, error = %e, "failed to release staged media");
            }
        }
        expired
    }
}
