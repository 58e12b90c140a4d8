use crate::domain::entitlement::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque reference to a media blob (a file id, path, or object key,
/// depending on the adapter behind it).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// A still photo becomes a short looped clip.
pub const PHOTO_CLIP_SECONDS: u32 = 5;

/// Hard cap on kruzhok duration.
pub const MAX_CLIP_SECONDS: u32 = 60;

/// Closed set of rendering presets, identified on the wire by 1..=5.
///
/// What each preset does to the pixels is a transcoder detail; the state
/// machine only routes the identifier.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EffectPreset {
    Simple,
    Zoom,
    Blur,
    HueCycle,
    Rotate,
}

impl EffectPreset {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(EffectPreset::Simple),
            2 => Some(EffectPreset::Zoom),
            3 => Some(EffectPreset::Blur),
            4 => Some(EffectPreset::HueCycle),
            5 => Some(EffectPreset::Rotate),
            _ => None,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            EffectPreset::Simple => 1,
            EffectPreset::Zoom => 2,
            EffectPreset::Blur => 3,
            EffectPreset::HueCycle => 4,
            EffectPreset::Rotate => 5,
        }
    }
}

/// Media accepted into a session and waiting for (or undergoing) processing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StagedMedia {
    pub blob: BlobRef,
    pub kind: MediaKind,
    pub duration_secs: u32,
}

impl StagedMedia {
    /// Duration the produced kruzhok is capped to.
    pub fn clip_duration(&self) -> u32 {
        match self.kind {
            MediaKind::Photo => PHOTO_CLIP_SECONDS,
            MediaKind::Video => self.duration_secs.min(MAX_CLIP_SECONDS),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    AwaitingEffect,
    Processing,
}

/// Transient per-user workflow state. At most one live session per user;
/// a user with no session is Idle.
///
/// `generation` is a registry-wide monotone token: a transcode that outlives
/// its session (expired or replaced meanwhile) fails the generation check on
/// completion and its result is discarded.
#[derive(Debug, PartialEq, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub state: SessionState,
    pub media: StagedMedia,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Audit row for one delivered kruzhok. Rows are append-only and survive
/// the output blob itself, which is released right after delivery.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct HistoryRecord {
    pub user_id: UserId,
    pub output: BlobRef,
    pub effect: EffectPreset,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
}
