use crate::domain::ports::{TranscodeError, Transcoder};
use crate::domain::session::{BlobRef, EffectPreset, MediaKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::info;

const COMMON_SCALE: &str = "scale=480:480:force_original_aspect_ratio=increase,crop=480:480";

/// ffmpeg filter chain for a preset. Photo inputs loop into a short clip and
/// use slightly stronger parameters so the effect is visible at 5 seconds.
fn filter_chain(kind: MediaKind, effect: EffectPreset) -> String {
    let styled = match (kind, effect) {
        (_, EffectPreset::Simple) => String::new(),
        (MediaKind::Video, EffectPreset::Zoom) => {
            ",zoompan=z='min(zoom+0.0015,1.5)':d=1:x=iw/2-(iw/zoom/2):y=ih/2-(ih/zoom/2)".into()
        }
        (MediaKind::Photo, EffectPreset::Zoom) => {
            ",zoompan=z='min(zoom+0.002,1.8)':d=1:x=iw/2-(iw/zoom/2):y=ih/2-(ih/zoom/2)".into()
        }
        (MediaKind::Video, EffectPreset::Blur) => ",gblur=sigma=2:steps=1".into(),
        (MediaKind::Photo, EffectPreset::Blur) => ",gblur=sigma=3:steps=2".into(),
        (MediaKind::Video, EffectPreset::HueCycle) => ",hue=h=sin(2*PI*t)*360:s=1.5".into(),
        (MediaKind::Photo, EffectPreset::HueCycle) => ",hue=h=sin(2*PI*t/3)*180:s=1.3".into(),
        (MediaKind::Video, EffectPreset::Rotate) => ",rotate=PI*t/5".into(),
        (MediaKind::Photo, EffectPreset::Rotate) => ",rotate=PI*t/3".into(),
    };
    format!("{COMMON_SCALE}{styled},format=yuv420p")
}

/// Produces circular-clip MP4s by shelling out to ffmpeg.
///
/// Blob refs are interpreted as filesystem paths; outputs land in an owned
/// temporary directory that lives as long as the transcoder.
pub struct FfmpegTranscoder {
    workdir: tempfile::TempDir,
    seq: AtomicU64,
}

impl FfmpegTranscoder {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            workdir: tempfile::tempdir()?,
            seq: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transform(
        &self,
        input: &BlobRef,
        kind: MediaKind,
        effect: EffectPreset,
        duration_cap_secs: u32,
    ) -> std::result::Result<BlobRef, TranscodeError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let output = self.workdir.path().join(format!("kruzhok-{n}.mp4"));
        let filter = filter_chain(kind, effect);

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y");
        if kind == MediaKind::Photo {
            cmd.args(["-loop", "1"]);
        }
        cmd.args(["-i", input.as_str()])
            .args(["-t", &duration_cap_secs.to_string()])
            .args(["-vf", &filter])
            .args(["-c:v", "libx264"]);
        match kind {
            MediaKind::Video => {
                cmd.args(["-c:a", "aac", "-b:a", "128k", "-ar", "44100", "-ac", "2"]);
            }
            MediaKind::Photo => {
                cmd.args(["-pix_fmt", "yuv420p", "-r", "25"]);
            }
        }
        cmd.args(["-preset", "fast", "-crf", "23"]).arg(&output);

        info!(input = input.as_str(), ?effect, "running ffmpeg");
        let result = cmd
            .output()
            .await
            .map_err(|e| TranscodeError::new(format!("failed to spawn ffmpeg: {e}")))?;

        if result.status.success() {
            Ok(BlobRef::new(output.to_string_lossy()))
        } else {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            Err(TranscodeError::new(format!(
                "ffmpeg exited with {}: {tail}",
                result.status
            )))
        }
    }
}

/// Deterministic transcoder for tests and replay: derives the output blob
/// ref from the input and effect without touching any media.
#[derive(Default)]
pub struct StubTranscoder {
    fail_reason: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

impl StubTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stub whose every transform fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_reason: Some(reason.into()),
            gate: None,
        }
    }

    /// A stub that blocks each transform until a permit is added to `gate`,
    /// letting tests hold a transcode in flight.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            fail_reason: None,
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transform(
        &self,
        input: &BlobRef,
        _kind: MediaKind,
        effect: EffectPreset,
        _duration_cap_secs: u32,
    ) -> std::result::Result<BlobRef, TranscodeError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| TranscodeError::new("gate closed"))?
                .forget();
        }
        if let Some(reason) = &self.fail_reason {
            return Err(TranscodeError::new(reason.clone()));
        }
        Ok(BlobRef::new(format!(
            "kruzhok:{}:{}",
            effect.id(),
            input.as_str()
        )))
    }
}
