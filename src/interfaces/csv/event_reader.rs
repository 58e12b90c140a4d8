use crate::domain::entitlement::{PremiumPlan, UserId};
use crate::domain::event::Event;
use crate::domain::session::{BlobRef, MediaKind};
use crate::error::{KruzhokError, Result};
use chrono::Duration;
use serde::Deserialize;
use std::io::Read;

/// One command of a replay script.
#[derive(Debug, PartialEq, Clone)]
pub enum ScriptCommand {
    /// Dispatch an event through the orchestrator.
    Event(Event),
    /// Move the manual clock forward and run a session sweep.
    Advance(Duration),
}

/// Raw script row: `type, user, arg, extra`. Which columns are required
/// depends on the row type, so everything past `type` is optional here and
/// validated during conversion.
#[derive(Debug, Deserialize)]
struct ScriptRecord {
    #[serde(rename = "type")]
    kind: String,
    user: Option<UserId>,
    arg: Option<String>,
    extra: Option<String>,
}

impl ScriptRecord {
    /// Validates the row and converts it into a command. `row` numbers the
    /// record within the script and seeds synthesized blob names, so replays
    /// of the same script are deterministic.
    fn into_command(self, row: usize) -> Result<ScriptCommand> {
        let user = |field: Option<UserId>| {
            field.ok_or_else(|| {
                KruzhokError::ValidationError(format!("row {row}: missing user id"))
            })
        };
        let arg = self.arg.filter(|s| !s.is_empty());
        let extra = self.extra.filter(|s| !s.is_empty());

        match self.kind.as_str() {
            "media" => {
                let kind = match arg.as_deref() {
                    Some("photo") => MediaKind::Photo,
                    Some("video") => MediaKind::Video,
                    other => {
                        return Err(KruzhokError::ValidationError(format!(
                            "row {row}: media kind must be photo or video, got {other:?}"
                        )));
                    }
                };
                let duration_secs = match extra {
                    Some(s) => s.parse().map_err(|_| {
                        KruzhokError::ValidationError(format!(
                            "row {row}: invalid duration {s:?}"
                        ))
                    })?,
                    None => 10,
                };
                Ok(ScriptCommand::Event(Event::NewMedia {
                    user_id: user(self.user)?,
                    kind,
                    blob: BlobRef::new(format!("media-{row}")),
                    duration_secs,
                }))
            }
            "effect" => {
                let effect_id = arg
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        KruzhokError::ValidationError(format!(
                            "row {row}: effect id must be a number"
                        ))
                    })?;
                Ok(ScriptCommand::Event(Event::EffectChosen {
                    user_id: user(self.user)?,
                    effect_id,
                }))
            }
            "receipt" => {
                let plan = arg.as_deref().and_then(PremiumPlan::parse).ok_or_else(|| {
                    KruzhokError::ValidationError(format!(
                        "row {row}: plan must be weekly or monthly"
                    ))
                })?;
                let receipt = extra.unwrap_or_else(|| format!("receipt-{row}"));
                Ok(ScriptCommand::Event(Event::ReceiptSubmitted {
                    user_id: user(self.user)?,
                    plan,
                    receipt: BlobRef::new(receipt),
                }))
            }
            decision @ ("approve" | "reject") => {
                let request_id = arg
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        KruzhokError::ValidationError(format!(
                            "row {row}: request id must be a number"
                        ))
                    })?;
                Ok(ScriptCommand::Event(Event::AdminDecision {
                    request_id,
                    approve: decision == "approve",
                    note: extra,
                }))
            }
            "referral" => {
                let referred_id = arg
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        KruzhokError::ValidationError(format!(
                            "row {row}: referred user id must be a number"
                        ))
                    })?;
                Ok(ScriptCommand::Event(Event::ReferralArrival {
                    referrer_id: user(self.user)?,
                    referred_id,
                }))
            }
            "advance" => {
                let seconds: i64 = arg
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .filter(|s| *s > 0)
                    .ok_or_else(|| {
                        KruzhokError::ValidationError(format!(
                            "row {row}: advance needs a positive number of seconds"
                        ))
                    })?;
                Ok(ScriptCommand::Advance(Duration::seconds(seconds)))
            }
            other => Err(KruzhokError::ValidationError(format!(
                "row {row}: unknown script record type {other:?}"
            ))),
        }
    }
}

/// Reads replay commands from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<ScriptCommand>`.
/// Whitespace is trimmed and short records are tolerated; a malformed row
/// yields an `Err` item without stopping the stream.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates script commands.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptCommand>> {
        self.reader
            .into_deserialize()
            .enumerate()
            .map(|(row, result)| {
                let record: ScriptRecord = result?;
                record.into_command(row + 1)
            })
    }
}
