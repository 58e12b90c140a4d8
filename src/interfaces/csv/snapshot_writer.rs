use crate::domain::entitlement::EntitlementSnapshot;
use crate::error::Result;
use std::io::Write;

/// Writes entitlement snapshots as CSV.
///
/// Serializes via serde, so the header row follows the field names of
/// `EntitlementSnapshot`. Callers are expected to pass rows already sorted
/// by user id for deterministic output.
pub struct SnapshotWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SnapshotWriter<W> {
    /// Creates a new `SnapshotWriter` targeting any `Write` sink (e.g., Stdout).
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes all snapshots and flushes the underlying sink.
    pub fn write_snapshots(&mut self, snapshots: Vec<EntitlementSnapshot>) -> Result<()> {
        for snapshot in snapshots {
            self.writer.serialize(snapshot)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
