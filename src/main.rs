use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use kruzhok::application::ledger::EntitlementLedger;
use kruzhok::application::orchestrator::Orchestrator;
use kruzhok::application::payments::PaymentWorkflow;
use kruzhok::application::referrals::ReferralAccounting;
use kruzhok::application::sessions::SessionRegistry;
use kruzhok::domain::event::Event;
use kruzhok::domain::ports::{HistoryStoreBox, SharedClock, SharedTranscoder};
use kruzhok::error::KruzhokError;
use kruzhok::infrastructure::clock::{ManualClock, SystemClock};
use kruzhok::infrastructure::in_memory::{
    InMemoryEntitlementStore, InMemoryHistoryStore, InMemoryMediaStore, InMemoryPaymentStore,
    InMemoryReferralStore,
};
use kruzhok::infrastructure::messenger::ConsoleMessenger;
use kruzhok::infrastructure::transcode::{FfmpegTranscoder, StubTranscoder};
use kruzhok::interfaces::csv::event_reader::{EventReader, ScriptCommand};
use kruzhok::interfaces::csv::snapshot_writer::SnapshotWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input event script CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Inactive sessions are expired after this many seconds
    #[arg(long, default_value_t = 600)]
    session_timeout_secs: i64,

    /// Chat id that receives admin notifications
    #[arg(long)]
    admin_chat: Option<i64>,

    /// Shell out to ffmpeg instead of the built-in stub transcoder
    #[arg(long)]
    ffmpeg: bool,

    /// Use the wall clock instead of the script-driven manual clock
    /// (advance records are then ignored)
    #[arg(long)]
    wall_clock: bool,
}

/// Default replay epoch when running on the manual clock.
fn replay_epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let manual = if cli.wall_clock {
        None
    } else {
        Some(Arc::new(ManualClock::new(replay_epoch())))
    };
    let clock: SharedClock = match &manual {
        Some(manual) => manual.clone(),
        None => Arc::new(SystemClock::new()),
    };

    let media = Arc::new(InMemoryMediaStore::new());
    let transcoder: SharedTranscoder = if cli.ffmpeg {
        Arc::new(FfmpegTranscoder::new().into_diagnostic()?)
    } else {
        Arc::new(StubTranscoder::new())
    };

    let ledger;
    let payments;
    let referrals;
    let history: HistoryStoreBox;
    if let Some(db_path) = cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            use kruzhok::infrastructure::rocksdb::RocksDbStore;
            let store = RocksDbStore::open(db_path).into_diagnostic()?;
            ledger = Arc::new(EntitlementLedger::new(Box::new(store.clone()), clock.clone()));
            payments = Arc::new(PaymentWorkflow::new(
                Box::new(store.clone()),
                ledger.clone(),
                clock.clone(),
            ));
            referrals = Arc::new(ReferralAccounting::new(
                Box::new(store.clone()),
                ledger.clone(),
                clock.clone(),
            ));
            history = Box::new(store);
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            return Err(miette::miette!(
                "--db-path requires the storage-rocksdb feature"
            ));
        }
    } else {
        ledger = Arc::new(EntitlementLedger::new(
            Box::new(InMemoryEntitlementStore::new()),
            clock.clone(),
        ));
        payments = Arc::new(PaymentWorkflow::new(
            Box::new(InMemoryPaymentStore::new()),
            ledger.clone(),
            clock.clone(),
        ));
        referrals = Arc::new(ReferralAccounting::new(
            Box::new(InMemoryReferralStore::new()),
            ledger.clone(),
            clock.clone(),
        ));
        history = Box::new(InMemoryHistoryStore::new());
    }

    let sessions = Arc::new(SessionRegistry::new(
        media.clone(),
        Duration::seconds(cli.session_timeout_secs),
    ));
    let orchestrator = Orchestrator::new(
        ledger.clone(),
        sessions,
        payments,
        referrals,
        transcoder,
        Arc::new(ConsoleMessenger::new()),
        media.clone(),
        history,
        clock,
        cli.admin_chat,
    );

    // Replay the script
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(ScriptCommand::Event(event)) => {
                if let Event::NewMedia { blob, .. } = &event {
                    media.register(blob.clone()).await;
                }
                if let Err(e) = orchestrator.handle_event(event).await {
                    eprintln!("Error processing event: {e}");
                }
            }
            Ok(ScriptCommand::Advance(by)) => match &manual {
                Some(manual) => {
                    manual.advance(by);
                    orchestrator.sweep_sessions().await;
                }
                None => {
                    let e = KruzhokError::ValidationError(
                        "advance records are not allowed with --wall-clock".to_string(),
                    );
                    eprintln!("Error processing event: {e}");
                }
            },
            Err(e) => {
                eprintln!("Error reading event: {e}");
            }
        }
    }

    // Output final state
    let snapshots = ledger.all_snapshots().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = SnapshotWriter::new(stdout.lock());
    writer.write_snapshots(snapshots).into_diagnostic()?;

    Ok(())
}
