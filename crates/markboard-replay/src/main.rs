mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use markboard_core::storage::{AutoSaveManager, FileStorage, Storage};
use markboard_core::{EngineConfig, ParticipantId, Whiteboard};

/// Replay a whiteboard session script and print the resulting document
#[derive(Parser, Debug)]
#[command(name = "markboard-replay")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON session script (array of steps)
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Engine config file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Participant that authors the scripted local steps
    #[arg(long, value_name = "ID", default_value = "local")]
    participant: String,

    /// Compact soft-deleted shapes after the last step
    #[arg(long)]
    compact: bool,

    /// Start from this saved document instead of an empty one
    #[arg(long, value_name = "DOC_ID", requires = "store")]
    open: Option<String>,

    /// Document directory used by --open and for saving the result
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let json = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let steps = script::parse(&json)
        .with_context(|| format!("parsing script {}", args.script.display()))?;

    let storage = args
        .store
        .as_ref()
        .map(|dir| FileStorage::new(dir.clone()).map(Arc::new))
        .transpose()
        .context("opening document store")?;

    let participant = ParticipantId::new(args.participant.clone());
    let mut wb = match (&storage, &args.open) {
        (Some(storage), Some(id)) => {
            let document = pollster::block_on(storage.load(id))
                .with_context(|| format!("loading document {}", id))?;
            log::info!("Opened document {} ({} shapes)", id, document.len());
            Whiteboard::from_document(document, participant, config)
        }
        _ => Whiteboard::with_config(participant, config),
    };

    let report = script::run(steps, &mut wb);
    if args.compact {
        let purged = wb.compact();
        log::info!("Compacted {} shapes", purged.len());
    }
    let outgoing = wb.take_outgoing().len();

    println!("{}", wb.document().to_json().context("serializing document")?);
    eprintln!(
        "steps={} ignored={} recovered={} remote_applied={} remote_rejected={} compacted={} \
         undo={} redo={} evicted={} outgoing={}",
        report.steps,
        report.ignored,
        report.recovered_batches,
        report.remote_applied,
        report.remote_rejected,
        report.compacted,
        wb.history().undo_len(),
        wb.history().redo_len(),
        wb.history().evicted_total(),
        outgoing,
    );

    if let Some(storage) = storage {
        let document = wb.into_document();
        let mut autosave = AutoSaveManager::new(storage);
        pollster::block_on(autosave.save(&document)).context("saving document")?;
    }

    Ok(())
}
