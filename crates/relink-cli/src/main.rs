//! Relink CLI
//!
//! Runs the copy-and-relink engine against a base snapshot stored as JSON:
//! - `copy`: duplicate child records onto another anchor
//! - `links`: list the records a link cell points at
//! - `back-field`: show which child field pairs with a forward field

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use relink_engine::{CopyConfig, CopyEvent, MemoryTableService, Relinker};
use relink_model::RecordId;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relink")]
#[command(author, version, about = "Duplicate linked records onto another anchor")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine config JSON (defaults plus RELINK_* environment overrides when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy child records and link the copies to another anchor record.
    Copy {
        /// Base snapshot JSON
        #[arg(long)]
        base: PathBuf,
        /// Table holding the records to copy
        #[arg(long)]
        child_table: String,
        /// Record ids to copy, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        records: Vec<RecordId>,
        /// Link field on the main table that lists the children
        #[arg(long)]
        forward_field: String,
        /// Main table record the copies get linked to
        #[arg(long)]
        anchor: String,
        /// Write the updated snapshot here
        #[arg(short, long, conflicts_with = "in_place")]
        out: Option<PathBuf>,
        /// Write the updated snapshot back to --base
        #[arg(long)]
        in_place: bool,
    },

    /// List the records linked from one cell.
    Links {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        record: String,
        #[arg(long)]
        field: String,
    },

    /// Show the child table field paired with a forward link field.
    BackField {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        child_table: String,
        #[arg(long)]
        forward_field: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let ok = rt.block_on(run(cli.command, config))?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CopyConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(CopyConfig::from_env()?),
    }
}

fn load_base(path: &Path) -> Result<Arc<MemoryTableService>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read base snapshot {}", path.display()))?;
    let service = MemoryTableService::from_json(&text)
        .with_context(|| format!("invalid base snapshot {}", path.display()))?;
    Ok(Arc::new(service))
}

fn save_base(service: &MemoryTableService, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&service.snapshot())?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    Ok(())
}

/// Runs one command; `false` means the command completed but reported failure.
async fn run(command: Commands, config: CopyConfig) -> Result<bool> {
    match command {
        Commands::Copy {
            base,
            child_table,
            records,
            forward_field,
            anchor,
            out,
            in_place,
        } => {
            let service = load_base(&base)?;
            let mut relinker = Relinker::new(service.clone(), config);
            relinker.on_event(Box::new(report_event));

            let outcome = relinker
                .copy_linked_records(&child_table, &records, &forward_field, &anchor)
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            if !outcome.success {
                eprintln!(
                    "{} {}",
                    "failed".red().bold(),
                    outcome.error.as_deref().unwrap_or("copy failed")
                );
                return Ok(false);
            }

            eprintln!(
                "{} copied {} record(s) onto {}",
                "ok".green().bold(),
                outcome.count,
                anchor
            );
            let target = if in_place { Some(base) } else { out };
            match target {
                Some(path) => save_base(&service, &path)?,
                None => eprintln!("note: snapshot not saved (pass --out or --in-place)"),
            }
            Ok(true)
        }

        Commands::Links {
            base,
            table,
            record,
            field,
        } => {
            let service = load_base(&base)?;
            let relinker = Relinker::new(service, config);
            let linked = relinker.linked_records(&table, &record, &field).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "tableId": linked.table_id,
                    "recordIds": linked.record_ids(),
                }))?
            );
            Ok(true)
        }

        Commands::BackField {
            base,
            child_table,
            forward_field,
        } => {
            let service = load_base(&base)?;
            let relinker = Relinker::new(service, config);
            let resolved = relinker.back_field(&child_table, &forward_field).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "fieldId": resolved.field.id,
                    "name": resolved.field.name,
                    "mainTableId": resolved.main_table_id,
                    "multiple": resolved.multiple,
                }))?
            );
            Ok(true)
        }
    }
}

fn report_event(event: CopyEvent) {
    match event {
        CopyEvent::VerificationMismatch { expected, actual } => eprintln!(
            "{} anchor does not list {} yet (currently {:?})",
            "warning".yellow().bold(),
            expected,
            actual
        ),
        CopyEvent::SelectionShortfall { requested, found } => eprintln!(
            "{} {} of {} selected record(s) not found",
            "warning".yellow().bold(),
            requested - found,
            requested
        ),
        CopyEvent::AnchorTextUnavailable { reason } => eprintln!(
            "{} anchor text unavailable: {}",
            "warning".yellow().bold(),
            reason
        ),
        _ => {}
    }
}
