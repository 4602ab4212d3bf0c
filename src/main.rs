// src/main.rs
mod extractors;
mod storage;
mod upload;
mod utils;

use clap::{Args as ClapArgs, Parser, Subcommand};
use extractors::{ExtractionConfig, QuestionExtractor};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{FsTaskStore, MemoryTaskStore, TaskId, TaskStore};
use upload::{UploadOptions, UploadResponse};
use utils::AppError;

/// Command Line Interface for the exam question year extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract question blocks mentioning the target year from TXT files
    Extract(ExtractArgs),
    /// Write a stored extraction result to stdout or a file
    Fetch(FetchArgs),
    /// Delete stored results older than the given age
    Purge(PurgeArgs),
}

#[derive(ClapArgs, Debug)]
struct ExtractArgs {
    /// TXT files to process (converted from the word processor beforehand)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target year token (default: EXAM_TARGET_YEAR or "24년")
    #[arg(short, long)]
    year: Option<String>,

    /// Output directory for stored results
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Minimum line count for a paragraph block
    #[arg(long)]
    min_lines: Option<usize>,

    /// Maximum line count for a paragraph block
    #[arg(long)]
    max_lines: Option<usize>,

    /// Minimum non-whitespace characters for a paragraph block
    #[arg(long)]
    min_chars: Option<usize>,

    /// Lines after a block that may still carry its year reference
    #[arg(long)]
    trailing_window: Option<usize>,

    /// Lines before a year mention included in a context block
    #[arg(long)]
    context_before: Option<usize>,

    /// Lines after a year mention included in a context block
    #[arg(long)]
    context_after: Option<usize>,

    /// Strategy precedence on overlap, most trusted first
    #[arg(long, value_name = "numbered,paragraph,context")]
    order: Option<String>,

    /// "independent" (all detectors) or "fallback" (best strategy with results only)
    #[arg(long)]
    mode: Option<String>,

    /// Store a grouped report instead of the plain joined blocks
    #[arg(long)]
    report: bool,

    /// Debug mode - also store an annotated candidate report per task
    #[arg(short, long)]
    debug: bool,

    /// Keep results in memory and print them after the JSON lines
    #[arg(long)]
    in_memory: bool,

    /// Reject inputs larger than this many bytes
    #[arg(long, default_value_t = upload::DEFAULT_MAX_BYTES)]
    max_bytes: u64,
}

#[derive(ClapArgs, Debug)]
struct FetchArgs {
    /// Task id printed by `extract`
    task_id: String,

    /// Output directory holding stored results
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Write the artifact here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Treat results older than this many hours as expired
    #[arg(long)]
    ttl_hours: Option<u64>,
}

#[derive(ClapArgs, Debug)]
struct PurgeArgs {
    /// Output directory holding stored results
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Maximum age in hours
    #[arg(long, default_value_t = 24)]
    max_age_hours: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::debug!("Parsed args: {:?}", args);

    match args.command {
        Command::Extract(extract) => run_extract(extract).await,
        Command::Fetch(fetch) => run_fetch(fetch),
        Command::Purge(purge) => run_purge(purge),
    }
}

/// Environment defaults first, then command-line overrides.
fn build_config(args: &ExtractArgs) -> Result<ExtractionConfig, AppError> {
    let mut config = ExtractionConfig::from_env()?;
    if let Some(year) = &args.year {
        config.target_year = year.clone();
    }
    if let Some(v) = args.min_lines {
        config.min_paragraph_lines = v;
    }
    if let Some(v) = args.max_lines {
        config.max_paragraph_lines = v;
    }
    if let Some(v) = args.min_chars {
        config.min_paragraph_chars = v;
    }
    if let Some(v) = args.trailing_window {
        config.trailing_window = v;
    }
    if let Some(v) = args.context_before {
        config.context_before = v;
    }
    if let Some(v) = args.context_after {
        config.context_after = v;
    }
    if let Some(order) = &args.order {
        config.confidence_order = ExtractionConfig::parse_order(order)?;
    }
    if let Some(mode) = &args.mode {
        config.mode = mode.parse()?;
    }
    Ok(config)
}

async fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    // Configuration errors stop everything before any file is scanned.
    let config = build_config(&args)?;
    let extractor = Arc::new(QuestionExtractor::new(config)?);
    tracing::info!("Starting extraction for {} file(s) with {:?}", args.files.len(), extractor.config());

    let memory_store = Arc::new(MemoryTaskStore::new());
    let store: Arc<dyn TaskStore> = if args.in_memory {
        memory_store.clone()
    } else {
        Arc::new(FsTaskStore::new(&args.output_dir)?)
    };

    let options = UploadOptions { report: args.report, debug: args.debug, max_bytes: args.max_bytes };
    let outcomes = upload::process_uploads(extractor, store, args.files, options).await;

    let mut success_count = 0;
    let mut no_match_count = 0;
    let mut failure_count = 0;
    let mut stdout = std::io::stdout().lock();

    for (path, outcome) in &outcomes {
        let response = UploadResponse::from_outcome(&path.display().to_string(), outcome);
        let line = serde_json::to_string(&response).map_err(|e| AppError::Processing(e.to_string()))?;
        writeln!(stdout, "{}", line)?;

        match outcome {
            Ok(task) => {
                if let Some(report) = &task.debug_report {
                    tracing::info!("Debug report for {}: {}", path.display(), report.display());
                }
                success_count += 1;
            }
            Err(_) if UploadResponse::is_no_match(outcome) => {
                tracing::warn!("No matches in {}", path.display());
                no_match_count += 1;
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {}", path.display(), e);
                failure_count += 1;
            }
        }
    }

    if args.in_memory {
        for (path, outcome) in &outcomes {
            if let Ok(task) = outcome {
                let artifact = memory_store.get(&task.task_id)?;
                writeln!(stdout, "\n===== {} ({}) =====", path.display(), task.task_id)?;
                stdout.write_all(&artifact)?;
            }
        }
    }

    tracing::info!(
        "Processing finished. Success: {}, No match: {}, Failures: {}",
        success_count, no_match_count, failure_count
    );

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!("Failed to process any of {} files", failure_count)));
    }

    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<(), AppError> {
    let task_id = TaskId::parse(&args.task_id)?;
    let mut store = FsTaskStore::new(&args.output_dir)?;
    if let Some(hours) = args.ttl_hours {
        store = store.with_ttl(hours_to_duration(hours));
    }

    let artifact = store.get(&task_id)?;
    match store.load_metadata(&task_id) {
        Ok(meta) => tracing::info!(
            "Task {} from '{}' ({}), created {}: {:?}",
            task_id, meta.source_name, meta.target_year, meta.created_at, meta.stats
        ),
        Err(e) => tracing::debug!("No metadata for task {}: {}", task_id, e),
    }
    match &args.out {
        Some(path) => {
            std::fs::write(path, &artifact)?;
            tracing::info!("Wrote task {} to {}", task_id, path.display());
        }
        None => std::io::stdout().lock().write_all(&artifact)?,
    }
    Ok(())
}

/// Huge values saturate to "never expires" instead of overflowing.
fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn run_purge(args: PurgeArgs) -> Result<(), AppError> {
    if args.max_age_hours == 0 {
        return Err(AppError::Config("--max-age-hours must be at least 1".to_string()));
    }
    let store = FsTaskStore::new(&args.output_dir)?.with_ttl(hours_to_duration(args.max_age_hours));
    let removed = store.purge_expired()?;
    tracing::info!("Purged {} expired task(s) from {}", removed, args.output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "exam_extractor", "extract", "a.txt", "b.txt", "--year", "2023학년도", "--max-lines", "12",
            "--order", "paragraph,numbered,context", "--mode", "fallback",
        ]);
        let Command::Extract(extract) = args.command else { panic!("expected extract") };
        assert_eq!(extract.files.len(), 2);

        let config = build_config(&extract).unwrap();
        assert_eq!(config.target_year, "2023학년도");
        assert_eq!(config.max_paragraph_lines, 12);
        assert_eq!(config.mode, extractors::DetectionMode::Fallback);
        assert_eq!(config.confidence_order[0], extractors::Strategy::Paragraph);
    }

    #[test]
    fn test_bad_order_is_configuration_error() {
        let args = Args::parse_from(["exam_extractor", "extract", "a.txt", "--order", "numbered,heading,context"]);
        let Command::Extract(extract) = args.command else { panic!("expected extract") };
        assert!(matches!(build_config(&extract), Err(AppError::Extraction(_))));
    }

    #[test]
    fn test_huge_hour_values_saturate() {
        assert_eq!(hours_to_duration(2), Duration::from_secs(7200));
        assert_eq!(hours_to_duration(u64::MAX), Duration::from_secs(u64::MAX));

        let args = Args::parse_from(["exam_extractor", "purge", "--max-age-hours", "18446744073709551615"]);
        let Command::Purge(purge) = args.command else { panic!("expected purge") };
        assert_eq!(hours_to_duration(purge.max_age_hours), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_fetch_args() {
        let args = Args::parse_from(["exam_extractor", "fetch", "not-a-uuid", "--ttl-hours", "2"]);
        let Command::Fetch(fetch) = args.command else { panic!("expected fetch") };
        assert_eq!(fetch.ttl_hours, Some(2));
        assert!(matches!(run_fetch(fetch), Err(AppError::Storage(_))));
    }
}
