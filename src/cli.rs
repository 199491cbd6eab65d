//! Command-line interface for fo.
//!
//! Provides `preview`, `run`, `merge`, `undo` and `validate-config`. Every
//! subcommand loads the configuration, lets flags override its behavior
//! section, and hands plain values to the library.

use crate::catalog::{FileFilter, SizeBound, split_list};
use crate::collision::CollisionPolicy;
use crate::config::Config;
use crate::dedupe::DedupePolicy;
use crate::executor::{ExecuteOptions, ExecutionReport, execute_plan};
use crate::history::{Batch, COMMAND_MERGE, COMMAND_RUN, HistoryStore, SystemIdSource};
use crate::output::{DEFAULT_MAX_ROWS, OutputFormatter};
use crate::planner::{DateMode, PlanItem, PlanRequest, prepare_plan};
use crate::undo::{UndoEngine, UndoStatus};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Input;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Organize files into category folders, with undo
#[derive(Parser, Debug)]
#[command(name = "fo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// History file (default: ~/.fo/history.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Configuration file (default: ./.fo.toml, then ~/.config/fo/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what would be moved, without touching anything
    Preview(PreviewArgs),

    /// Organize a directory in place and record the batch
    Run(RunArgs),

    /// Organize files from one directory into another
    Merge(MergeArgs),

    /// Revert the most recent `run` batch
    Undo(UndoArgs),

    /// Load the configuration and print its categories and behavior
    ValidateConfig,
}

/// Selection and policy flags shared by every planning command.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only these extensions (comma separated, e.g. "jpg,.PDF")
    #[arg(long, value_name = "EXTS")]
    pub only_ext: Option<String>,

    /// Only these categories (comma separated, case-insensitive)
    #[arg(long, value_name = "NAMES")]
    pub categories: Option<String>,

    /// Partition destinations into YYYY/MM by file date
    #[arg(long, value_name = "created|modified")]
    pub by_date: Option<DateMode>,

    /// Minimum file size (e.g. 10KB, 1.5MB)
    #[arg(long, value_name = "SIZE")]
    pub size_min: Option<String>,

    /// Maximum file size (e.g. 2GB)
    #[arg(long, value_name = "SIZE")]
    pub size_max: Option<String>,

    /// What to do when the destination exists [rename, keep-newest, skip]
    #[arg(long, value_name = "POLICY")]
    pub collision: Option<CollisionPolicy>,

    /// What to do with content duplicates [skip, link, delete]
    #[arg(long, value_name = "POLICY")]
    pub dedupe: Option<DedupePolicy>,

    /// Descend into subdirectories
    #[arg(long)]
    pub recursive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Directory to organize
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Rows shown in the plan table
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub preview: PreviewArgs,

    /// Render the plan only; move nothing and record nothing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Directory the files come from
    #[arg(long)]
    pub src: PathBuf,

    /// Directory whose category folders receive the files
    #[arg(long)]
    pub dest: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Rows shown in the plan table
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UndoArgs {
    /// Undo without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Parses the process arguments, installs logging and runs the command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.debug, cli.log_dir.as_deref())?;
    dispatch(cli)
}

/// Installs the global subscriber; the returned guard flushes the file writer
/// on drop.
pub fn init_tracing(debug: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(debug, rust_log.as_deref());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "fo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .with(file_layer)
        .with(filter)
        .try_init();
    Ok(guard)
}

/// A non-empty, valid `RUST_LOG` replaces the level picked by `--debug`.
fn log_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if debug { "debug" } else { "warn" };
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Runs a parsed command line.
pub fn dispatch(cli: Cli) -> Result<()> {
    let history_path = cli.history.clone().unwrap_or_else(HistoryStore::default_path);
    let history = HistoryStore::new(history_path);
    debug!(history = %history.path().display(), "history file");

    match cli.command {
        Commands::Preview(args) => preview(&load_config(cli.config.as_deref())?, &args),
        Commands::Run(args) => run_in_place(&load_config(cli.config.as_deref())?, &history, &args),
        Commands::Merge(args) => merge(&load_config(cli.config.as_deref())?, &history, &args),
        Commands::Undo(args) => {
            undo(&history, args.yes);
            Ok(())
        }
        Commands::ValidateConfig => validate_config(cli.config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("error loading configuration")
}

fn build_request(
    config: &Config,
    source_root: &Path,
    dest_root: &Path,
    filters: &FilterArgs,
) -> PlanRequest {
    let mut request = PlanRequest::in_place(source_root, config);
    request.dest_root = dest_root.to_path_buf();
    request.recursive = filters.recursive;
    request.filter = FileFilter {
        extensions: filters.only_ext.as_deref().map(split_list).unwrap_or_default(),
        size_min: filters.size_min.clone().map(SizeBound::from),
        size_max: filters.size_max.clone().map(SizeBound::from),
    };
    request.categories = filters
        .categories
        .as_deref()
        .map(split_list)
        .unwrap_or_default();
    request.date_mode = filters.by_date;
    if let Some(collision) = filters.collision {
        request.collision = collision;
    }
    if let Some(dedupe) = filters.dedupe {
        request.dedupe = dedupe;
    }
    request
}

fn plan_for(config: &Config, request: &PlanRequest) -> Result<Vec<PlanItem>> {
    info!(
        "planning {} -> {} (collision: {}, dedupe: {})",
        request.source_root.display(),
        request.dest_root.display(),
        request.collision,
        request.dedupe
    );
    prepare_plan(config, request).context("error preparing the plan")
}

fn preview(config: &Config, args: &PreviewArgs) -> Result<()> {
    let request = build_request(config, &args.path, &args.path, &args.filters);
    let plan = plan_for(config, &request)?;
    OutputFormatter::header(&format!("PREVIEW {}", args.path.display()));
    OutputFormatter::render_plan(&plan, args.max_rows);
    Ok(())
}

fn run_in_place(config: &Config, history: &HistoryStore, args: &RunArgs) -> Result<()> {
    let root = &args.preview.path;
    let request = build_request(config, root, root, &args.preview.filters);
    let plan = plan_for(config, &request)?;
    OutputFormatter::render_plan(&plan, args.preview.max_rows);

    if args.dry_run {
        OutputFormatter::dry_run_notice("No files were moved and no batch was recorded.");
        return Ok(());
    }

    let report = execute_with_progress(&plan, &request);
    record(history, report, COMMAND_RUN, root, root)
}

fn merge(config: &Config, history: &HistoryStore, args: &MergeArgs) -> Result<()> {
    fs::create_dir_all(&args.dest)
        .with_context(|| format!("cannot create destination {}", args.dest.display()))?;

    let request = build_request(config, &args.src, &args.dest, &args.filters);
    let plan = plan_for(config, &request)?;
    OutputFormatter::render_plan(&plan, args.max_rows);

    if !args.yes && !confirm("Do you want to apply the merge? [y/N]") {
        OutputFormatter::warning("Operation canceled.");
        return Ok(());
    }

    let report = execute_with_progress(&plan, &request);
    record(history, report, COMMAND_MERGE, &args.src, &args.dest)
}

fn execute_with_progress(plan: &[PlanItem], request: &PlanRequest) -> ExecutionReport {
    let options = ExecuteOptions {
        collision: request.collision,
        dedupe: request.dedupe,
    };
    let pb = OutputFormatter::create_progress_bar(plan.len() as u64);
    let report = execute_plan(plan, options, |entry| {
        pb.set_message(entry.action.to_string());
        pb.inc(1);
    });
    pb.finish_and_clear();
    report
}

fn record(
    history: &HistoryStore,
    report: ExecutionReport,
    command: &str,
    source_dir: &Path,
    dest_dir: &Path,
) -> Result<()> {
    let batch: Batch =
        report.into_batch(&mut SystemIdSource::default(), command, source_dir, dest_dir);
    let (batch_id, stats) = (batch.batch_id.clone(), batch.stats);
    history
        .append_batch(batch)
        .context("files were moved but the batch could not be recorded")?;
    OutputFormatter::batch_stats(&batch_id, &stats);
    Ok(())
}

fn undo(history: &HistoryStore, assume_yes: bool) {
    let engine = UndoEngine::new(history.clone());
    let status = engine.undo_last(assume_yes, |batch| {
        OutputFormatter::info(&format!(
            "Batch will be undone: {} ({})",
            batch.batch_id, batch.created_at
        ));
        confirm("Continue? [y/N]")
    });

    match status {
        UndoStatus::NothingToUndo => OutputFormatter::info("No batches to undo."),
        UndoStatus::EmptyPlan { batch_id } => OutputFormatter::warning(&format!(
            "Batch {} has no plan; nothing to undo.",
            batch_id
        )),
        UndoStatus::Aborted { .. } => OutputFormatter::warning("Operation canceled."),
        UndoStatus::Completed(report) => OutputFormatter::undo_report(&report),
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    config.compile_filters().context("invalid filter rules")?;

    let mut names: Vec<&str> = config.categories.iter().map(|c| c.name.as_str()).collect();
    names.sort_unstable();

    OutputFormatter::success("Configuration is valid");
    OutputFormatter::header("Categories");
    OutputFormatter::plain(&names.join(", "));
    OutputFormatter::header("Behavior");
    OutputFormatter::plain(&format!("  collision:       {}", config.behavior.collision));
    OutputFormatter::plain(&format!("  dedupe:          {}", config.behavior.dedupe));
    OutputFormatter::plain(&format!("  follow_symlinks: {}", config.behavior.follow_symlinks));
    OutputFormatter::plain(&format!("  others_enabled:  {}", config.behavior.others_enabled));
    Ok(())
}

/// Yes in English or Spanish; anything else, including empty, is no.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sí"
    )
}

fn confirm(prompt: &str) -> bool {
    Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .map(|answer| is_affirmative(&answer))
        .unwrap_or(false)
}
