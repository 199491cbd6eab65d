//! Output formatting and styling module.
//!
//! Every line the CLI shows to a human goes through here: colored status
//! messages, the plan table with its summaries, batch and undo statistics, and
//! the execution progress bar.

use crate::history::BatchStats;
use crate::planner::PlanItem;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;

/// Rows shown by default before the plan table is cut off.
pub const DEFAULT_MAX_ROWS: usize = 50;

const PLAN_HEADERS: [&str; 8] = [
    "#",
    "ACTION",
    "SRC",
    "→",
    "DST_FINAL",
    "CATEGORY",
    "DECISION",
    "NOTES",
];

/// Counts reported after rendering a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub total: usize,
    /// Sorted by count descending, then name.
    pub by_category: Vec<(String, usize)>,
    /// Sorted by count descending, then name.
    pub by_decision: Vec<(String, usize)>,
    pub shown: usize,
}

impl PlanSummary {
    pub fn of(plan: &[PlanItem], shown: usize) -> Self {
        Self {
            total: plan.len(),
            by_category: ranked(plan.iter().map(|item| item.category.clone())),
            by_decision: ranked(plan.iter().map(|item| item.decision.to_string())),
            shown,
        }
    }
}

fn ranked(keys: impl Iterator<Item = String>) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Lays out the first `max_rows` plan items as aligned text lines: header,
/// separator, then one line per item.
pub fn plan_table_lines(plan: &[PlanItem], max_rows: usize) -> Vec<String> {
    let rows: Vec<[String; 8]> = plan
        .iter()
        .take(max_rows)
        .enumerate()
        .map(|(idx, item)| {
            [
                (idx + 1).to_string(),
                "MOVE".to_string(),
                item.src.display().to_string(),
                "→".to_string(),
                item.dest_final.display().to_string(),
                item.category.clone(),
                item.decision.to_string(),
                item.notes_text(),
            ]
        })
        .collect();

    let mut widths = PLAN_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = widths.map(|w| "-".repeat(w));
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(align_row(&widths, PLAN_HEADERS));
    lines.push(align_row(&widths, rule.each_ref().map(String::as_str)));
    for row in &rows {
        lines.push(align_row(&widths, row.each_ref().map(String::as_str)));
    }
    lines
}

fn align_row(widths: &[usize; 8], cells: [&str; 8]) -> String {
    widths
        .iter()
        .zip(cells)
        .map(|(&width, cell)| format!("{:<width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Progress bar for plan execution, one tick per item.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fileorg::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(3);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let template = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints the plan table and both summaries, returning the counts.
    ///
    /// An empty plan prints a single notice.
    pub fn render_plan(plan: &[PlanItem], max_rows: usize) -> PlanSummary {
        if plan.is_empty() {
            Self::info("No proposed actions (empty plan).");
            return PlanSummary::default();
        }

        let lines = plan_table_lines(plan, max_rows);
        let shown = lines.len() - 2;
        for (idx, line) in lines.iter().enumerate() {
            if idx == 0 {
                println!("{}", line.bold());
            } else {
                println!("{}", line);
            }
        }
        if plan.len() > shown {
            Self::warning(&format!(
                "... ({} more not shown; use filters to narrow)",
                plan.len() - shown
            ));
        }

        let summary = PlanSummary::of(plan, shown);
        Self::counts_table("Summary by category", &summary.by_category);
        Self::counts_table("Summary by decision", &summary.by_decision);
        println!(
            "{} {}",
            "Total proposed actions:".bold(),
            summary.total.to_string().green().bold()
        );
        summary
    }

    fn counts_table(title: &str, counts: &[(String, usize)]) {
        Self::header(title);
        let width = counts.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, count) in counts {
            println!("  {:<width$} | {}", name, count.to_string().green(), width = width);
        }
    }

    /// Prints the outcome counters of an executed batch.
    pub fn batch_stats(batch_id: &str, stats: &BatchStats) {
        Self::header("SUMMARY");
        println!("  moved:      {}", stats.moved.to_string().green());
        println!("  renamed:    {}", stats.renamed.to_string().cyan());
        println!("  skipped:    {}", stats.skipped.to_string().yellow());
        println!("  duplicates: {}", stats.duplicates.to_string().yellow());
        Self::success(&format!("Batch recorded: {}", batch_id));
    }

    /// Prints the outcome counters of an undo pass.
    pub fn undo_report(report: &UndoReport) {
        Self::header(&format!("UNDO {}", report.batch_id));
        println!("  restored: {}", report.restored.to_string().green());
        println!("  renamed:  {}", report.renamed.to_string().cyan());
        println!("  missing:  {}", report.missing.to_string().yellow());
        println!("  skipped:  {}", report.skipped.to_string().red());
        if report.is_complete_success() {
            Self::success("All files restored to their original paths");
        } else {
            Self::warning("Some files could not be restored exactly; see the log");
        }
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
