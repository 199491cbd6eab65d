//! Plan construction: which file goes where, before anything is touched.

use crate::catalog::{self, FileFilter, sort_case_insensitive};
use crate::classifier::{ClassificationReason, Classifier};
use crate::collision::{CollisionPolicy, apply_collision_policy};
use crate::config::Config;
use crate::dedupe::{DedupePolicy, apply_dedupe_policy};
use crate::error::{OrganizeError, OrganizeResult};
use chrono::{DateTime, Datelike, Local};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Preview decision for a plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Move,
    Skip,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Move => "move",
            Decision::Skip => "skip",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which file timestamp drives the `YYYY/MM` partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMode {
    Created,
    Modified,
}

impl FromStr for DateMode {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(DateMode::Created),
            "modified" => Ok(DateMode::Modified),
            _ => Err(OrganizeError::InvalidPolicy {
                kind: "date mode",
                value: s.to_string(),
            }),
        }
    }
}

/// One intended relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub src: PathBuf,
    /// Destination proposed by the planner, before collision handling.
    pub dest: PathBuf,
    pub category: String,
    pub reason: ClassificationReason,
    pub decision: Decision,
    /// Conflict-free destination chosen by the preview pass.
    pub dest_final: PathBuf,
    pub notes: Vec<String>,
    /// Source of the canonical file when this item is a duplicate.
    pub duplicate_of: Option<PathBuf>,
}

impl PlanItem {
    pub fn new(src: PathBuf, dest: PathBuf, category: String, reason: ClassificationReason) -> Self {
        Self {
            dest_final: dest.clone(),
            src,
            dest,
            category,
            reason,
            decision: Decision::Move,
            notes: Vec::new(),
            duplicate_of: None,
        }
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Notes joined the way they are displayed.
    pub fn notes_text(&self) -> String {
        self.notes.join("; ")
    }
}

/// Builds the ordered plan for `files`, rooted at `root`.
///
/// Destination is `root/category[/YYYY/MM]/filename`. Files without a category
/// are left out, as are files already sitting at their destination. When the
/// requested timestamp cannot be read the date segment is omitted.
pub fn build_plan(
    files: &[PathBuf],
    classifier: &Classifier,
    root: &Path,
    date_mode: Option<DateMode>,
) -> Vec<PlanItem> {
    let mut sorted = files.to_vec();
    sort_case_insensitive(&mut sorted);

    let mut plan = Vec::with_capacity(sorted.len());
    for src in sorted {
        let Some(classification) = classifier.classify(&src) else {
            debug!(src = %src.display(), "no category; left out of plan");
            continue;
        };
        let Some(file_name) = src.file_name() else {
            continue;
        };

        let mut dest_dir = root.join(&classification.category);
        if let Some(mode) = date_mode
            && let Some(stamp) = file_timestamp(&src, mode)
        {
            dest_dir = dest_dir
                .join(format!("{:04}", stamp.year()))
                .join(format!("{:02}", stamp.month()));
        }

        let dest = dest_dir.join(file_name);
        if dest == src {
            debug!(src = %src.display(), "already in place; left out of plan");
            continue;
        }
        plan.push(PlanItem::new(
            src,
            dest,
            classification.category,
            classification.reason,
        ));
    }
    plan
}

fn file_timestamp(path: &Path, mode: DateMode) -> Option<DateTime<Local>> {
    let meta = fs::metadata(path).ok()?;
    let time = match mode {
        DateMode::Created => meta.created(),
        DateMode::Modified => meta.modified(),
    }
    .ok()?;
    Some(DateTime::<Local>::from(time))
}

/// Keeps only items whose category is in `wanted` (case-insensitive).
/// An empty list keeps everything.
pub fn retain_categories(plan: Vec<PlanItem>, wanted: &[String]) -> Vec<PlanItem> {
    let wanted: HashSet<String> = wanted
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    if wanted.is_empty() {
        return plan;
    }
    plan.into_iter()
        .filter(|item| wanted.contains(&item.category))
        .collect()
}

/// Everything the planning stage needs from the caller.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Directory whose files are organized.
    pub source_root: PathBuf,
    /// Directory under which category folders are created.
    pub dest_root: PathBuf,
    pub recursive: bool,
    pub filter: FileFilter,
    pub categories: Vec<String>,
    pub date_mode: Option<DateMode>,
    pub collision: CollisionPolicy,
    pub dedupe: DedupePolicy,
}

impl PlanRequest {
    /// A request that organizes `root` in place with the configured policies.
    pub fn in_place(root: impl Into<PathBuf>, config: &Config) -> Self {
        let root = root.into();
        Self {
            source_root: root.clone(),
            dest_root: root,
            recursive: false,
            filter: FileFilter::default(),
            categories: Vec::new(),
            date_mode: None,
            collision: config.behavior.collision,
            dedupe: config.behavior.dedupe,
        }
    }
}

/// Discover, filter, classify and annotate a plan with preview decisions.
///
/// # Errors
///
/// Validation errors (size bounds, filter globs) are returned before any file
/// is inspected for hashing.
pub fn prepare_plan(config: &Config, request: &PlanRequest) -> OrganizeResult<Vec<PlanItem>> {
    let compiled = config.compile_filters()?;

    let files = catalog::discover(
        &request.source_root,
        request.recursive,
        config.behavior.follow_symlinks,
    );
    info!(
        "{} files found in {}",
        files.len(),
        request.source_root.display()
    );

    let files = request.filter.apply(&files)?;
    let files = compiled.apply(files);
    info!("{} files after filters", files.len());

    let classifier = Classifier::new(&config.categories, config.behavior.others_enabled);
    let plan = build_plan(&files, &classifier, &request.dest_root, request.date_mode);
    let plan = retain_categories(plan, &request.categories);
    let plan = apply_collision_policy(plan, request.collision);
    Ok(apply_dedupe_policy(plan, request.dedupe))
}
