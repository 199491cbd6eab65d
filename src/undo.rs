/// Reverting the most recent `run` batch.
///
/// The recorded plan is replayed backwards. Each reversible entry is moved from
/// where the batch left it back to its original path; an occupied original
/// path gets a free incremental name instead of being overwritten. Undo is not
/// recorded in the history and cannot itself be undone.
use crate::collision::{MAX_NAME_ATTEMPTS, next_free_name};
use crate::executor::move_file;
use crate::history::{Batch, COMMAND_RUN, HistoryStore};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What happened to one reversible entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoOutcome {
    /// Moved back to exactly its original path.
    Restored,
    /// The original path was occupied; restored under a free name beside it.
    RenamedDest,
    /// The file was no longer at its recorded destination.
    Missing,
    /// A filesystem error prevented the restore.
    Skipped,
}

impl UndoOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoOutcome::Restored => "restored",
            UndoOutcome::RenamedDest => "renamed-dest",
            UndoOutcome::Missing => "missing",
            UndoOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UndoOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one undo pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoReport {
    pub batch_id: String,
    pub restored: usize,
    pub renamed: usize,
    pub missing: usize,
    pub skipped: usize,
    /// `(original path, outcome)` for every processed entry, in replay order.
    pub details: Vec<(PathBuf, UndoOutcome)>,
}

impl UndoReport {
    fn record(&mut self, src: PathBuf, outcome: UndoOutcome) {
        match outcome {
            UndoOutcome::Restored => self.restored += 1,
            UndoOutcome::RenamedDest => self.renamed += 1,
            UndoOutcome::Missing => self.missing += 1,
            UndoOutcome::Skipped => self.skipped += 1,
        }
        self.details.push((src, outcome));
    }

    /// True when every file went back to exactly where it came from.
    pub fn is_complete_success(&self) -> bool {
        self.renamed == 0 && self.missing == 0 && self.skipped == 0
    }
}

/// How an undo request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStatus {
    /// No `run` batch is recorded.
    NothingToUndo,
    /// The latest `run` batch has no plan entries.
    EmptyPlan { batch_id: String },
    /// The operator declined; nothing was touched.
    Aborted { batch_id: String },
    Completed(UndoReport),
}

/// Moves one file from `dest` back to `src`.
pub fn undo_move_one(dest: &Path, src: &Path) -> UndoOutcome {
    if !dest.exists() {
        warn!("[undo-missing] does not exist in destination: {}", dest.display());
        return UndoOutcome::Missing;
    }

    if let Some(parent) = src.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = fs::create_dir_all(parent)
    {
        error!("[undo-error] cannot create {}: {}", parent.display(), e);
        return UndoOutcome::Skipped;
    }

    let target = match next_free_name(src, MAX_NAME_ATTEMPTS) {
        Ok(target) => target,
        Err(e) => {
            error!("[undo-error] {} -> {}: {}", dest.display(), src.display(), e);
            return UndoOutcome::Skipped;
        }
    };

    match move_file(dest, &target) {
        Ok(()) if target == src => UndoOutcome::Restored,
        Ok(()) => {
            info!(
                "[undo-renamed] {} already existed; restored as {}",
                src.display(),
                target.display()
            );
            UndoOutcome::RenamedDest
        }
        Err(e) => {
            error!("[undo-error] {} -> {}: {}", dest.display(), target.display(), e);
            UndoOutcome::Skipped
        }
    }
}

/// Replays a batch's plan backwards.
pub fn undo_batch(batch: &Batch) -> UndoReport {
    let mut report = UndoReport {
        batch_id: batch.batch_id.clone(),
        ..UndoReport::default()
    };

    for entry in batch.plan.iter().rev() {
        if !entry.action.is_reversible() {
            continue;
        }
        if entry.src.as_os_str().is_empty() || entry.dest.as_os_str().is_empty() {
            warn!("[undo-invalid-step] entry without src/dest in {}", batch.batch_id);
            report.record(entry.src.clone(), UndoOutcome::Skipped);
            continue;
        }
        let outcome = undo_move_one(&entry.dest, &entry.src);
        debug!(src = %entry.src.display(), "undo: {}", outcome);
        report.record(entry.src.clone(), outcome);
    }
    report
}

/// Finds and reverts the latest `run` batch in a history store.
#[derive(Debug, Clone)]
pub struct UndoEngine {
    store: HistoryStore,
}

impl UndoEngine {
    pub fn new(store: HistoryStore) -> Self {
        Self { store }
    }

    /// Undoes the most recent `run` batch.
    ///
    /// `confirm` is asked before anything moves unless `assume_yes` is set;
    /// returning `false` aborts with no side effects.
    pub fn undo_last(&self, assume_yes: bool, confirm: impl FnOnce(&Batch) -> bool) -> UndoStatus {
        info!("history path (undo): {}", self.store.path().display());
        let history = self.store.load();

        let Some(batch) = history.most_recent(Some(COMMAND_RUN)) else {
            info!("no batches to undo");
            return UndoStatus::NothingToUndo;
        };

        if batch.plan.is_empty() {
            info!("batch {} has no plan to undo", batch.batch_id);
            return UndoStatus::EmptyPlan {
                batch_id: batch.batch_id.clone(),
            };
        }

        if !assume_yes && !confirm(batch) {
            info!("undo of {} canceled", batch.batch_id);
            return UndoStatus::Aborted {
                batch_id: batch.batch_id.clone(),
            };
        }

        let report = undo_batch(batch);
        info!(
            "undo {}: restored {} renamed {} missing {} skipped {}",
            report.batch_id, report.restored, report.renamed, report.missing, report.skipped
        );
        UndoStatus::Completed(report)
    }
}
