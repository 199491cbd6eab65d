/// Plan execution against the live filesystem.
///
/// Each plan item is moved from its source to its *proposed* destination. The
/// preview decision and `dest_final` are advisory: collisions and duplicates
/// are re-checked here, and whatever the filesystem says now wins.
use crate::collision::{CollisionPolicy, Resolution, ResolveMode, resolve};
use crate::dedupe::{DedupePolicy, HashCache, content_hash};
use crate::error::{OrganizeError, OrganizeResult};
use crate::history::{Action, Batch, BatchStats, IdSource, PlanEntry};
use crate::planner::PlanItem;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Moves `src` to `dest`, copying and deleting when a rename cannot cross
/// filesystems.
pub fn move_file(src: &Path, dest: &Path) -> OrganizeResult<()> {
    let move_failed = |reason| OrganizeError::FileMoveFailure {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        reason,
    };

    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(src = %src.display(), "rename crosses devices; copying");
            fs::copy(src, dest).map_err(move_failed)?;
            fs::remove_file(src).map_err(move_failed)
        }
        Err(e) => Err(move_failed(e)),
    }
}

fn ensure_parent(dest: &Path) -> OrganizeResult<()> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|source| OrganizeError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Moves one file under the collision policy, optionally short-circuiting on
/// content already placed in this batch.
///
/// Returns the action taken and the path the file now lives at (for
/// `Duplicate`, the earlier copy; for `Skipped`, the occupied destination).
/// A file already at its destination is skipped untouched.
///
/// # Errors
///
/// Hashing, stat, directory creation and move failures are returned. A
/// keep-newest replace whose destination is a directory fails with
/// [`OrganizeError::DestinationNotFile`].
pub fn move_with_policies(
    src: &Path,
    dest: &Path,
    collision: CollisionPolicy,
    cache: Option<&mut HashCache>,
) -> OrganizeResult<(Action, PathBuf)> {
    if src == dest {
        debug!("[in-place] {}", src.display());
        return Ok((Action::Skipped, dest.to_path_buf()));
    }
    ensure_parent(dest)?;

    let mut hash = None;
    if let Some(cache) = cache.as_deref() {
        let digest = content_hash(src)?;
        if let Some(existing) = cache.lookup(&digest) {
            info!("[duplicate] {} == {}", src.display(), existing.display());
            return Ok((Action::Duplicate, existing.to_path_buf()));
        }
        hash = Some(digest);
    }

    let (action, final_dest) = match resolve(collision, src, dest, ResolveMode::Commit)? {
        Resolution::Clear => {
            move_file(src, dest)?;
            (Action::Moved, dest.to_path_buf())
        }
        Resolution::Rename(free) => {
            debug!("[rename] {} -> {}", dest.display(), free.display());
            move_file(src, &free)?;
            (Action::Renamed, free)
        }
        Resolution::Replace => {
            replace(src, dest)?;
            (Action::Moved, dest.to_path_buf())
        }
        Resolution::Skip(reason) => {
            debug!("[skip] {} -> {} ({})", src.display(), dest.display(), reason);
            return Ok((Action::Skipped, dest.to_path_buf()));
        }
    };

    if let (Some(cache), Some(digest)) = (cache, hash) {
        cache.record(digest, final_dest.clone());
    }
    Ok((action, final_dest))
}

fn replace(src: &Path, dest: &Path) -> OrganizeResult<()> {
    let meta = fs::symlink_metadata(dest).map_err(|source| OrganizeError::ReadFailed {
        path: dest.to_path_buf(),
        source,
    })?;
    if meta.is_dir() {
        return Err(OrganizeError::DestinationNotFile {
            path: dest.to_path_buf(),
        });
    }
    let replace_failed = |reason| OrganizeError::FileMoveFailure {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        reason,
    };

    // rename replaces the destination in one step; only the copy fallback
    // unlinks it first.
    let replaced = match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::remove_file(dest).map_err(replace_failed)?;
            move_file(src, dest)
        }
        Err(e) => Err(replace_failed(e)),
    };
    replaced.inspect_err(|e| {
        error!("[replace-failed] {} -> {}: {}", src.display(), dest.display(), e);
    })
}

/// Policies applied while executing a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub collision: CollisionPolicy,
    pub dedupe: DedupePolicy,
}

/// Per-item outcomes of one execution, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub entries: Vec<PlanEntry>,
    pub stats: BatchStats,
}

impl ExecutionReport {
    fn push(&mut self, entry: PlanEntry) {
        self.stats.record(entry.action);
        self.entries.push(entry);
    }

    /// Stamps the outcomes as a history batch.
    pub fn into_batch(
        self,
        ids: &mut impl IdSource,
        command: &str,
        source_dir: &Path,
        dest_dir: &Path,
    ) -> Batch {
        Batch::new(ids, command, source_dir, dest_dir, self.entries, self.stats)
    }
}

/// Executes `plan` item by item.
///
/// A failing item is logged and recorded as skipped; execution continues with
/// the next one. `on_item` is called after every item, e.g. to tick a progress
/// bar.
pub fn execute_plan(
    plan: &[PlanItem],
    options: ExecuteOptions,
    mut on_item: impl FnMut(&PlanEntry),
) -> ExecutionReport {
    let dedupe_by_hash = options.dedupe == DedupePolicy::Skip;
    if !dedupe_by_hash {
        warn!(
            "dedupe '{}' is not applied during execution; duplicates will be moved",
            options.dedupe
        );
    }

    let mut cache = HashCache::new();
    let mut report = ExecutionReport::default();

    for item in plan {
        let cache_ref = dedupe_by_hash.then_some(&mut cache);
        let outcome = move_with_policies(&item.src, &item.dest, options.collision, cache_ref);
        let (action, dest) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "[run-error] {} -> {}: {}",
                    item.src.display(),
                    item.dest.display(),
                    e
                );
                (Action::Skipped, item.dest.clone())
            }
        };

        let entry = PlanEntry {
            src: item.src.clone(),
            dest,
            action,
        };
        on_item(&entry);
        report.push(entry);
    }

    info!("execution finished: {}", report.stats);
    report
}
