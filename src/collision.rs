//! Destination collision handling.
//!
//! The same resolver runs twice per batch: once over a plan snapshot to give
//! the user a preview, and once per item at execution time against the live
//! filesystem. Only the second pass is authoritative.

use crate::error::{OrganizeError, OrganizeResult};
use crate::planner::{Decision, PlanItem};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

/// Upper bound on incremental name attempts.
pub const MAX_NAME_ATTEMPTS: u32 = 9999;

static COUNTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*) \((\d+)\)$").expect("counter pattern is valid"));

/// What to do when the destination is already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Move to the next free `name (N).ext`.
    Rename,
    /// Let the newer file win.
    KeepNewest,
    /// Leave the source where it is.
    Skip,
}

impl CollisionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionPolicy::Rename => "rename",
            CollisionPolicy::KeepNewest => "keep-newest",
            CollisionPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionPolicy {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rename" => Ok(CollisionPolicy::Rename),
            "keep-newest" => Ok(CollisionPolicy::KeepNewest),
            "skip" => Ok(CollisionPolicy::Skip),
            _ => Err(OrganizeError::InvalidPolicy {
                kind: "collision policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Returns the first `stem (N).ext` next to `dest` that does not exist.
///
/// An existing ` (N)` suffix on the stem continues from `N + 1`; otherwise
/// numbering starts at 2. If `dest` itself is free it is returned unchanged.
///
/// # Errors
///
/// Returns [`OrganizeError::NoFreeName`] after `max_attempts` occupied candidates.
pub fn next_free_name(dest: &Path, max_attempts: u32) -> OrganizeResult<PathBuf> {
    if !dest.exists() {
        return Ok(dest.to_path_buf());
    }

    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let (base, start) = match COUNTER_RE.captures(&stem) {
        Some(caps) => match caps[2].parse::<u32>() {
            Ok(n) => (caps[1].to_string(), n.saturating_add(1)),
            Err(_) => (stem.clone(), 2),
        },
        None => (stem.clone(), 2),
    };

    (0..max_attempts)
        .map_while(|offset| start.checked_add(offset))
        .map(|n| dest.with_file_name(format!("{} ({}){}", base, n, suffix)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| OrganizeError::NoFreeName {
            path: dest.to_path_buf(),
            attempts: max_attempts,
        })
}

/// Whether a resolution is advisory or about to be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Plan-time: never replaces, stat failures become a skip.
    Preview,
    /// Execution-time: keep-newest may replace, stat failures are errors.
    Commit,
}

/// The outcome of checking one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing is in the way.
    Clear,
    /// Use this free name instead.
    Rename(PathBuf),
    /// Overwrite the existing destination (commit mode only).
    Replace,
    /// Leave the source in place.
    Skip(String),
}

/// Decides how `src` may land at `dest` under `policy`.
pub fn resolve(
    policy: CollisionPolicy,
    src: &Path,
    dest: &Path,
    mode: ResolveMode,
) -> OrganizeResult<Resolution> {
    if !dest.exists() {
        return Ok(Resolution::Clear);
    }

    match policy {
        CollisionPolicy::Rename => {
            next_free_name(dest, MAX_NAME_ATTEMPTS).map(Resolution::Rename)
        }
        CollisionPolicy::Skip => Ok(Resolution::Skip("collision: skip (dst exists)".into())),
        CollisionPolicy::KeepNewest => {
            let times = modified(src).and_then(|s| modified(dest).map(|d| (s, d)));
            let (src_mtime, dest_mtime) = match (times, mode) {
                (Ok(times), _) => times,
                (Err(_), ResolveMode::Preview) => {
                    return Ok(Resolution::Skip(
                        "collision: keep-newest (stat error)".into(),
                    ));
                }
                (Err(e), ResolveMode::Commit) => return Err(e),
            };

            if dest_mtime >= src_mtime {
                return Ok(Resolution::Skip(
                    "collision: keep-newest (dst newer or same)".into(),
                ));
            }
            match mode {
                ResolveMode::Preview => {
                    next_free_name(dest, MAX_NAME_ATTEMPTS).map(Resolution::Rename)
                }
                ResolveMode::Commit => Ok(Resolution::Replace),
            }
        }
    }
}

fn modified(path: &Path) -> OrganizeResult<std::time::SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| OrganizeError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Annotates every item with a preview decision and a free destination.
pub fn apply_collision_policy(plan: Vec<PlanItem>, policy: CollisionPolicy) -> Vec<PlanItem> {
    plan.into_iter()
        .map(|mut item| {
            item.decision = Decision::Move;
            item.dest_final = item.dest.clone();

            match resolve(policy, &item.src, &item.dest, ResolveMode::Preview) {
                Ok(Resolution::Clear) | Ok(Resolution::Replace) => {}
                Ok(Resolution::Rename(free)) => {
                    let name = free.file_name().unwrap_or_default().to_string_lossy();
                    let note = match policy {
                        CollisionPolicy::KeepNewest => {
                            format!("collision: keep-newest -> rename to {}", name)
                        }
                        _ => format!("collision: rename -> {}", name),
                    };
                    item.add_note(note);
                    item.dest_final = free;
                }
                Ok(Resolution::Skip(note)) => {
                    item.decision = Decision::Skip;
                    item.add_note(note);
                }
                Err(e) => {
                    debug!(src = %item.src.display(), "preview collision failed: {}", e);
                    item.decision = Decision::Skip;
                    item.add_note(format!("collision: {}", e));
                }
            }
            item
        })
        .collect()
}
