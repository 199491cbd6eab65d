//! Content-based duplicate detection.
//!
//! Candidates are bucketed by a cheap signature (size plus a hash of the first
//! 256 KiB); only buckets with two or more members are fully hashed.

use crate::error::{OrganizeError, OrganizeResult};
use crate::planner::{Decision, PlanItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Bytes read for the quick signature.
pub const QUICK_HASH_BYTES: u64 = 256 * 1024;

const BUFFER_SIZE: usize = 1024 * 1024;

/// What to do with files whose content already appears earlier in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupePolicy {
    Skip,
    Link,
    Delete,
}

impl DedupePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupePolicy::Skip => "skip",
            DedupePolicy::Link => "link",
            DedupePolicy::Delete => "delete",
        }
    }
}

impl fmt::Display for DedupePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupePolicy {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(DedupePolicy::Skip),
            "link" => Ok(DedupePolicy::Link),
            "delete" => Ok(DedupePolicy::Delete),
            _ => Err(OrganizeError::InvalidPolicy {
                kind: "dedupe policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Size plus a hash of the leading bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuickSignature {
    pub size: u64,
    pub head_hash: String,
}

/// Computes the quick signature, or `None` if the file cannot be read.
pub fn quick_hash(path: &Path) -> Option<QuickSignature> {
    let file = File::open(path).ok()?;
    let meta = file.metadata().ok()?;
    if !meta.is_file() {
        return None;
    }

    let mut hasher = blake3::Hasher::new();
    let mut head = Vec::new();
    file.take(QUICK_HASH_BYTES).read_to_end(&mut head).ok()?;
    hasher.update(&head);

    Some(QuickSignature {
        size: meta.len(),
        head_hash: hasher.finalize().to_hex().to_string(),
    })
}

/// Computes the blake3 hash of a file's full contents.
///
/// Uses a streaming read so large files are never held in memory.
pub fn content_hash(path: &Path) -> OrganizeResult<String> {
    let read_failed = |source| OrganizeError::ReadFailed {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_failed)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(read_failed)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Full hash, or `None` if the file cannot be read.
pub fn full_hash(path: &Path) -> Option<String> {
    content_hash(path).ok()
}

/// Groups plan indices whose sources have identical content.
///
/// Each returned group has at least two members, sorted by plan order.
pub fn find_duplicate_groups(plan: &[PlanItem]) -> Vec<Vec<usize>> {
    let mut buckets: HashMap<QuickSignature, Vec<usize>> = HashMap::new();
    for (idx, item) in plan.iter().enumerate() {
        if let Some(sig) = quick_hash(&item.src) {
            buckets.entry(sig).or_default().push(idx);
        }
    }

    let mut groups = Vec::new();
    for idxs in buckets.into_values().filter(|idxs| idxs.len() > 1) {
        let mut by_hash: HashMap<String, Vec<usize>> = HashMap::new();
        for idx in idxs {
            if let Some(hash) = full_hash(&plan[idx].src) {
                by_hash.entry(hash).or_default().push(idx);
            }
        }
        for mut group in by_hash.into_values().filter(|g| g.len() > 1) {
            group.sort_unstable();
            groups.push(group);
        }
    }
    groups.sort();
    groups
}

/// Marks every non-canonical member of a duplicate group.
///
/// `skip` and `delete` turn the item into a skip (nothing is deleted here);
/// `link` keeps the current decision and only notes the hardlink.
pub fn apply_dedupe_policy(mut plan: Vec<PlanItem>, policy: DedupePolicy) -> Vec<PlanItem> {
    for group in find_duplicate_groups(&plan) {
        let canonical: PathBuf = plan[group[0]].src.clone();
        for &idx in &group[1..] {
            let item = &mut plan[idx];
            debug!(src = %item.src.display(), original = %canonical.display(), "duplicate content");
            let note = match policy {
                DedupePolicy::Skip => {
                    item.decision = Decision::Skip;
                    "duplicate: skip"
                }
                DedupePolicy::Delete => {
                    item.decision = Decision::Skip;
                    "duplicate: delete (preview)"
                }
                DedupePolicy::Link => "duplicate: link (preview)",
            };
            item.add_note(note);
            item.duplicate_of = Some(canonical.clone());
        }
    }
    plan
}

/// Content hash to destination, scoped to one batch.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: HashMap<String, PathBuf>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded destination for `hash` if it is still a file on disk.
    pub fn lookup(&self, hash: &str) -> Option<&Path> {
        self.entries
            .get(hash)
            .map(PathBuf::as_path)
            .filter(|path| path.is_file())
    }

    pub fn record(&mut self, hash: String, dest: PathBuf) {
        self.entries.insert(hash, dest);
    }
}
