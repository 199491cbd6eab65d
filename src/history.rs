//! Persistent, append-only batch history.
//!
//! The history is one JSON document, read whole, changed in memory and written
//! back through a temp file + rename, so a reader never observes a partial
//! write. Each append costs O(history size); that keeps the atomic-rename
//! guarantee without an incremental log format.

use crate::error::{OrganizeError, OrganizeResult};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// Current schema version of the history document.
pub const HISTORY_VERSION: u64 = 1;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_RANDOM_LEN: usize = 5;

/// Command names recorded on batches.
pub const COMMAND_RUN: &str = "run";
pub const COMMAND_MERGE: &str = "merge";

/// What happened to one plan entry during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Moved,
    Renamed,
    Skipped,
    Duplicate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Moved => "moved",
            Action::Renamed => "renamed",
            Action::Skipped => "skipped",
            Action::Duplicate => "duplicate",
        }
    }

    /// Only moved and renamed entries changed the filesystem.
    pub fn is_reversible(&self) -> bool {
        matches!(self, Action::Moved | Action::Renamed)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub action: Action,
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    #[serde(default)]
    pub moved: usize,
    #[serde(default)]
    pub renamed: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub duplicates: usize,
}

impl BatchStats {
    pub fn record(&mut self, action: Action) {
        match action {
            Action::Moved => self.moved += 1,
            Action::Renamed => self.renamed += 1,
            Action::Skipped => self.skipped += 1,
            Action::Duplicate => self.duplicates += 1,
        }
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "moved: {} renamed: {} skipped: {} duplicates: {}",
            self.moved, self.renamed, self.skipped, self.duplicates
        )
    }
}

/// One command invocation's executed moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub batch_id: String,
    pub created_at: String,
    pub command: String,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub plan: Vec<PlanEntry>,
    pub stats: BatchStats,
}

/// Lenient on-disk batch shape. Older files carry `timestamp` instead of, or
/// next to, `created_at`.
#[derive(Deserialize)]
struct StoredBatch {
    #[serde(default)]
    batch_id: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    command: String,
    #[serde(default)]
    source_dir: Option<PathBuf>,
    #[serde(default)]
    dest_dir: Option<PathBuf>,
    #[serde(default)]
    plan: Vec<PlanEntry>,
    #[serde(default)]
    stats: BatchStats,
}

impl From<StoredBatch> for Batch {
    fn from(stored: StoredBatch) -> Self {
        Self {
            batch_id: stored.batch_id,
            created_at: stored
                .created_at
                .filter(|s| !s.trim().is_empty())
                .or(stored.timestamp)
                .unwrap_or_default(),
            command: stored.command,
            source_dir: stored.source_dir.unwrap_or_default(),
            dest_dir: stored.dest_dir.unwrap_or_default(),
            plan: stored.plan,
            stats: stored.stats,
        }
    }
}

/// One element of the `batches` array.
///
/// The stored JSON is what gets written back, untouched. `batch` is the typed
/// view used for lookups and undo, absent when the element does not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    raw: Value,
    batch: Option<Batch>,
}

impl BatchRecord {
    fn from_raw(raw: Value) -> Self {
        let batch = if raw.is_object() {
            match StoredBatch::deserialize(&raw) {
                Ok(stored) => Some(Batch::from(stored)),
                Err(e) => {
                    warn!("unreadable batch record kept as-is: {}", e);
                    None
                }
            }
        } else {
            debug!("non-object batch record kept as-is");
            None
        };
        Self { raw, batch }
    }

    fn from_batch(batch: Batch) -> OrganizeResult<Self> {
        Ok(Self {
            raw: serde_json::to_value(&batch)?,
            batch: Some(batch),
        })
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl Serialize for BatchRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// The whole history document.
///
/// Records are only ever appended. Unknown top-level keys and records that do
/// not decode are carried through every rewrite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    pub version: u64,
    #[serde(rename = "batches")]
    records: Vec<BatchRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            version: HISTORY_VERSION,
            records: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl History {
    /// Parses a history document, falling back field by field to defaults.
    ///
    /// Never fails: an empty, corrupt or non-object document yields an empty
    /// history. A non-integer `version` or non-array `batches` is reset on its
    /// own; everything else is kept.
    pub fn from_json_lenient(raw: &str) -> Self {
        if raw.trim().is_empty() {
            warn!("history file is empty; using defaults");
            return Self::default();
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                error!("history file is corrupted ({}); using defaults", e);
                return Self::default();
            }
        };
        let Value::Object(mut root) = value else {
            warn!("history root is not an object; using defaults");
            return Self::default();
        };

        let version = root
            .remove("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(HISTORY_VERSION);

        let records = match root.remove("batches") {
            Some(Value::Array(items)) => items.into_iter().map(BatchRecord::from_raw).collect(),
            _ => Vec::new(),
        };

        Self {
            version,
            records,
            extra: root,
        }
    }

    /// Every stored record, readable or not, in file order.
    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    /// The records that decode as batches, in file order.
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.records.iter().filter_map(BatchRecord::batch)
    }

    /// Appends `batch` after every existing record.
    pub fn push(&mut self, batch: Batch) -> OrganizeResult<()> {
        self.records.push(BatchRecord::from_batch(batch)?);
        Ok(())
    }

    /// Id of the most recent batch, optionally restricted to one command.
    ///
    /// Recency comes from each batch's parsed `created_at`; when two batches
    /// share a timestamp the one listed first wins.
    pub fn most_recent(&self, command: Option<&str>) -> Option<&Batch> {
        let mut best: Option<(&Batch, DateTime<Utc>)> = None;
        for batch in self.batches() {
            if batch.batch_id.is_empty() {
                continue;
            }
            if let Some(wanted) = command
                && !batch.command.eq_ignore_ascii_case(wanted)
            {
                continue;
            }
            let when = parse_timestamp(&batch.created_at);
            if best.is_none_or(|(_, current)| when > current) {
                best = Some((batch, when));
            }
        }
        best.map(|(batch, _)| batch)
    }
}

/// Tolerant timestamp parser.
///
/// Accepts RFC 3339 (with `Z` or an offset), naive ISO-8601 date-times taken
/// as UTC, then the first 19 characters as `YYYY-MM-DDTHH:MM:SS`. Anything else
/// maps to the Unix epoch.
pub fn parse_timestamp(text: &str) -> DateTime<Utc> {
    let s = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return naive.and_utc();
        }
    }
    s.get(..19)
        .and_then(|prefix| NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S").ok())
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Clock and randomness used to stamp batches.
pub trait IdSource {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Local>;
    /// One character drawn from `alphabet`.
    fn pick(&mut self, alphabet: &[u8]) -> u8;
}

/// System clock and v4 UUID entropy.
#[derive(Debug, Default)]
pub struct SystemIdSource {
    pool: Vec<u8>,
}

impl IdSource for SystemIdSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn pick(&mut self, alphabet: &[u8]) -> u8 {
        if self.pool.is_empty() {
            self.pool.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        }
        let byte = self.pool.pop().unwrap_or_default();
        alphabet[byte as usize % alphabet.len()]
    }
}

/// Builds `[prefix-]YYYYMMDD-HHMMSSZ-XXXXX` from the source's UTC time.
pub fn generate_batch_id(source: &mut impl IdSource, prefix: &str) -> String {
    let stamp = source.now().with_timezone(&Utc).format("%Y%m%d-%H%M%SZ");
    let random: String = (0..ID_RANDOM_LEN)
        .map(|_| source.pick(ID_ALPHABET) as char)
        .collect();
    let core = format!("{}-{}", stamp, random);
    let prefix = prefix.trim_matches('-');
    if prefix.is_empty() {
        core
    } else {
        format!("{}-{}", prefix, core)
    }
}

impl Batch {
    /// Stamps a new batch with a fresh id and the current local time.
    pub fn new(
        source: &mut impl IdSource,
        command: &str,
        source_dir: &Path,
        dest_dir: &Path,
        plan: Vec<PlanEntry>,
        stats: BatchStats,
    ) -> Self {
        let created_at = source.now().format("%Y-%m-%dT%H:%M:%S").to_string();
        Self {
            batch_id: generate_batch_id(source, ""),
            created_at,
            command: command.to_string(),
            source_dir: source_dir.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
            plan,
            stats,
        }
    }
}

/// The history file on disk.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.fo/history.json`, or `.fo/history.json` without a home directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".fo")
            .join("history.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the history; never fails.
    ///
    /// A missing file is bootstrapped with an empty document on disk. Read and
    /// parse problems are logged and give an empty history, so the next save
    /// replaces whatever was there.
    pub fn load(&self) -> History {
        if !self.path.exists() {
            info!("history file does not exist, creating: {}", self.path.display());
            let history = History::default();
            if let Err(e) = self.save(&history) {
                error!("could not bootstrap history file: {}", e);
            }
            return history;
        }

        match fs::read_to_string(&self.path) {
            Ok(raw) => History::from_json_lenient(&raw),
            Err(e) => {
                error!(
                    "could not read history file {} ({}); using defaults",
                    self.path.display(),
                    e
                );
                History::default()
            }
        }
    }

    /// Atomically replaces the history file with `history`.
    ///
    /// # Errors
    ///
    /// Any serialization or I/O failure is returned; the previous file is left
    /// untouched in that case.
    pub fn save(&self, history: &History) -> OrganizeResult<()> {
        let staged = self.stage(history)?;
        self.commit(staged)?;
        debug!("history saved: {}", self.path.display());
        Ok(())
    }

    /// Writes the document to a synced temp file beside the target.
    fn stage(&self, history: &History) -> OrganizeResult<NamedTempFile> {
        let write_failed = |source| OrganizeError::HistoryWriteFailed {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_failed)?;

        let json = serde_json::to_string_pretty(history)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "history.json".to_string());

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}.tmp-", file_name))
            .tempfile_in(&dir)
            .map_err(write_failed)?;
        tmp.write_all(json.as_bytes()).map_err(write_failed)?;
        tmp.flush().map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        Ok(tmp)
    }

    /// Renames a staged temp file over the target.
    fn commit(&self, staged: NamedTempFile) -> OrganizeResult<()> {
        staged
            .persist(&self.path)
            .map_err(|e| OrganizeError::HistoryWriteFailed {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }

    /// Loads, appends `batch`, and saves.
    ///
    /// # Errors
    ///
    /// Write failures are returned: losing the record of moves already made
    /// on disk must stop the caller.
    pub fn append_batch(&self, batch: Batch) -> OrganizeResult<()> {
        let mut history = self.load();
        let batch_id = batch.batch_id.clone();
        history.push(batch)?;
        if let Err(e) = self.save(&history) {
            error!("error saving history: {}", e);
            return Err(e);
        }
        info!("batch added to history: {}", batch_id);
        Ok(())
    }

    /// Id of the most recent batch recorded under `command`, if any.
    pub fn most_recent_id(&self, command: Option<&str>) -> Option<String> {
        self.load()
            .most_recent(command)
            .map(|batch| batch.batch_id.clone())
    }
}
