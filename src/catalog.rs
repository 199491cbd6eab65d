//! File discovery and size/extension filtering.

use crate::config::normalize_extensions;
use crate::error::{OrganizeError, OrganizeResult};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]*\.?[0-9]+)([a-z]*)$").expect("size pattern is valid")
});

/// A file size bound, either already in bytes or still in text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeBound {
    Bytes(u64),
    Text(String),
}

impl SizeBound {
    /// Resolve the bound to a byte count.
    pub fn to_bytes(&self) -> OrganizeResult<u64> {
        match self {
            SizeBound::Bytes(n) => Ok(*n),
            SizeBound::Text(text) => parse_size(text),
        }
    }
}

impl From<u64> for SizeBound {
    fn from(value: u64) -> Self {
        SizeBound::Bytes(value)
    }
}

impl From<&str> for SizeBound {
    fn from(value: &str) -> Self {
        SizeBound::Text(value.to_string())
    }
}

impl From<String> for SizeBound {
    fn from(value: String) -> Self {
        SizeBound::Text(value)
    }
}

/// Parses a human size such as `"512"`, `"1.5KB"`, `"2 gib"` into bytes.
///
/// All units are powers of 1024, with or without the `i`. Decimals are
/// rounded to the nearest byte.
///
/// # Examples
///
/// ```
/// use fileorg::catalog::parse_size;
///
/// assert_eq!(parse_size("1.5KB").unwrap(), 1536);
/// assert_eq!(parse_size("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
/// assert!(parse_size("-1").is_err());
/// assert!(parse_size("abc").is_err());
/// ```
pub fn parse_size(text: &str) -> OrganizeResult<u64> {
    let invalid = |reason: &str| OrganizeError::InvalidSize {
        input: text.to_string(),
        reason: reason.to_string(),
    };

    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if compact.is_empty() {
        return Err(invalid("empty string"));
    }

    let caps = SIZE_RE
        .captures(&compact)
        .ok_or_else(|| invalid("unrecognized format"))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| invalid("not a valid number"))?;

    let factor: u64 = match &caps[2] {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024u64.pow(2),
        "g" | "gb" | "gib" => 1024u64.pow(3),
        "t" | "tb" | "tib" => 1024u64.pow(4),
        _ => return Err(invalid("unknown unit, use B, KB, MB, GB, TB, KiB, MiB, GiB, TiB")),
    };

    let bytes = (value * factor as f64).round();
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(invalid("value too large"));
    }
    Ok(bytes as u64)
}

/// Sort paths by their lowercased string form.
pub(crate) fn sort_case_insensitive(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| p.to_string_lossy().to_lowercase());
}

/// Lists the files under `root`, sorted case-insensitively.
///
/// A missing or non-directory root yields an empty list. Entries that cannot be
/// read are omitted. Symlinks to files are only listed when `follow_symlinks` is
/// set; symlinked directories are never descended into.
pub fn discover(root: &Path, recursive: bool, follow_symlinks: bool) -> Vec<PathBuf> {
    if !root.is_dir() {
        debug!(root = %root.display(), "discovery root is not a directory");
        return Vec::new();
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(false);

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let file_type = entry.file_type();
            file_type.is_file()
                || (follow_symlinks && file_type.is_symlink() && entry.path().is_file())
        })
        .map(|entry| entry.into_path())
        .collect();

    sort_case_insensitive(&mut files);
    files
}

/// Filters applied to discovered files before planning.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Allowed extensions; empty means every extension is allowed.
    pub extensions: Vec<String>,
    pub size_min: Option<SizeBound>,
    pub size_max: Option<SizeBound>,
}

impl FileFilter {
    /// Keep the files that match the extension allow-set and size bounds.
    ///
    /// # Errors
    ///
    /// Fails when a size bound is malformed or `size_min > size_max`. Per-file
    /// stat errors are not errors; the file is dropped.
    pub fn apply(&self, files: &[PathBuf]) -> OrganizeResult<Vec<PathBuf>> {
        let allow: Option<HashSet<String>> = {
            let normalized = normalize_extensions(self.extensions.iter().map(String::as_str));
            (!normalized.is_empty()).then(|| normalized.into_iter().collect())
        };

        let min = self.size_min.as_ref().map(SizeBound::to_bytes).transpose()?;
        let max = self.size_max.as_ref().map(SizeBound::to_bytes).transpose()?;
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(OrganizeError::InvalidSizeRange { min, max });
        }

        let mut out: Vec<PathBuf> = files
            .iter()
            .filter(|path| {
                allow
                    .as_ref()
                    .is_none_or(|set| set.contains(&extension_of(path)))
            })
            .filter(|path| match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    let size = meta.len();
                    min.is_none_or(|m| size >= m) && max.is_none_or(|m| size <= m)
                }
                _ => false,
            })
            .cloned()
            .collect();

        sort_case_insensitive(&mut out);
        Ok(out)
    }
}

/// Lowercased extension without the dot; empty when the file has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Splits a comma separated list such as `".jpg, PDF"` into trimmed items.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
