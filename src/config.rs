//! Category, behavior and filter configuration.
//!
//! Configuration is stored in TOML. Category tables keep their file order,
//! which matters: when an extension is listed under several categories the
//! one declared last wins.
//!
//! ```toml
//! [categories]
//! media = ["jpg", "png"]
//! docs = [".PDF", "txt"]
//! others = []
//!
//! [behavior]
//! collision = "rename"      # rename | keep-newest | skip
//! dedupe = "skip"           # skip | link | delete
//! follow_symlinks = false
//! others_enabled = true
//!
//! [filters]
//! enable_hidden_files = true
//! exclude_filenames = [".DS_Store"]
//! exclude_patterns = ["*.part"]
//! ```

use crate::collision::CollisionPolicy;
use crate::dedupe::DedupePolicy;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during configuration loading and filtering.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// A named category and the extensions that belong to it.
///
/// Extensions are stored lowercase and without a leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub name: String,
    pub extensions: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: normalize_extensions(extensions.iter().copied()),
        }
    }
}

/// Collision, dedupe and discovery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    pub collision: CollisionPolicy,
    pub dedupe: DedupePolicy,
    pub follow_symlinks: bool,
    pub others_enabled: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::Rename,
            dedupe: DedupePolicy::Skip,
            follow_symlinks: false,
            others_enabled: true,
        }
    }
}

/// Rules for excluding files before they reach the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to true.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub exclude_filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp", "cache/**").
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_enable_hidden_files() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude_filenames: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// The normalized configuration consumed by the planner.
#[derive(Debug, Clone)]
pub struct Config {
    /// Categories in declaration order.
    pub categories: Vec<CategoryRule>,
    pub behavior: Behavior,
    pub filters: FilterRules,
}

/// On-disk shape; every section is optional and values are validated leniently.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    categories: toml::Table,
    #[serde(default)]
    behavior: RawBehavior,
    #[serde(default)]
    filters: FilterRules,
}

#[derive(Debug, Default, Deserialize)]
struct RawBehavior {
    collision: Option<String>,
    dedupe: Option<String>,
    follow_symlinks: Option<bool>,
    others_enabled: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryRule::new(
                    "media",
                    &[
                        "jpg", "jpeg", "png", "gif", "webp", "svg", "heic", "mp4", "mkv", "avi",
                        "mov", "mp3", "wav", "flac", "m4a",
                    ],
                ),
                CategoryRule::new(
                    "docs",
                    &[
                        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "md", "rtf",
                        "csv",
                    ],
                ),
                CategoryRule::new(
                    "code",
                    &[
                        "py", "js", "ts", "html", "css", "json", "yml", "yaml", "sql", "sh", "bat",
                        "ps1",
                    ],
                ),
                CategoryRule::new("archives", &["zip", "rar", "7z", "tar", "gz", "bz2"]),
                CategoryRule::new("executables", &["exe", "msi", "dmg", "app", "bin"]),
                CategoryRule::new("others", &[]),
            ],
            behavior: Behavior::default(),
            filters: FilterRules::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.fo.toml` in the current directory
    /// 3. Look for `~/.config/fo/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is found but cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".fo.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("fo")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        debug!("no configuration file found; using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), categories = config.categories.len(), "configuration loaded");
        Ok(config)
    }

    /// Parse and normalize a TOML document.
    ///
    /// Unknown behavior values are ignored with a warning and the default is kept.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        let mut config = Self::default();

        let categories = normalize_categories(&raw.categories);
        if !categories.is_empty() {
            config.categories = categories;
        }

        if let Some(value) = raw.behavior.collision {
            match value.parse() {
                Ok(policy) => config.behavior.collision = policy,
                Err(_) => warn!("ignoring unknown collision policy '{}'", value),
            }
        }
        if let Some(value) = raw.behavior.dedupe {
            match value.parse() {
                Ok(policy) => config.behavior.dedupe = policy,
                Err(_) => warn!("ignoring unknown dedupe policy '{}'", value),
            }
        }
        if let Some(follow) = raw.behavior.follow_symlinks {
            config.behavior.follow_symlinks = follow;
        }
        if let Some(enabled) = raw.behavior.others_enabled {
            config.behavior.others_enabled = enabled;
        }
        config.filters = raw.filters;

        Ok(config)
    }

    /// Returns true if a category with this name is configured.
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.name == name)
    }

    /// Compile the filter rules for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob pattern is invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Lowercases category names and cleans their extension lists.
///
/// Entries that are not arrays are skipped. A repeated name keeps its first
/// position but takes the later extension list.
fn normalize_categories(table: &toml::Table) -> Vec<CategoryRule> {
    let mut out: Vec<CategoryRule> = Vec::new();
    for (name, value) in table {
        let Some(list) = value.as_array() else {
            warn!("ignoring category '{}': expected a list of extensions", name);
            continue;
        };
        let extensions = normalize_extensions(list.iter().filter_map(|v| v.as_str()));
        let name = name.trim().to_lowercase();
        match out.iter_mut().find(|rule| rule.name == name) {
            Some(rule) => rule.extensions = extensions,
            None => out.push(CategoryRule { name, extensions }),
        }
    }
    out
}

/// Lowercase, trim, strip one leading dot, drop empties and duplicates.
pub fn normalize_extensions<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let lowered = item.trim().to_lowercase();
        let ext = lowered.strip_prefix('.').unwrap_or(lowered.as_str());
        if !ext.is_empty() && seen.insert(ext.to_string()) {
            out.push(ext.to_string());
        }
    }
    out
}

/// Compiled filter structures for efficient file matching.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude_filenames.iter().cloned().collect(),
            exclude_patterns,
        })
    }

    /// Check if a file should be kept for planning.
    ///
    /// Glob patterns are matched against both the full path and the bare file name.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|p| p.matches_path(file_path) || p.matches(&file_name))
    }

    /// Keep only the files that pass [`Self::should_include`].
    pub fn apply(&self, files: Vec<PathBuf>) -> Vec<PathBuf> {
        files.into_iter().filter(|f| self.should_include(f)).collect()
    }
}
