//! Error types shared across the organizer pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while planning, executing or recording a batch.
#[derive(Error, Debug)]
pub enum OrganizeError {
    /// A size bound could not be parsed.
    #[error("Invalid size '{input}': {reason}")]
    InvalidSize { input: String, reason: String },

    /// The lower size bound exceeds the upper one.
    #[error("Invalid size range: size_min ({min}) > size_max ({max})")]
    InvalidSizeRange { min: u64, max: u64 },

    /// A collision/dedupe policy or date mode string was not recognized.
    #[error("Invalid {kind} '{value}'")]
    InvalidPolicy { kind: &'static str, value: String },

    /// The filter configuration could not be compiled.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Failed to create a destination directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to move a file to its destination.
    #[error("Failed to move {} to {}: {reason}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        reason: std::io::Error,
    },

    /// Every incremental candidate name was already taken.
    #[error("No free name for {} after {attempts} attempts", .path.display())]
    NoFreeName { path: PathBuf, attempts: u32 },

    /// The destination of a replace is not a regular file.
    #[error("The destination is not a file: {}", .path.display())]
    DestinationNotFile { path: PathBuf },

    /// Reading a file's contents or metadata failed.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the history file.
    #[error("Failed to write history file {}: {source}", .path.display())]
    HistoryWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The history document could not be serialized.
    #[error("Failed to serialize history: {0}")]
    HistorySerialize(#[from] serde_json::Error),
}

/// Result type for organizer operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;
