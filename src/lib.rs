//! fileorg - organize files into category folders, with undo
//!
//! This library discovers and filters files, classifies them by extension,
//! builds a previewable move plan with collision and duplicate annotations,
//! executes it against the live filesystem, and records each executed batch in
//! a crash-safe history so the latest run can be reverted.

pub mod catalog;
pub mod classifier;
pub mod cli;
pub mod collision;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod executor;
pub mod history;
pub mod output;
pub mod planner;
pub mod undo;

pub use catalog::{FileFilter, SizeBound, discover, parse_size};
pub use classifier::{Classification, ClassificationReason, Classifier};
pub use collision::{CollisionPolicy, next_free_name};
pub use config::{CategoryRule, CompiledFilters, Config, ConfigError};
pub use dedupe::{DedupePolicy, HashCache};
pub use error::{OrganizeError, OrganizeResult};
pub use executor::{ExecuteOptions, ExecutionReport, execute_plan};
pub use history::{Action, Batch, BatchRecord, BatchStats, History, HistoryStore, PlanEntry};
pub use planner::{DateMode, Decision, PlanItem, PlanRequest, prepare_plan};
pub use undo::{UndoEngine, UndoReport, UndoStatus};
