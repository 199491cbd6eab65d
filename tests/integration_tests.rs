/// Integration tests for fileorg
///
/// These tests drive the library and the `fo` command line against real
/// temporary directories, covering the full plan, execute, record and undo
/// cycle.
///
/// Test categories:
/// 1. Planning and preview
/// 2. Execution and history
/// 3. Undo
/// 4. Command line
/// 5. Configuration and filtering
use clap::Parser;
use fileorg::cli::{Cli, dispatch};
use fileorg::history::{COMMAND_MERGE, COMMAND_RUN, SystemIdSource};
use fileorg::{
    Action, CollisionPolicy, Config, DateMode, Decision, DedupePolicy, ExecuteOptions,
    HistoryStore, PlanItem, PlanRequest, SizeBound, UndoEngine, UndoStatus, execute_plan,
    prepare_plan,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const MEDIA_DOCS_CONFIG: &str = r#"
[categories]
media = ["jpg"]
docs = [".PDF"]
"#;

/// A directory to organize plus a separate directory for history and config,
/// so neither file is picked up by discovery.
struct TestFixture {
    temp_dir: TempDir,
    state_dir: TempDir,
}

impl TestFixture {
    fn new() -> Self {
        TestFixture {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            state_dir: TempDir::new().expect("Failed to create state directory"),
        }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn history_path(&self) -> PathBuf {
        self.state_dir.path().join("history.json")
    }

    fn store(&self) -> HistoryStore {
        HistoryStore::new(self.history_path())
    }

    /// Writes a config file in the state directory and returns its path.
    fn write_config(&self, toml: &str) -> PathBuf {
        let path = self.state_dir.path().join("fo.toml");
        fs::write(&path, toml).expect("Failed to write config");
        path
    }

    fn create_file(&self, name: &str, content: &[u8]) {
        let file_path = self.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content).expect("Failed to write file content");
    }

    fn create_text_file(&self, name: &str, content: &str) {
        self.create_file(name, content.as_bytes());
    }

    /// Sets a file's modification time to `age_secs` seconds ago.
    fn age_file(&self, name: &str, age_secs: u64) {
        File::options()
            .write(true)
            .open(self.path().join(name))
            .expect("Failed to open file")
            .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .expect("Failed to set mtime");
    }

    fn read(&self, rel_path: &str) -> String {
        fs::read_to_string(self.path().join(rel_path)).expect("Failed to read file")
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(
            path.exists() && path.is_file(),
            "File should exist: {}",
            path.display()
        );
    }

    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    /// Count files directly in the test directory.
    fn count_files(&self) -> usize {
        fs::read_dir(self.path())
            .expect("Failed to read directory")
            .filter_map(|entry| entry.ok())
            .filter(|e| e.metadata().map(|m| m.is_file()).unwrap_or(false))
            .count()
    }

    /// Runs the command line with `--history` pointed at the fixture.
    fn fo(&self, args: &[&str]) -> anyhow::Result<()> {
        let history = self.history_path();
        let mut argv = vec!["fo", "--history", history.to_str().expect("utf-8 path")];
        argv.extend_from_slice(args);
        dispatch(Cli::try_parse_from(argv).expect("arguments should parse"))
    }

    /// Two identical 10-byte photos and a 5-byte document.
    fn seed_media_and_docs(&self) {
        self.create_text_file("a.jpg", "0123456789");
        self.create_text_file("b.jpg", "0123456789");
        self.create_text_file("c.pdf", "%PDF-");
    }

    fn plan(&self, config: &Config, customize: impl FnOnce(&mut PlanRequest)) -> Vec<PlanItem> {
        let mut request = PlanRequest::in_place(self.path(), config);
        customize(&mut request);
        prepare_plan(config, &request).expect("plan should build")
    }
}

fn media_docs_config() -> Config {
    Config::from_toml_str(MEDIA_DOCS_CONFIG).expect("config should parse")
}

fn options(config: &Config) -> ExecuteOptions {
    ExecuteOptions {
        collision: config.behavior.collision,
        dedupe: config.behavior.dedupe,
    }
}

// ============================================================================
// Test Suite 1: Planning and Preview
// ============================================================================

#[test]
fn test_preview_marks_duplicate_and_touches_nothing() {
    let fixture = TestFixture::new();
    fixture.seed_media_and_docs();
    let config = media_docs_config();

    let plan = fixture.plan(&config, |_| {});

    let srcs: Vec<String> = plan
        .iter()
        .map(|i| i.src.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(srcs, ["a.jpg", "b.jpg", "c.pdf"]);
    assert_eq!(plan[0].dest, fixture.path().join("media").join("a.jpg"));
    assert_eq!(plan[2].dest, fixture.path().join("docs").join("c.pdf"));
    assert_eq!(plan[1].decision, Decision::Skip);
    assert_eq!(plan[1].notes_text(), "duplicate: skip");
    assert_eq!(plan[1].duplicate_of.as_deref(), Some(fixture.path().join("a.jpg").as_path()));

    assert_eq!(fixture.count_files(), 3);
    assert!(!fixture.path().join("media").exists());
}

#[test]
fn test_unknown_extensions_without_others_are_left_out() {
    let fixture = TestFixture::new();
    fixture.create_text_file("notes.xyz", "x");
    fixture.create_text_file("photo.jpg", "x");

    let plan = fixture.plan(&media_docs_config(), |_| {});
    assert_eq!(plan.len(), 1);

    let plan = fixture.plan(&Config::default(), |_| {});
    assert_eq!(plan.len(), 2);
    assert!(plan.iter().any(|i| i.category == "others"));
}

#[test]
fn test_recursive_discovery_and_category_allow_list() {
    let fixture = TestFixture::new();
    fixture.create_text_file("top.jpg", "1");
    fixture.create_text_file("nested/deep.jpg", "22");
    fixture.create_text_file("nested/report.pdf", "333");
    let config = media_docs_config();

    assert_eq!(fixture.plan(&config, |_| {}).len(), 1);

    let plan = fixture.plan(&config, |r| {
        r.recursive = true;
        r.categories = vec!["MEDIA".into()];
    });
    assert_eq!(plan.len(), 2);
    assert!(plan.iter().all(|i| i.category == "media"));
}

#[test]
fn test_size_and_extension_filters() {
    let fixture = TestFixture::new();
    fixture.create_file("small.jpg", &[0u8; 100]);
    fixture.create_file("large.jpg", &[1u8; 4096]);
    fixture.create_file("large.pdf", &[2u8; 4096]);
    let config = media_docs_config();

    let plan = fixture.plan(&config, |r| {
        r.filter.size_min = Some(SizeBound::from("1KB"));
        r.filter.extensions = vec![".JPG".into()];
    });
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].src, fixture.path().join("large.jpg"));

    let mut request = PlanRequest::in_place(fixture.path(), &config);
    request.filter.size_min = Some(SizeBound::from("2KB"));
    request.filter.size_max = Some(SizeBound::from("1KB"));
    assert!(prepare_plan(&config, &request).is_err());
}

#[test]
fn test_by_date_partitions_destination() {
    let fixture = TestFixture::new();
    fixture.create_text_file("photo.jpg", "x");
    let modified: chrono::DateTime<chrono::Local> = fs::metadata(fixture.path().join("photo.jpg"))
        .unwrap()
        .modified()
        .unwrap()
        .into();

    let plan = fixture.plan(&media_docs_config(), |r| r.date_mode = Some(DateMode::Modified));
    let expected = fixture
        .path()
        .join("media")
        .join(modified.format("%Y").to_string())
        .join(modified.format("%m").to_string())
        .join("photo.jpg");
    assert_eq!(plan[0].dest, expected);
}

// ============================================================================
// Test Suite 2: Execution and History
// ============================================================================

#[test]
fn test_run_moves_unique_files_and_records_duplicate() {
    let fixture = TestFixture::new();
    fixture.seed_media_and_docs();
    let config = media_docs_config();
    let plan = fixture.plan(&config, |_| {});

    let report = execute_plan(&plan, options(&config), |_| {});
    assert_eq!(report.stats.moved, 2);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.stats.renamed, 0);
    assert_eq!(report.stats.skipped, 0);

    fixture.assert_file_exists("media/a.jpg");
    fixture.assert_file_exists("docs/c.pdf");
    fixture.assert_file_exists("b.jpg");
    fixture.assert_file_not_exists("media/b.jpg");
    fixture.assert_file_not_exists("a.jpg");

    let store = fixture.store();
    let batch = report.into_batch(
        &mut SystemIdSource::default(),
        COMMAND_RUN,
        fixture.path(),
        fixture.path(),
    );
    store.append_batch(batch.clone()).unwrap();

    let history = store.load();
    assert_eq!(history.batches().collect::<Vec<_>>(), vec![&batch]);
    assert_eq!(history.most_recent(Some("run")), Some(&batch));
    assert_eq!(batch.plan[1].action, Action::Duplicate);
    assert_eq!(batch.plan[1].dest, fixture.path().join("media").join("a.jpg"));
}

#[test]
fn test_keep_newest_replaces_older_destination_at_execution() {
    let fixture = TestFixture::new();
    fixture.create_text_file("docs/report.pdf", "old");
    fixture.create_text_file("report.pdf", "new");
    fixture.age_file("docs/report.pdf", 3600);
    let config = media_docs_config();

    let plan = fixture.plan(&config, |r| r.collision = CollisionPolicy::KeepNewest);
    assert_eq!(plan[0].decision, Decision::Move);
    assert_eq!(plan[0].dest_final, fixture.path().join("docs").join("report (2).pdf"));

    let opts = ExecuteOptions {
        collision: CollisionPolicy::KeepNewest,
        dedupe: DedupePolicy::Skip,
    };
    let report = execute_plan(&plan, opts, |_| {});
    assert_eq!(report.stats.moved, 1);
    assert_eq!(fixture.read("docs/report.pdf"), "new");
    fixture.assert_file_not_exists("docs/report (2).pdf");
    fixture.assert_file_not_exists("report.pdf");
}

#[test]
fn test_rename_collision_is_recorded_as_renamed() {
    let fixture = TestFixture::new();
    fixture.create_text_file("media/photo.jpg", "existing");
    fixture.create_text_file("photo.jpg", "incoming");
    let config = media_docs_config();

    let plan = fixture.plan(&config, |_| {});
    assert_eq!(plan[0].notes_text(), "collision: rename -> photo (2).jpg");

    let report = execute_plan(&plan, options(&config), |_| {});
    assert_eq!(report.stats.renamed, 1);
    assert_eq!(fixture.read("media/photo.jpg"), "existing");
    assert_eq!(fixture.read("media/photo (2).jpg"), "incoming");
}

#[test]
fn test_corrupt_history_is_replaced_on_next_append() {
    let fixture = TestFixture::new();
    fs::write(fixture.history_path(), "{ this is not json").unwrap();
    fixture.seed_media_and_docs();
    let config = media_docs_config();

    let plan = fixture.plan(&config, |_| {});
    let report = execute_plan(&plan, options(&config), |_| {});
    let batch = report.into_batch(
        &mut SystemIdSource::default(),
        COMMAND_RUN,
        fixture.path(),
        fixture.path(),
    );
    fixture.store().append_batch(batch).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fixture.history_path()).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["batches"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Test Suite 3: Undo
// ============================================================================

#[test]
fn test_undo_restores_every_moved_file() {
    let fixture = TestFixture::new();
    fixture.seed_media_and_docs();
    let config = media_docs_config();
    let plan = fixture.plan(&config, |_| {});
    let report = execute_plan(&plan, options(&config), |_| {});
    let batch = report.into_batch(
        &mut SystemIdSource::default(),
        COMMAND_RUN,
        fixture.path(),
        fixture.path(),
    );
    fixture.store().append_batch(batch).unwrap();

    let status = UndoEngine::new(fixture.store()).undo_last(true, |_| false);
    let UndoStatus::Completed(undo) = status else {
        panic!("expected a completed undo, got {:?}", status);
    };
    assert_eq!(undo.restored, 2);
    assert_eq!(undo.missing, 0);
    assert_eq!(undo.skipped, 0);
    assert_eq!(fixture.read("a.jpg"), "0123456789");
    assert_eq!(fixture.read("c.pdf"), "%PDF-");
    fixture.assert_file_exists("b.jpg");
    fixture.assert_file_not_exists("media/a.jpg");

    // Undo is not recorded; the same batch is still the latest run.
    assert_eq!(fixture.store().load().records().len(), 1);
}

#[test]
fn test_undo_reports_missing_when_file_was_removed() {
    let fixture = TestFixture::new();
    fixture.create_text_file("c.pdf", "%PDF-");
    let config = media_docs_config();
    let plan = fixture.plan(&config, |_| {});
    let report = execute_plan(&plan, options(&config), |_| {});
    let batch = report.into_batch(
        &mut SystemIdSource::default(),
        COMMAND_RUN,
        fixture.path(),
        fixture.path(),
    );
    fixture.store().append_batch(batch).unwrap();
    fs::remove_file(fixture.path().join("docs").join("c.pdf")).unwrap();

    let UndoStatus::Completed(undo) = UndoEngine::new(fixture.store()).undo_last(true, |_| true)
    else {
        panic!("expected a completed undo");
    };
    assert_eq!(undo.missing, 1);
    assert_eq!(undo.restored, 0);
}

// ============================================================================
// Test Suite 4: Command Line
// ============================================================================

#[test]
fn test_cli_run_then_undo() {
    let fixture = TestFixture::new();
    fixture.seed_media_and_docs();
    let config = fixture.write_config(MEDIA_DOCS_CONFIG);
    let root = fixture.path().to_str().unwrap().to_string();

    fixture
        .fo(&["--config", config.to_str().unwrap(), "run", "--path", &root])
        .unwrap();
    fixture.assert_file_exists("media/a.jpg");
    fixture.assert_file_exists("docs/c.pdf");
    fixture.assert_file_exists("b.jpg");

    let history = fixture.store().load();
    let batches: Vec<_> = history.batches().collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].command, COMMAND_RUN);
    assert_eq!(batches[0].stats.moved, 2);
    assert_eq!(batches[0].stats.duplicates, 1);

    fixture.fo(&["undo", "--yes"]).unwrap();
    fixture.assert_file_exists("a.jpg");
    fixture.assert_file_exists("c.pdf");
    fixture.assert_file_not_exists("media/a.jpg");
}

#[test]
fn test_cli_recursive_rerun_leaves_organized_files_alone() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.jpg", "photo");
    fixture.create_text_file("c.pdf", "%PDF-");
    let config = fixture.write_config(MEDIA_DOCS_CONFIG);
    let root = fixture.path().to_str().unwrap().to_string();
    let args = ["--config", config.to_str().unwrap(), "run", "--recursive", "--path", &root];

    fixture.fo(&args).unwrap();
    fixture.assert_file_exists("media/a.jpg");
    fixture.assert_file_exists("docs/c.pdf");

    let replan = fixture.plan(&Config::load_from_file(&config).unwrap(), |request| {
        request.recursive = true;
    });
    assert!(replan.is_empty());

    fixture.fo(&args).unwrap();
    fixture.assert_file_exists("media/a.jpg");
    fixture.assert_file_exists("docs/c.pdf");
    fixture.assert_file_not_exists("media/a (2).jpg");
    fixture.assert_file_not_exists("docs/c (2).pdf");

    let history = fixture.store().load();
    let second = history.batches().last().unwrap();
    assert!(second.plan.is_empty());
    assert_eq!(second.stats.renamed, 0);
}

#[test]
fn test_cli_dry_run_changes_nothing() {
    let fixture = TestFixture::new();
    fixture.seed_media_and_docs();
    let config = fixture.write_config(MEDIA_DOCS_CONFIG);
    let root = fixture.path().to_str().unwrap().to_string();

    fixture
        .fo(&["--config", config.to_str().unwrap(), "run", "--path", &root, "--dry-run"])
        .unwrap();
    fixture
        .fo(&["--config", config.to_str().unwrap(), "preview", "--path", &root])
        .unwrap();

    assert_eq!(fixture.count_files(), 3);
    assert!(!fixture.history_path().exists());
}

#[test]
fn test_cli_merge_is_recorded_but_never_undone() {
    let fixture = TestFixture::new();
    fixture.create_text_file("incoming/photo.jpg", "p");
    fixture.create_text_file("incoming/paper.pdf", "d");
    let config = fixture.write_config(MEDIA_DOCS_CONFIG);
    let src = fixture.path().join("incoming");
    let dest = fixture.path().join("library");

    fixture
        .fo(&[
            "--config",
            config.to_str().unwrap(),
            "merge",
            "--src",
            src.to_str().unwrap(),
            "--dest",
            dest.to_str().unwrap(),
            "--yes",
        ])
        .unwrap();
    fixture.assert_file_exists("library/media/photo.jpg");
    fixture.assert_file_exists("library/docs/paper.pdf");

    let history = fixture.store().load();
    let merged = history.batches().next().unwrap();
    assert_eq!(merged.command, COMMAND_MERGE);
    assert_eq!(merged.source_dir, src);
    assert_eq!(merged.dest_dir, dest);

    let status = UndoEngine::new(fixture.store()).undo_last(true, |_| true);
    assert_eq!(status, UndoStatus::NothingToUndo);
    fixture.assert_file_exists("library/media/photo.jpg");
}

#[test]
fn test_cli_rejects_bad_size_range() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.jpg", "x");
    let root = fixture.path().to_str().unwrap().to_string();

    let result = fixture.fo(&["run", "--path", &root, "--size-min", "2MB", "--size-max", "1MB"]);
    assert!(result.is_err());
    fixture.assert_file_exists("a.jpg");
}

#[test]
fn test_cli_validate_config() {
    let fixture = TestFixture::new();
    let good = fixture.write_config(MEDIA_DOCS_CONFIG);
    assert!(fixture.fo(&["--config", good.to_str().unwrap(), "validate-config"]).is_ok());

    let missing = fixture.state_dir.path().join("absent.toml");
    assert!(fixture.fo(&["--config", missing.to_str().unwrap(), "validate-config"]).is_err());

    let bad = fixture.write_config("[filters]\nexclude_patterns = [\"[\"]\n");
    assert!(fixture.fo(&["--config", bad.to_str().unwrap(), "validate-config"]).is_err());
}

// ============================================================================
// Test Suite 5: Configuration and Filtering
// ============================================================================

#[test]
fn test_config_filters_exclude_files_from_plan() {
    let fixture = TestFixture::new();
    fixture.create_text_file(".hidden.jpg", "h");
    fixture.create_text_file("keep.jpg", "k");
    fixture.create_text_file("draft.tmp.jpg", "t");
    fixture.create_text_file("Thumbs.jpg", "t2");

    let config = Config::from_toml_str(
        r#"
[categories]
media = ["jpg"]

[filters]
enable_hidden_files = false
exclude_filenames = ["Thumbs.jpg"]
exclude_patterns = ["*.tmp.*"]
"#,
    )
    .unwrap();

    let plan = fixture.plan(&config, |_| {});
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].src, fixture.path().join("keep.jpg"));
}

#[test]
fn test_hidden_files_included_by_default() {
    let fixture = TestFixture::new();
    fixture.create_text_file(".hidden.jpg", "h");

    let plan = fixture.plan(&media_docs_config(), |_| {});
    assert_eq!(plan.len(), 1);
}

#[test]
fn test_config_behavior_sets_default_policies() {
    let config = Config::from_toml_str(
        r#"
[behavior]
collision = "skip"
dedupe = "link"
"#,
    )
    .unwrap();
    let fixture = TestFixture::new();
    let request = PlanRequest::in_place(fixture.path(), &config);

    assert_eq!(request.collision, CollisionPolicy::Skip);
    assert_eq!(request.dedupe, DedupePolicy::Link);
    assert!(config.has_category("media"));
}
