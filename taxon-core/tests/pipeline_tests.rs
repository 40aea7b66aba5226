// Tests for the file-level pipeline stages

mod common;

use common::{DOWNLOAD_CSV, SCRAPED_CSV, TREE_JSON, write_fixture};
use std::fs;
use std::path::Path;
use taxon_core::data::Database;
use taxon_core::pipeline::{
    OfflineInputs, OutputLayout, PipelineConfig, load_immediate_parents, load_reconciled,
    read_tree_file, reconcile_files, run_offline, verify_files, write_closure, write_sources,
};
use taxon_core::{CoreError, ExclusionPolicy, JoinSpec, Lineage, Presence};
use tempfile::TempDir;

const PASSING: [&str; 4] = [
    "261QA1903X",
    "261Q00000X",
    "Ambulatory Health Care Facilities",
    "Non-individual",
];

fn passing_config() -> PipelineConfig {
    PipelineConfig {
        lineages: vec![Lineage::from_tokens(&PASSING)],
        ..Default::default()
    }
}

fn write_inputs(dir: &Path, tree_json: &str) -> OfflineInputs {
    OfflineInputs {
        tree_file: write_fixture(dir, "tree.json", tree_json),
        download_csv: write_fixture(dir, "download.csv", DOWNLOAD_CSV),
        scraped_csv: write_fixture(dir, "scraped.csv", SCRAPED_CSV),
    }
}

// ============================================================================
// Output Layout Tests
// ============================================================================

#[test]
fn test_output_layout_file_names() {
    let layout = OutputLayout::in_dir("data");

    assert_eq!(layout.ancestors, Path::new("data/nucc_parent_code.csv"));
    assert_eq!(layout.merged, Path::new("data/merged_nucc_data.csv"));
    assert_eq!(
        layout.subset_path(Presence::RightOnly),
        Path::new("data/subsets_from_merge/only_in_scrapped.csv")
    );
    assert_eq!(layout.report_json, Path::new("data/verification_report.json"));
}

// ============================================================================
// Stage Tests
// ============================================================================

#[test]
fn test_write_closure_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path());
    let tree_file = write_fixture(temp_dir.path(), "tree.json", TREE_JSON);

    let tree = read_tree_file(&tree_file).unwrap();
    let outcome = write_closure(&tree, &ExclusionPolicy::nucc(), &layout).unwrap();
    assert_eq!(outcome.closure.len(), 14);

    let ancestors = fs::read_to_string(&layout.ancestors).unwrap();
    assert!(ancestors.starts_with("ancestor_id,child_id\n"));
    assert_eq!(ancestors.lines().count(), 15);

    let parents = load_immediate_parents(&layout.immediate_parents).unwrap();
    assert_eq!(parents.len(), 6);
    assert_eq!(parents.get(&2500), Some(&2496));
    assert_eq!(parents.get(&2), None);
}

#[test]
fn test_read_missing_tree_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = read_tree_file(&temp_dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CoreError::FileNotFound(_)));
}

#[test]
fn test_reconcile_files_without_closure() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("out"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);

    let output = reconcile_files(
        &inputs.download_csv,
        &inputs.scraped_csv,
        None,
        &layout,
        &JoinSpec::nucc(),
    )
    .unwrap();

    assert!(output.coverage.is_none());
    assert_eq!(output.reconciliation.counts.total(), 7);
    assert!(layout.merged.exists());
    assert!(layout.summary.exists());
    assert!(!layout.missing.exists());
    for presence in [Presence::Both, Presence::LeftOnly, Presence::RightOnly] {
        assert!(layout.subset_path(presence).exists());
    }

    let reloaded = load_reconciled(&layout.merged, &JoinSpec::nucc()).unwrap();
    assert_eq!(reloaded.counts(), output.reconciliation.counts);
}

#[test]
fn test_write_sources() {
    let temp_dir = TempDir::new().unwrap();
    let nodes = write_fixture(temp_dir.path(), "nucc_codes.csv", SCRAPED_CSV);
    let output = temp_dir.path().join("nucc_sources.csv");

    assert_eq!(write_sources(&nodes, &output).unwrap(), 1);
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("nucc_code_id,full_source_text,source_date,source_date_note,extracted_urls\n"));
    assert!(text.contains("https://www.example.org"));
}

// ============================================================================
// Offline Run Tests
// ============================================================================

#[test]
fn test_run_offline_writes_every_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);

    let report = run_offline(&inputs, &layout, &passing_config(), None).unwrap();

    assert!(report.passed());
    assert!(report.run_id.is_none());
    for path in [
        &layout.ancestors,
        &layout.immediate_parents,
        &layout.merged,
        &layout.summary,
        &layout.missing,
        &layout.report_text,
        &layout.report_json,
    ] {
        assert!(path.exists(), "{} missing", path.display());
    }

    // a node absent from the scraped table is reported, not fatal
    let coverage = report.coverage.unwrap();
    assert_eq!(coverage.missing, vec!["9999"]);
    let missing = fs::read_to_string(&layout.missing).unwrap();
    assert!(missing.contains("nucc_parent_code.csv"));
    assert!(missing.ends_with("9999\n"));
}

#[test]
fn test_run_offline_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);
    let config = passing_config();

    run_offline(&inputs, &layout, &config, None).unwrap();
    let ancestors = fs::read(&layout.ancestors).unwrap();
    let merged = fs::read(&layout.merged).unwrap();

    run_offline(&inputs, &layout, &config, None).unwrap();
    assert_eq!(fs::read(&layout.ancestors).unwrap(), ancestors);
    assert_eq!(fs::read(&layout.merged).unwrap(), merged);
}

#[test]
fn test_complete_coverage_removes_stale_missing_listing() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let config = passing_config();

    let inputs = write_inputs(temp_dir.path(), TREE_JSON);
    run_offline(&inputs, &layout, &config, None).unwrap();
    assert!(layout.missing.exists());

    let without_unscraped = TREE_JSON.replace(
        ",\n    {\"id\": 9999, \"pId\": 2, \"name\": \"Never scraped\"}",
        "",
    );
    let inputs = write_inputs(temp_dir.path(), &without_unscraped);
    let report = run_offline(&inputs, &layout, &config, None).unwrap();

    assert!(report.coverage.unwrap().is_complete());
    assert!(!layout.missing.exists());
}

#[test]
fn test_verify_files_matches_offline_run() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);
    let config = passing_config();

    let report = run_offline(&inputs, &layout, &config, None).unwrap();
    let verification = verify_files(&layout.ancestors, &layout.merged, &config).unwrap();

    assert_eq!(Some(verification), report.verification);
}

#[test]
fn test_run_offline_records_completed_run() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);
    let mut db = Database::new(&temp_dir.path().join("runs.db")).unwrap();

    let report = run_offline(&inputs, &layout, &passing_config(), Some(&mut db)).unwrap();
    let run_id = report.run_id.unwrap();

    let run = db.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.kind, "full");
    assert_eq!(db.count_edges(&run_id).unwrap(), 14);
    assert_eq!(db.get_lineage_results(&run_id).unwrap().len(), 1);
}

#[test]
fn test_failed_lineage_marks_run_failed() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let inputs = write_inputs(temp_dir.path(), TREE_JSON);
    let mut db = Database::new(&temp_dir.path().join("runs.db")).unwrap();
    let config = PipelineConfig {
        lineages: vec![Lineage::from_tokens(&[
            "261QA1903X",
            "261Q00000X",
            "Hospitals",
            "Non-individual",
        ])],
        ..Default::default()
    };

    let report = run_offline(&inputs, &layout, &config, Some(&mut db)).unwrap();
    assert!(!report.passed());
    assert!(layout.report_text.exists());

    let run = db.get_run(&report.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(run.status, "failed");
}

#[test]
fn test_missing_input_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let layout = OutputLayout::in_dir(temp_dir.path().join("data"));
    let mut inputs = write_inputs(temp_dir.path(), TREE_JSON);
    inputs.scraped_csv = temp_dir.path().join("absent.csv");
    let mut db = Database::new(&temp_dir.path().join("runs.db")).unwrap();

    let err = run_offline(&inputs, &layout, &passing_config(), Some(&mut db)).unwrap_err();
    assert!(matches!(err, CoreError::FileNotFound(_)));

    let runs = db.list_runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "failed");
}
