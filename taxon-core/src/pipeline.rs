// File-level orchestration of the closure, reconcile and verify stages

use crate::closure::{
    ClosureOutcome, ClosureSet, ExclusionPolicy, IMMEDIATE_CHILD_COLUMN, IMMEDIATE_PARENT_COLUMN,
    build_closure, immediate_parents, immediate_parents_table, parse_node_id,
};
use crate::data::{Database, RunKind};
use crate::error::{CoreError, Result};
use crate::model::raw_nodes;
use crate::reconcile::{
    CoverageReport, JoinSpec, Presence, ReconciledTable, Reconciliation, check_coverage,
    reconcile,
};
use crate::report::{
    ClosureSummary, PipelineReport, ReconciliationSummary, comparison_summary,
    generate_json_report, generate_text_report, missing_ids_listing, save_report,
};
use crate::scrape::{NodeFetchOptions, execute_node_fetch, records_to_table};
use crate::sources::{citations_for_table, citations_to_table};
use crate::supplemental::SupplementalMapping;
use crate::table::Table;
use crate::verify::{Lineage, LineageIndex, VerificationReport, VerifySchema, verify_lineages};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use taxon_scanner::{FetchOutcome, TreeNode, parse_tree_source};
use tracing::{info, warn};

/// File names of every artifact under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub data_dir: PathBuf,
    pub ancestors: PathBuf,
    pub immediate_parents: PathBuf,
    pub nodes: PathBuf,
    pub merged: PathBuf,
    pub subsets_dir: PathBuf,
    pub summary: PathBuf,
    pub missing: PathBuf,
    pub sources: PathBuf,
    pub page_cache: PathBuf,
    pub report_text: PathBuf,
    pub report_json: PathBuf,
}

impl OutputLayout {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let data_dir = dir.into();
        let subsets_dir = data_dir.join("subsets_from_merge");
        Self {
            ancestors: data_dir.join("nucc_parent_code.csv"),
            immediate_parents: data_dir.join("immediate_parent_code.csv"),
            nodes: data_dir.join("nucc_codes.csv"),
            merged: data_dir.join("merged_nucc_data.csv"),
            summary: data_dir.join("nucc_comparison_summary.txt"),
            missing: data_dir.join("missing_codes.txt"),
            sources: data_dir.join("nucc_sources.csv"),
            page_cache: data_dir.join("tables"),
            report_text: data_dir.join("verification_report.txt"),
            report_json: data_dir.join("verification_report.json"),
            subsets_dir,
            data_dir,
        }
    }

    pub fn subset_path(&self, presence: Presence) -> PathBuf {
        let name = match presence {
            Presence::Both => "in_both_datasets.csv",
            Presence::LeftOnly => "only_in_downloaded.csv",
            Presence::RightOnly => "only_in_scrapped.csv",
        };
        self.subsets_dir.join(name)
    }
}

/// Library defaults for every stage, NUCC flavoured.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub policy: ExclusionPolicy,
    pub join: JoinSpec,
    pub schema: VerifySchema,
    pub supplemental: SupplementalMapping,
    pub lineages: Vec<Lineage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: ExclusionPolicy::nucc(),
            join: JoinSpec::nucc(),
            schema: VerifySchema::nucc(),
            supplemental: SupplementalMapping::nucc(),
            lineages: Lineage::nucc_defaults(),
        }
    }
}

pub fn read_tree_file(path: &Path) -> Result<Vec<TreeNode>> {
    if !path.exists() {
        return Err(CoreError::FileNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    Ok(parse_tree_source(&text)?)
}

/// Build the closure and write both edge artifacts.
pub fn write_closure(
    tree: &[TreeNode],
    policy: &ExclusionPolicy,
    layout: &OutputLayout,
) -> Result<ClosureOutcome> {
    let nodes = raw_nodes(tree);
    let outcome = build_closure(&nodes, policy)?;
    outcome.closure.to_table().write_csv(&layout.ancestors)?;

    let parents = immediate_parents(&nodes)?;
    immediate_parents_table(&parents).write_csv(&layout.immediate_parents)?;

    info!(
        "Wrote {} ancestor edges to {}",
        outcome.closure.len(),
        layout.ancestors.display()
    );
    Ok(outcome)
}

pub fn load_closure(path: &Path) -> Result<ClosureSet> {
    ClosureSet::from_table(&Table::read_csv(path)?)
}

pub fn load_immediate_parents(path: &Path) -> Result<BTreeMap<i64, i64>> {
    let table = Table::read_csv(path)?;
    let child_col = table.require_column(IMMEDIATE_CHILD_COLUMN, "immediate parents")?;
    let parent_col = table.require_column(IMMEDIATE_PARENT_COLUMN, "immediate parents")?;

    let mut parents = BTreeMap::new();
    for row in 0..table.len() {
        let child = parse_node_id(table.cell(row, child_col), IMMEDIATE_CHILD_COLUMN)?;
        let parent = parse_node_id(table.cell(row, parent_col), IMMEDIATE_PARENT_COLUMN)?;
        parents.insert(child, parent);
    }
    Ok(parents)
}

/// Download every node page in the closure universe and write the node table.
pub async fn scrape_nodes(layout: &OutputLayout, options: &NodeFetchOptions) -> Result<FetchOutcome> {
    let closure = load_closure(&layout.ancestors)?;
    let parents = load_immediate_parents(&layout.immediate_parents)?;
    let node_ids: Vec<String> = closure
        .node_universe()
        .iter()
        .map(i64::to_string)
        .collect();
    info!("Fetching {} node pages", node_ids.len());

    let outcome = execute_node_fetch(options, &node_ids).await?;
    if !outcome.failed.is_empty() {
        warn!("{} node pages could not be fetched", outcome.failed.len());
    }

    records_to_table(&outcome.records, &parents).write_csv(&layout.nodes)?;
    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct ReconcileOutput {
    pub reconciliation: Reconciliation,
    pub coverage: Option<CoverageReport>,
}

/// Join the two tables and write the merged table, subsets, summary and
/// (given a closure) the missing-id listing.
pub fn reconcile_files(
    download_csv: &Path,
    scraped_csv: &Path,
    ancestors: Option<&Path>,
    layout: &OutputLayout,
    spec: &JoinSpec,
) -> Result<ReconcileOutput> {
    let left = Table::read_csv(download_csv)?;
    let right = Table::read_csv(scraped_csv)?;
    info!(
        "Loaded {} {} rows and {} {} rows",
        left.len(),
        spec.left_name,
        right.len(),
        spec.right_name
    );

    let reconciliation = reconcile(&left, &right, spec)?;
    let reconciled = &reconciliation.reconciled;
    reconciled.table().write_csv(&layout.merged)?;

    for presence in [Presence::Both, Presence::LeftOnly, Presence::RightOnly] {
        reconciled
            .subset(presence)
            .write_csv(&layout.subset_path(presence))?;
    }

    let summary = comparison_summary(
        &download_csv.display().to_string(),
        &scraped_csv.display().to_string(),
        reconciled,
    );
    save_report(&summary, &layout.summary)?;

    let coverage = match ancestors {
        Some(path) if path.exists() => {
            let closure = load_closure(path)?;
            let coverage = check_coverage(&closure.node_universe(), reconciled);
            if !coverage.missing.is_empty() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                save_report(&missing_ids_listing(&name, &coverage.missing), &layout.missing)?;
            } else if layout.missing.exists() {
                fs::remove_file(&layout.missing)?;
            }
            Some(coverage)
        }
        Some(path) => {
            warn!("{} not found, skipping coverage check", path.display());
            None
        }
        None => None,
    };

    Ok(ReconcileOutput {
        reconciliation,
        coverage,
    })
}

/// Verify lineages against stored closure and reconciled tables.
pub fn verify_files(
    ancestors: &Path,
    merged: &Path,
    config: &PipelineConfig,
) -> Result<VerificationReport> {
    let closure = load_closure(ancestors)?;
    let reconciled = Table::read_csv(merged)?;
    let index = LineageIndex::build(&reconciled, &config.schema, &config.supplemental)?;
    Ok(verify_lineages(&config.lineages, &index, &closure))
}

/// Extract citations from the node table into the sources table.
pub fn write_sources(nodes_csv: &Path, output: &Path) -> Result<usize> {
    let nodes = Table::read_csv(nodes_csv)?;
    let citations = citations_for_table(&nodes)?;
    citations_to_table(&citations).write_csv(output)?;
    Ok(citations.len())
}

/// Inputs to a full offline run.
#[derive(Debug, Clone)]
pub struct OfflineInputs {
    pub tree_file: PathBuf,
    pub download_csv: PathBuf,
    pub scraped_csv: PathBuf,
}

/// Closure, reconciliation, coverage and verification from local files,
/// writing every artifact and both reports. Records the run in `db` if given.
pub fn run_offline(
    inputs: &OfflineInputs,
    layout: &OutputLayout,
    config: &PipelineConfig,
    mut db: Option<&mut Database>,
) -> Result<PipelineReport> {
    let run_id = match db.as_deref() {
        Some(db) => {
            let inputs_json = serde_json::json!({
                "tree_file": inputs.tree_file.display().to_string(),
                "download_csv": inputs.download_csv.display().to_string(),
                "scraped_csv": inputs.scraped_csv.display().to_string(),
                "data_dir": layout.data_dir.display().to_string(),
            });
            Some(db.create_run(RunKind::Full, &inputs_json.to_string())?)
        }
        None => None,
    };

    let result = run_stages(inputs, layout, config, db.as_deref_mut(), run_id.as_deref());

    if let (Some(db), Some(run_id)) = (db.as_deref(), run_id.as_deref()) {
        match &result {
            Ok(report) if report.passed() => db.complete_run(run_id)?,
            _ => db.fail_run(run_id)?,
        }
    }

    let mut report = result?;
    report.run_id = run_id;
    Ok(report)
}

fn run_stages(
    inputs: &OfflineInputs,
    layout: &OutputLayout,
    config: &PipelineConfig,
    mut db: Option<&mut Database>,
    run_id: Option<&str>,
) -> Result<PipelineReport> {
    fs::create_dir_all(&layout.data_dir)?;

    let tree = read_tree_file(&inputs.tree_file)?;
    let outcome = write_closure(&tree, &config.policy, layout)?;

    let output = reconcile_files(
        &inputs.download_csv,
        &inputs.scraped_csv,
        Some(&layout.ancestors),
        layout,
        &config.join,
    )?;

    let index = LineageIndex::build(
        output.reconciliation.reconciled.table(),
        &config.schema,
        &config.supplemental,
    )?;
    let verification = verify_lineages(&config.lineages, &index, &outcome.closure);

    if let (Some(db), Some(run_id)) = (db.as_deref_mut(), run_id) {
        db.insert_edges(run_id, &outcome.closure)?;
        db.insert_reconciled(run_id, &output.reconciliation.reconciled)?;
        db.insert_lineage_results(run_id, &verification.results)?;
    }

    let report = PipelineReport {
        run_id: run_id.map(str::to_string),
        closure: Some(ClosureSummary::from(&outcome)),
        reconciliation: Some(ReconciliationSummary::new(
            &output.reconciliation,
            &inputs.download_csv.display().to_string(),
            &inputs.scraped_csv.display().to_string(),
        )),
        coverage: output.coverage,
        verification: Some(verification),
    };

    save_report(&generate_text_report(&report), &layout.report_text)?;
    save_report(&generate_json_report(&report)?, &layout.report_json)?;

    Ok(report)
}

/// Reload a reconciled table written by [`reconcile_files`].
pub fn load_reconciled(path: &Path, spec: &JoinSpec) -> Result<ReconciledTable> {
    ReconciledTable::from_table(Table::read_csv(path)?, spec)
}
