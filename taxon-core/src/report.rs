// Report generation for closure, reconciliation and verification results

use crate::closure::{ClosureOutcome, Truncation, TruncationKind};
use crate::reconcile::{
    COMBINED_CODE, CoverageReport, JoinConflicts, Presence, PresenceCounts, Reconciliation,
    ReconciledTable,
};
use crate::verify::{LineageResult, StrategyResult, VerificationReport};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

/// Anomalies listed in full up to this many, then summarized.
const LISTING_LIMIT: usize = 20;

/// Sample codes per one-sided category in the comparison summary.
const SUMMARY_SAMPLE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosureSummary {
    pub edges: usize,
    pub nodes: usize,
    pub input_records: usize,
    pub duplicate_ids: Vec<i64>,
    pub skipped_excluded: Vec<i64>,
    pub truncations: Vec<Truncation>,
}

impl From<&ClosureOutcome> for ClosureSummary {
    fn from(outcome: &ClosureOutcome) -> Self {
        Self {
            edges: outcome.closure.len(),
            nodes: outcome.closure.node_universe().len(),
            input_records: outcome.diagnostics.input_records,
            duplicate_ids: outcome.diagnostics.duplicate_ids.clone(),
            skipped_excluded: outcome.diagnostics.skipped_excluded.clone(),
            truncations: outcome.diagnostics.truncations.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub left_source: String,
    pub right_source: String,
    pub counts: PresenceCounts,
    pub conflicts: JoinConflicts,
}

impl ReconciliationSummary {
    pub fn new(reconciliation: &Reconciliation, left_source: &str, right_source: &str) -> Self {
        Self {
            left_source: left_source.to_string(),
            right_source: right_source.to_string(),
            counts: reconciliation.counts,
            conflicts: reconciliation.conflicts.clone(),
        }
    }
}

/// Everything a run produced; sections a command did not compute stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure: Option<ClosureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl PipelineReport {
    /// True unless a lineage failed either strategy.
    pub fn passed(&self) -> bool {
        self.verification
            .as_ref()
            .is_none_or(VerificationReport::all_passed)
    }
}

fn section(report: &mut String, title: &str) {
    report.push_str(RULE);
    report.push_str(title);
    report.push('\n');
    report.push_str(RULE);
    report.push('\n');
}

fn push_listing(report: &mut String, items: &[String]) {
    for item in items.iter().take(LISTING_LIMIT) {
        report.push_str(&format!("  - {}\n", item));
    }
    if items.len() > LISTING_LIMIT {
        report.push_str(&format!("  ... and {} more\n", items.len() - LISTING_LIMIT));
    }
}

fn truncation_kind_name(kind: TruncationKind) -> &'static str {
    match kind {
        TruncationKind::Excluded => "Excluded parent",
        TruncationKind::Dangling => "Dangling parent",
        TruncationKind::Cycle => "Cycle",
    }
}

fn push_closure(report: &mut String, closure: &ClosureSummary) {
    section(report, "CLOSURE");
    report.push_str(&format!("Input records:     {}\n", closure.input_records));
    report.push_str(&format!("Nodes:             {}\n", closure.nodes));
    report.push_str(&format!("Ancestor edges:    {}\n", closure.edges));
    report.push_str(&format!("Excluded nodes:    {}\n", closure.skipped_excluded.len()));
    report.push_str(&format!("Duplicate ids:     {}\n", closure.duplicate_ids.len()));

    for kind in [
        TruncationKind::Excluded,
        TruncationKind::Dangling,
        TruncationKind::Cycle,
    ] {
        let items: Vec<String> = closure
            .truncations
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| format!("node {} stops at {}", t.node_id, t.at_parent))
            .collect();
        report.push_str(&format!(
            "{:<19}{}\n",
            format!("{}:", truncation_kind_name(kind)),
            items.len()
        ));
        if kind != TruncationKind::Excluded {
            push_listing(report, &items);
        }
    }
    report.push('\n');
}

fn push_reconciliation(report: &mut String, summary: &ReconciliationSummary) {
    section(report, "RECONCILIATION");
    report.push_str(&format!("Left source:       {}\n", summary.left_source));
    report.push_str(&format!("Right source:      {}\n", summary.right_source));
    report.push_str(&format!("Total rows:        {}\n", summary.counts.total()));
    report.push_str(&format!("  [BOTH]           {}\n", summary.counts.both));
    report.push_str(&format!("  [LEFT ONLY]      {}\n", summary.counts.left_only));
    report.push_str(&format!("  [RIGHT ONLY]     {}\n", summary.counts.right_only));
    report.push('\n');

    let conflicts = &summary.conflicts;
    if conflicts.is_clean() && conflicts.id_fallback_rows == 0 {
        report.push_str("No join conflicts.\n\n");
        return;
    }

    report.push_str("Join conflicts:\n");
    for (side, keys) in [
        ("left", &conflicts.left_duplicate_keys),
        ("right", &conflicts.right_duplicate_keys),
    ] {
        if keys.is_empty() {
            continue;
        }
        report.push_str(&format!("  Duplicate {} keys: {}\n", side, keys.len()));
        let items: Vec<String> = keys
            .iter()
            .map(|(key, count)| format!("{} (x{})", key, count))
            .collect();
        push_listing(report, &items);
    }
    report.push_str(&format!("  Null left keys:    {}\n", conflicts.left_null_keys));
    report.push_str(&format!("  Null right keys:   {}\n", conflicts.right_null_keys));
    report.push_str(&format!("  Fan-out rows:      {}\n", conflicts.fanout_rows));
    report.push_str(&format!("  Node id fallbacks: {}\n", conflicts.id_fallback_rows));
    report.push_str(&format!("  Unidentified rows: {}\n", conflicts.unidentified_rows));
    report.push('\n');
}

fn push_coverage(report: &mut String, coverage: &CoverageReport) {
    section(report, "COVERAGE");
    report.push_str(&format!("Closure nodes:     {}\n", coverage.expected));
    report.push_str(&format!("Identifiers found: {}\n", coverage.present));
    if coverage.missing.is_empty() {
        report.push_str("✓ All closure nodes are present in the reconciled table\n");
    } else {
        report.push_str(&format!(
            "⚠ {} closure nodes missing from the reconciled table:\n",
            coverage.missing.len()
        ));
        push_listing(report, &coverage.missing);
    }
    if !coverage.extra.is_empty() {
        report.push_str(&format!(
            "{} identifiers in the reconciled table are not closure nodes\n",
            coverage.extra.len()
        ));
    }
    report.push('\n');
}

fn push_strategy(report: &mut String, name: &str, result: &StrategyResult) {
    let mark = if result.passed { "✓" } else { "✗" };
    let chain: Vec<String> = result.chain.iter().map(i64::to_string).collect();
    report.push_str(&format!(
        "  {} {:<12} chain: {}\n",
        mark,
        name,
        if chain.is_empty() {
            "-".to_string()
        } else {
            chain.join(" → ")
        }
    ));
    for mismatch in &result.mismatches {
        report.push_str(&format!("      depth {}: {}\n", mismatch.depth, mismatch.message));
    }
}

fn push_lineage(report: &mut String, idx: usize, result: &LineageResult) {
    report.push_str(&format!("[{}] {}\n", idx + 1, result.lineage.name));
    report.push_str(&format!("Expected:     {}\n", result.lineage));
    report.push_str(&format!("Verdict:      {}\n", result.agreement.description()));
    push_strategy(report, "closure", &result.closure);
    push_strategy(report, "pointer", &result.pointer);
    report.push('\n');
    report.push_str(THIN_RULE);
    report.push('\n');
}

pub fn generate_text_report(data: &PipelineReport) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                      TAXONOMY RECONCILIATION REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    if let Some(run_id) = &data.run_id {
        report.push_str(&format!("Run ID:       {}\n", run_id));
    }
    report.push_str(&format!(
        "Generated:    {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!(
        "Status:       {}\n\n",
        if data.passed() { "Passed" } else { "Failed" }
    ));

    if let Some(closure) = &data.closure {
        push_closure(&mut report, closure);
    }
    if let Some(reconciliation) = &data.reconciliation {
        push_reconciliation(&mut report, reconciliation);
    }
    if let Some(coverage) = &data.coverage {
        push_coverage(&mut report, coverage);
    }

    if let Some(verification) = &data.verification {
        section(&mut report, "LINEAGE VERIFICATION");
        report.push_str(&format!(
            "Lineages: {}  Passed: {}  Failed: {}\n\n",
            verification.results.len(),
            verification.passed_count(),
            verification.failed_count()
        ));
        for (idx, result) in verification.results.iter().enumerate() {
            push_lineage(&mut report, idx, result);
        }
        if verification.all_passed() {
            report.push_str("All verification tests passed.\n\n");
        } else {
            report.push_str("Some verification tests failed.\n\n");
        }
    }

    report.push_str(RULE);
    report.push_str("                               End of Report\n");
    report.push_str(RULE);
    report.push_str("\nGenerated by taxon\n\n");

    report
}

pub fn generate_json_report(data: &PipelineReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "taxon",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "status": if data.passed() { "passed" } else { "failed" },
            "run_id": data.run_id,
            "closure": data.closure,
            "reconciliation": data.reconciliation,
            "coverage": data.coverage,
            "verification": data.verification.as_ref().map(|v| serde_json::json!({
                "total": v.results.len(),
                "passed": v.passed_count(),
                "failed": v.failed_count(),
                "disagreements": v.disagreements().count(),
                "results": v.results,
            })),
        }
    });

    serde_json::to_string_pretty(&json_report)
}

/// Plain-text summary of a reconciliation with sample one-sided codes.
pub fn comparison_summary(
    left_source: &str,
    right_source: &str,
    reconciled: &ReconciledTable,
) -> String {
    let spec = reconciled.spec();
    let counts = reconciled.counts();
    let mut summary = String::new();

    summary.push_str("NUCC Data Comparison Summary\n");
    summary.push_str(&"=".repeat(40));
    summary.push_str("\n\n");
    summary.push_str(&format!("Downloaded dataset: {}\n", left_source));
    summary.push_str(&format!("Scraped dataset: {}\n\n", right_source));
    summary.push_str(&format!("Total records in merged dataset: {}\n", counts.total()));
    summary.push_str(&format!("Records in both datasets: {}\n", counts.both));
    summary.push_str(&format!(
        "Records only in downloaded dataset: {}\n",
        counts.left_only
    ));
    summary.push_str(&format!(
        "Records only in scraped dataset: {}\n\n",
        counts.right_only
    ));

    let samples = |presence: Presence, column: &str| -> Vec<String> {
        let subset = reconciled.subset(presence);
        subset
            .column_values(column)
            .into_iter()
            .flatten()
            .take(SUMMARY_SAMPLE)
            .map(str::to_string)
            .collect()
    };

    if counts.left_only > 0 {
        summary.push_str("Sample codes only in downloaded dataset:\n");
        for code in samples(Presence::LeftOnly, &spec.left_key) {
            summary.push_str(&format!("  - {}\n", code));
        }
        summary.push('\n');
    }

    if counts.right_only > 0 {
        let id_column = spec.reconciled_id_column();
        let column = if reconciled.table().has_column(&id_column) {
            id_column
        } else {
            COMBINED_CODE.to_string()
        };
        summary.push_str("Sample codes only in scraped dataset:\n");
        for code in samples(Presence::RightOnly, &column) {
            summary.push_str(&format!("  - {}\n", code));
        }
        summary.push('\n');
    }

    summary
}

/// Complete list of closure ids missing from the reconciled table.
pub fn missing_ids_listing(closure_source: &str, missing: &[String]) -> String {
    let mut listing = format!("Codes from {} missing from merged data:\n", closure_source);
    listing.push_str(&"=".repeat(50));
    listing.push_str("\n\n");
    for id in missing {
        listing.push_str(id);
        listing.push('\n');
    }
    listing
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
