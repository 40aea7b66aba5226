// Lineage verification by two independent walks: over the closure relation
// and over the reconciled table's immediate parent pointers.

use crate::closure::ClosureSet;
use crate::error::Result;
use crate::reconcile::{
    COMBINED_CODE, COMBINED_CODE_KIND, CodeKind, IMMEDIATE_PARENT_ID, normalize_identifier,
    normalize_key,
};
use crate::supplemental::SupplementalMapping;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// One position of a lineage: either a public code or a descriptive label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Code(String),
    Label(String),
}

impl Identifier {
    /// Ten characters of digits and uppercase letters, at least one digit,
    /// is a code. Anything else is a label.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        let is_code = token.len() == 10
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
            && token.chars().any(|c| c.is_ascii_digit());

        if is_code {
            Identifier::Code(token.to_string())
        } else {
            Identifier::Label(token.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Code(s) | Identifier::Label(s) => s,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Identifier::Code(_))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Code(code) => write!(f, "code '{}'", code),
            Identifier::Label(label) => write!(f, "label '{}'", label),
        }
    }
}

/// Expected chain from a leaf up towards the root, leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub name: String,
    pub entries: Vec<Identifier>,
}

#[derive(Debug, Deserialize)]
struct LineageFile {
    #[serde(default)]
    name: Option<String>,
    chain: Vec<String>,
}

impl Lineage {
    pub fn new(name: impl Into<String>, entries: Vec<Identifier>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// Build from raw tokens, named after the leaf.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let entries: Vec<Identifier> = tokens.iter().map(|t| Identifier::parse(t.as_ref())).collect();
        let name = entries
            .first()
            .map(|e| e.as_str().to_string())
            .unwrap_or_default();
        Self { name, entries }
    }

    pub fn leaf(&self) -> Option<&Identifier> {
        self.entries.first()
    }

    pub fn nucc_defaults() -> Vec<Lineage> {
        [
            &[
                "261QA1903X",
                "261Q00000X",
                "Ambulatory Health Care Facilities",
                "Non-individual",
            ][..],
            &["273100000X", "Hospital Units", "Non-individual"][..],
            &["281PC2000X", "281P00000X", "Hospitals", "Non-individual"][..],
            &[
                "207NP0225X",
                "207N00000X",
                "Allopathic & Osteopathic Physicians",
                "Individual or Groups (of Individuals)",
            ][..],
            &[
                "101YM0800X",
                "101Y00000X",
                "Behavioral Health & Social Service Providers",
                "Individual or Groups (of Individuals)",
            ][..],
        ]
        .iter()
        .map(|tokens| Lineage::from_tokens(tokens))
        .collect()
    }

    /// Parse `[{"name": "...", "chain": ["...", ...]}]`.
    pub fn from_json(text: &str) -> Result<Vec<Lineage>> {
        let files: Vec<LineageFile> = serde_json::from_str(text)?;
        Ok(files
            .into_iter()
            .map(|file| {
                let mut lineage = Lineage::from_tokens(&file.chain);
                if let Some(name) = file.name {
                    lineage.name = name;
                }
                lineage
            })
            .collect())
    }

    pub fn from_json_file(path: &Path) -> Result<Vec<Lineage>> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<&str> = self.entries.iter().map(Identifier::as_str).collect();
        f.write_str(&chain.join(" → "))
    }
}

/// Reconciled columns the verifier reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySchema {
    pub node_id_column: String,
    pub code_column: String,
    pub code_kind_column: String,
    /// Raw key columns that also hold public codes.
    pub key_columns: Vec<String>,
    pub parent_column: String,
    pub label_columns: Vec<String>,
    pub section_column: String,
}

impl VerifySchema {
    pub fn nucc() -> Self {
        Self {
            node_id_column: "scraped_code_id".to_string(),
            code_column: COMBINED_CODE.to_string(),
            code_kind_column: COMBINED_CODE_KIND.to_string(),
            key_columns: vec!["Code".to_string(), "code_text".to_string()],
            parent_column: IMMEDIATE_PARENT_ID.to_string(),
            label_columns: [
                "download_Grouping",
                "download_Classification",
                "download_Specialization",
                "download_Display Name",
                "scraped_code_long_name",
                "scraped_code_short_name",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            section_column: "download_Section".to_string(),
        }
    }
}

impl Default for VerifySchema {
    fn default() -> Self {
        Self::nucc()
    }
}

/// Everything known about one node: reconciled row values unioned with its
/// supplemental entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeView {
    pub node_id: i64,
    pub codes: BTreeSet<String>,
    pub labels: BTreeSet<String>,
    pub sections: BTreeSet<String>,
}

impl NodeView {
    fn new(node_id: i64) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    /// A label matches any label column or the section, never one column in particular.
    pub fn matches(&self, identifier: &Identifier) -> bool {
        match identifier {
            Identifier::Code(code) => self.codes.contains(code),
            Identifier::Label(label) => self.labels.contains(label) || self.sections.contains(label),
        }
    }

    pub fn describe(&self) -> String {
        let codes = if self.codes.is_empty() {
            "-".to_string()
        } else {
            self.codes.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let labels: Vec<&str> = self
            .labels
            .iter()
            .chain(self.sections.iter())
            .map(String::as_str)
            .collect();
        format!(
            "node {} (code: {}; labels: {})",
            self.node_id,
            codes,
            if labels.is_empty() {
                "-".to_string()
            } else {
                labels.join(", ")
            }
        )
    }
}

/// Node views, a code index and the table's parent pointers.
#[derive(Debug, Clone, Default)]
pub struct LineageIndex {
    views: BTreeMap<i64, NodeView>,
    code_index: HashMap<String, i64>,
    parents: BTreeMap<i64, i64>,
}

impl LineageIndex {
    pub fn build(
        reconciled: &Table,
        schema: &VerifySchema,
        supplemental: &SupplementalMapping,
    ) -> Result<Self> {
        let id_col = reconciled.require_column(&schema.node_id_column, "reconciled")?;
        let code_col = reconciled.column_index(&schema.code_column);
        let kind_col = reconciled.column_index(&schema.code_kind_column);
        let parent_col = reconciled.column_index(&schema.parent_column);
        if parent_col.is_none() {
            warn!(
                "Reconciled table has no '{}' column; pointer walks will stop at the leaf",
                schema.parent_column
            );
        }
        let key_cols: Vec<usize> = schema
            .key_columns
            .iter()
            .filter_map(|c| reconciled.column_index(c))
            .collect();
        let label_cols: Vec<usize> = schema
            .label_columns
            .iter()
            .filter_map(|c| {
                let index = reconciled.column_index(c);
                if index.is_none() {
                    debug!("Label column '{}' not present", c);
                }
                index
            })
            .collect();
        let section_col = reconciled.column_index(&schema.section_column);

        let mut index = LineageIndex::default();

        for row in 0..reconciled.len() {
            let Some(node_id) = normalize_identifier(reconciled.cell(row, id_col))
                .and_then(|id| id.parse::<i64>().ok())
            else {
                continue;
            };
            let view = index
                .views
                .entry(node_id)
                .or_insert_with(|| NodeView::new(node_id));

            let combined_is_id = kind_col
                .and_then(|c| reconciled.cell(row, c))
                .is_some_and(|kind| kind == CodeKind::NodeId.as_str());
            let mut codes: Vec<String> = key_cols
                .iter()
                .filter_map(|&c| normalize_key(reconciled.cell(row, c)))
                .collect();
            if !combined_is_id
                && let Some(code) = code_col.and_then(|c| normalize_key(reconciled.cell(row, c)))
            {
                codes.push(code);
            }
            for code in codes {
                index.code_index.entry(code.clone()).or_insert(node_id);
                view.codes.insert(code);
            }

            for &c in &label_cols {
                if let Some(label) = normalize_key(reconciled.cell(row, c)) {
                    view.labels.insert(label);
                }
            }
            if let Some(section) = section_col.and_then(|c| normalize_key(reconciled.cell(row, c))) {
                view.sections.insert(section);
            }

            if let Some(parent) = parent_col
                .and_then(|c| normalize_identifier(reconciled.cell(row, c)))
                .and_then(|p| p.parse::<i64>().ok())
            {
                index.parents.entry(node_id).or_insert(parent);
            }
        }

        for entry in supplemental.entries() {
            let view = index
                .views
                .entry(entry.node_id)
                .or_insert_with(|| NodeView::new(entry.node_id));
            if let Some(code) = &entry.code {
                view.codes.insert(code.clone());
                index.code_index.entry(code.clone()).or_insert(entry.node_id);
            }
            view.labels.insert(entry.label.clone());
            view.sections.insert(entry.section.clone());
        }

        debug!(
            "Lineage index: {} nodes, {} codes, {} parent pointers",
            index.views.len(),
            index.code_index.len(),
            index.parents.len()
        );
        Ok(index)
    }

    pub fn view(&self, node_id: i64) -> Option<&NodeView> {
        self.views.get(&node_id)
    }

    pub fn parent_of(&self, node_id: i64) -> Option<i64> {
        self.parents.get(&node_id).copied()
    }

    fn describe(&self, node_id: i64) -> String {
        self.view(node_id)
            .map(NodeView::describe)
            .unwrap_or_else(|| format!("node {} (no attributes)", node_id))
    }

    fn matches(&self, node_id: i64, identifier: &Identifier) -> bool {
        self.view(node_id).is_some_and(|v| v.matches(identifier))
    }

    /// Resolve an identifier over the whole table. Labels must be unique.
    pub fn resolve(&self, identifier: &Identifier) -> std::result::Result<i64, String> {
        match identifier {
            Identifier::Code(code) => self
                .code_index
                .get(code)
                .copied()
                .ok_or_else(|| format!("{} not found in reconciled table", identifier)),
            Identifier::Label(_) => {
                let candidates: Vec<i64> = self
                    .views
                    .values()
                    .filter(|v| v.matches(identifier))
                    .map(|v| v.node_id)
                    .collect();
                match candidates.as_slice() {
                    [node_id] => Ok(*node_id),
                    [] => Err(format!("no node carries {}", identifier)),
                    many => Err(format!(
                        "{} is ambiguous: carried by nodes {}",
                        identifier,
                        join_ids(many)
                    )),
                }
            }
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub depth: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub passed: bool,
    /// Node ids resolved so far, leaf first.
    pub chain: Vec<i64>,
    pub mismatches: Vec<Mismatch>,
}

impl StrategyResult {
    fn fail(&mut self, depth: usize, message: String) {
        debug!("Mismatch at depth {}: {}", depth, message);
        self.mismatches.push(Mismatch { depth, message });
    }

    fn finish(mut self) -> Self {
        self.passed = self.mismatches.is_empty();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    BothPass,
    BothFail,
    ClosureOnly,
    PointerOnly,
}

impl Agreement {
    pub fn from_results(closure_passed: bool, pointer_passed: bool) -> Self {
        match (closure_passed, pointer_passed) {
            (true, true) => Agreement::BothPass,
            (false, false) => Agreement::BothFail,
            (true, false) => Agreement::ClosureOnly,
            (false, true) => Agreement::PointerOnly,
        }
    }

    pub fn is_disagreement(&self) -> bool {
        matches!(self, Agreement::ClosureOnly | Agreement::PointerOnly)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Agreement::BothPass => "both strategies pass",
            Agreement::BothFail => "both strategies fail",
            Agreement::ClosureOnly => {
                "closure passes, pointer walk fails: parent pointer defect suspected"
            }
            Agreement::PointerOnly => {
                "pointer walk passes, closure fails: closure construction defect suspected"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageResult {
    pub lineage: Lineage,
    pub closure: StrategyResult,
    pub pointer: StrategyResult,
    pub agreement: Agreement,
}

impl LineageResult {
    pub fn passed(&self) -> bool {
        self.agreement == Agreement::BothPass
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub results: Vec<LineageResult>,
}

impl VerificationReport {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(LineageResult::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn disagreements(&self) -> impl Iterator<Item = &LineageResult> {
        self.results.iter().filter(|r| r.agreement.is_disagreement())
    }
}

/// Ancestor with the most ancestors of its own, lowest id on ties.
fn deepest(closure: &ClosureSet, ids: impl Iterator<Item = i64>) -> Option<i64> {
    ids.max_by_key(|&id| (closure.depth_of(id), std::cmp::Reverse(id)))
}

/// Walk a lineage through the closure: codes must be closure ancestors of the
/// previous node, labels resolve to the deepest matching strict ancestor.
pub fn verify_with_closure(
    lineage: &Lineage,
    index: &LineageIndex,
    closure: &ClosureSet,
) -> StrategyResult {
    let mut result = StrategyResult::default();
    let Some(leaf) = lineage.leaf() else {
        result.fail(0, "lineage is empty".to_string());
        return result.finish();
    };

    let mut child = match index.resolve(leaf) {
        Ok(node_id) => node_id,
        Err(message) => {
            result.fail(0, message);
            return result.finish();
        }
    };
    result.chain.push(child);

    for (depth, entry) in lineage.entries.iter().enumerate().skip(1) {
        match entry {
            Identifier::Code(_) => {
                let parent = match index.resolve(entry) {
                    Ok(parent) => parent,
                    Err(message) => {
                        result.fail(depth, message);
                        break;
                    }
                };
                if !closure.contains(parent, child) || parent == child {
                    result.fail(
                        depth,
                        format!(
                            "expected {} (node {}) to be an ancestor of {}",
                            entry,
                            parent,
                            index.describe(child)
                        ),
                    );
                }
                result.chain.push(parent);
                child = parent;
            }
            Identifier::Label(_) => {
                let ancestors = closure.strict_ancestors(child);
                let found = deepest(
                    closure,
                    ancestors.iter().copied().filter(|&id| index.matches(id, entry)),
                );
                match found {
                    Some(parent) => {
                        result.chain.push(parent);
                        child = parent;
                    }
                    None => {
                        let nearest = deepest(closure, ancestors.iter().copied())
                            .map(|id| index.describe(id))
                            .unwrap_or_else(|| "none (node is top-level)".to_string());
                        result.fail(
                            depth,
                            format!(
                                "expected {} among ancestors of {}; nearest ancestor is {}",
                                entry,
                                index.describe(child),
                                nearest
                            ),
                        );
                        break;
                    }
                }
            }
        }
    }

    result.finish()
}

/// Walk a lineage through immediate parent pointers only and compare each position.
pub fn verify_with_pointers(lineage: &Lineage, index: &LineageIndex) -> StrategyResult {
    let mut result = StrategyResult::default();
    let Some(leaf) = lineage.leaf() else {
        result.fail(0, "lineage is empty".to_string());
        return result.finish();
    };

    let mut current = match index.resolve(leaf) {
        Ok(node_id) => node_id,
        Err(message) => {
            result.fail(0, message);
            return result.finish();
        }
    };
    result.chain.push(current);

    for (depth, entry) in lineage.entries.iter().enumerate().skip(1) {
        let Some(parent) = index.parent_of(current) else {
            result.fail(
                depth,
                format!(
                    "chain ended at depth {} on {}; expected {}",
                    depth - 1,
                    index.describe(current),
                    entry
                ),
            );
            break;
        };
        result.chain.push(parent);
        if !index.matches(parent, entry) {
            result.fail(
                depth,
                format!("expected {}, found {}", entry, index.describe(parent)),
            );
        }
        current = parent;
    }

    result.finish()
}

/// Verify every lineage with both strategies; one failure never stops the rest.
pub fn verify_lineages(
    lineages: &[Lineage],
    index: &LineageIndex,
    closure: &ClosureSet,
) -> VerificationReport {
    let results: Vec<LineageResult> = lineages
        .iter()
        .map(|lineage| {
            let closure_result = verify_with_closure(lineage, index, closure);
            let pointer_result = verify_with_pointers(lineage, index);
            let agreement = Agreement::from_results(closure_result.passed, pointer_result.passed);

            if agreement.is_disagreement() {
                warn!("Lineage {}: {}", lineage.name, agreement.description());
            } else {
                debug!("Lineage {}: {}", lineage.name, agreement.description());
            }

            LineageResult {
                lineage: lineage.clone(),
                closure: closure_result,
                pointer: pointer_result,
                agreement,
            }
        })
        .collect();

    let report = VerificationReport { results };
    info!(
        "Verified {} lineages: {} passed, {} failed",
        report.results.len(),
        report.passed_count(),
        report.failed_count()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_parse() {
        assert_eq!(
            Identifier::parse("261QA1903X"),
            Identifier::Code("261QA1903X".to_string())
        );
        assert_eq!(
            Identifier::parse("Hospitals"),
            Identifier::Label("Hospitals".to_string())
        );
        // ten uppercase letters, no digit
        assert!(!Identifier::parse("ABCDEFGHIJ").is_code());
        assert!(!Identifier::parse("261qa1903x").is_code());
        assert!(!Identifier::parse("261QA1903").is_code());
    }

    #[test]
    fn test_agreement_from_results() {
        assert_eq!(Agreement::from_results(true, false), Agreement::ClosureOnly);
        assert_eq!(Agreement::from_results(false, true), Agreement::PointerOnly);
        assert!(!Agreement::BothFail.is_disagreement());
    }

    #[test]
    fn test_nucc_defaults_parse() {
        let lineages = Lineage::nucc_defaults();
        assert_eq!(lineages.len(), 5);
        assert_eq!(lineages[1].name, "273100000X");
        assert!(lineages[0].entries[1].is_code());
        assert!(!lineages[0].entries[2].is_code());
    }
}
