// Outer join of the published code table with the scraped node table

use crate::error::{CoreError, Result};
use crate::table::{Cell, Table};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const COMBINED_CODE: &str = "combined_code";
pub const COMBINED_CODE_KIND: &str = "combined_code_kind";
pub const PRESENCE: &str = "presence";
pub const IMMEDIATE_PARENT_ID: &str = "immediate_parent_id";

/// Literals that upstream exports use for a missing value.
const NULL_LITERALS: [&str; 5] = ["nan", "NaN", "<NA>", "None", "null"];

/// Column names and prefixes for one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_name: String,
    pub right_name: String,
    pub left_key: String,
    pub right_key: String,
    pub left_prefix: String,
    pub right_prefix: String,
    /// Node id column of the right table, before prefixing.
    pub right_id_column: String,
    /// Immediate parent column of the right table, before prefixing.
    pub right_parent_column: String,
}

impl JoinSpec {
    pub fn nucc() -> Self {
        Self {
            left_name: "downloaded".to_string(),
            right_name: "scraped".to_string(),
            left_key: "Code".to_string(),
            right_key: "code_text".to_string(),
            left_prefix: "download_".to_string(),
            right_prefix: "scraped_".to_string(),
            right_id_column: "code_id".to_string(),
            right_parent_column: "immediate_parent_code_id".to_string(),
        }
    }

    pub fn left_column(&self, name: &str) -> String {
        format!("{}{}", self.left_prefix, name)
    }

    pub fn right_column(&self, name: &str) -> String {
        format!("{}{}", self.right_prefix, name)
    }

    /// Name of the node id column in the reconciled table.
    pub fn reconciled_id_column(&self) -> String {
        self.right_column(&self.right_id_column)
    }
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self::nucc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Both,
    LeftOnly,
    RightOnly,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Both => "both",
            Presence::LeftOnly => "left_only",
            Presence::RightOnly => "right_only",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Presence {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "both" => Ok(Presence::Both),
            "left_only" => Ok(Presence::LeftOnly),
            "right_only" => Ok(Presence::RightOnly),
            other => Err(CoreError::InvalidValue {
                context: PRESENCE.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Where a row's `combined_code` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    Code,
    NodeId,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Code => "code",
            CodeKind::NodeId => "node_id",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceCounts {
    pub both: usize,
    pub left_only: usize,
    pub right_only: usize,
}

impl PresenceCounts {
    pub fn total(&self) -> usize {
        self.both + self.left_only + self.right_only
    }

    pub fn get(&self, presence: Presence) -> usize {
        match presence {
            Presence::Both => self.both,
            Presence::LeftOnly => self.left_only,
            Presence::RightOnly => self.right_only,
        }
    }

    fn record(&mut self, presence: Presence) {
        match presence {
            Presence::Both => self.both += 1,
            Presence::LeftOnly => self.left_only += 1,
            Presence::RightOnly => self.right_only += 1,
        }
    }
}

/// Join anomalies; none of them stop the join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinConflicts {
    pub left_duplicate_keys: BTreeMap<String, usize>,
    pub right_duplicate_keys: BTreeMap<String, usize>,
    pub left_null_keys: usize,
    pub right_null_keys: usize,
    /// Extra rows produced by duplicate keys matching more than once.
    pub fanout_rows: usize,
    pub id_fallback_rows: usize,
    pub unidentified_rows: usize,
}

impl JoinConflicts {
    pub fn is_clean(&self) -> bool {
        self.left_duplicate_keys.is_empty()
            && self.right_duplicate_keys.is_empty()
            && self.left_null_keys == 0
            && self.right_null_keys == 0
            && self.unidentified_rows == 0
    }
}

/// Reconciled rows with their presence class.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTable {
    table: Table,
    presence: Vec<Presence>,
    spec: JoinSpec,
}

impl ReconciledTable {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn presence(&self, row: usize) -> Option<Presence> {
        self.presence.get(row).copied()
    }

    pub fn counts(&self) -> PresenceCounts {
        let mut counts = PresenceCounts::default();
        for presence in &self.presence {
            counts.record(*presence);
        }
        counts
    }

    pub fn subset(&self, presence: Presence) -> Table {
        self.table.filter_rows(|row| self.presence[row] == presence)
    }

    /// Rebuild from a stored reconciled table. Without a `presence` column
    /// the class is inferred from which key columns are filled.
    pub fn from_table(table: Table, spec: &JoinSpec) -> Result<Self> {
        let presence = match table.column_index(PRESENCE) {
            Some(column) => (0..table.len())
                .map(|row| {
                    table
                        .cell(row, column)
                        .unwrap_or_default()
                        .parse::<Presence>()
                })
                .collect::<Result<Vec<_>>>()?,
            None => {
                let left = table.require_column(&spec.left_key, "reconciled")?;
                let right = table.require_column(&spec.right_key, "reconciled")?;
                (0..table.len())
                    .map(|row| {
                        match (
                            normalize_key(table.cell(row, left)),
                            normalize_key(table.cell(row, right)),
                        ) {
                            (Some(_), Some(_)) => Presence::Both,
                            (Some(_), None) => Presence::LeftOnly,
                            (None, _) => Presence::RightOnly,
                        }
                    })
                    .collect()
            }
        };

        Ok(Self {
            table,
            presence,
            spec: spec.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub reconciled: ReconciledTable,
    pub counts: PresenceCounts,
    pub conflicts: JoinConflicts,
}

/// Trim and map missing-value literals to null.
pub fn normalize_key(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || NULL_LITERALS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize an identifier so `"123.0"` and `"123"` compare equal.
pub fn normalize_identifier(value: Option<&str>) -> Option<String> {
    let key = normalize_key(value)?;
    let digits = key.strip_suffix(".0").unwrap_or(&key);
    match digits.parse::<i64>() {
        Ok(n) => Some(n.to_string()),
        Err(_) => Some(key),
    }
}

/// Normalize a parent pointer; the root sentinel and non-integers read as null.
fn normalize_parent(value: Option<&str>) -> Option<String> {
    let key = normalize_key(value)?;
    let digits = key.strip_suffix(".0").unwrap_or(&key);
    match digits.parse::<i64>() {
        Ok(0) => None,
        Ok(n) => Some(n.to_string()),
        Err(_) => {
            debug!("Ignoring non-integer parent pointer {:?}", key);
            None
        }
    }
}

/// Numeric ids ascending, then everything else lexicographically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn duplicate_keys(keys: &[Option<String>]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in keys.iter().flatten() {
        *counts.entry(key.clone()).or_default() += 1;
    }
    counts.retain(|_, count| *count > 1);
    counts
}

/// Full outer join of `left` and `right` on their key columns.
pub fn reconcile(left: &Table, right: &Table, spec: &JoinSpec) -> Result<Reconciliation> {
    let left_key_col = left.require_column(&spec.left_key, &spec.left_name)?;
    let right_key_col = right.require_column(&spec.right_key, &spec.right_name)?;

    let right_id_col = right.column_index(&spec.right_id_column);
    if right_id_col.is_none() {
        warn!(
            "{} table has no '{}' column; node id fallback unavailable",
            spec.right_name, spec.right_id_column
        );
    }
    let right_parent_col = right.column_index(&spec.right_parent_column);
    if right_parent_col.is_none() {
        warn!(
            "{} table has no '{}' column; parent pointers unavailable",
            spec.right_name, spec.right_parent_column
        );
    }

    let left_keys: Vec<Option<String>> = (0..left.len())
        .map(|row| normalize_key(left.cell(row, left_key_col)))
        .collect();
    let right_keys: Vec<Option<String>> = (0..right.len())
        .map(|row| normalize_key(right.cell(row, right_key_col)))
        .collect();

    let mut conflicts = JoinConflicts {
        left_duplicate_keys: duplicate_keys(&left_keys),
        right_duplicate_keys: duplicate_keys(&right_keys),
        left_null_keys: left_keys.iter().filter(|k| k.is_none()).count(),
        right_null_keys: right_keys.iter().filter(|k| k.is_none()).count(),
        ..Default::default()
    };

    let mut right_index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (row, key) in right_keys.iter().enumerate() {
        if let Some(key) = key {
            right_index.entry(key.as_str()).or_default().push(row);
        }
    }

    let left_value_cols: Vec<usize> = (0..left.headers().len())
        .filter(|&c| c != left_key_col)
        .collect();
    let right_value_cols: Vec<usize> = (0..right.headers().len())
        .filter(|&c| c != right_key_col)
        .collect();

    let mut headers = vec![
        COMBINED_CODE.to_string(),
        COMBINED_CODE_KIND.to_string(),
        PRESENCE.to_string(),
        IMMEDIATE_PARENT_ID.to_string(),
    ];
    headers.extend(
        left_value_cols
            .iter()
            .map(|&c| spec.left_column(&left.headers()[c])),
    );
    headers.extend(
        right_value_cols
            .iter()
            .map(|&c| spec.right_column(&right.headers()[c])),
    );
    headers.push(spec.left_key.clone());
    headers.push(spec.right_key.clone());

    let mut table = Table::new(headers);
    let mut presence = Vec::new();

    let mut emit = |l: Option<usize>, r: Option<usize>, conflicts: &mut JoinConflicts| {
        let left_key = l.and_then(|i| left_keys[i].clone());
        let right_key = r.and_then(|j| right_keys[j].clone());
        let node_id = r.and_then(|j| {
            right_id_col.and_then(|c| normalize_identifier(right.cell(j, c)))
        });
        let parent = r.and_then(|j| right_parent_col.and_then(|c| normalize_parent(right.cell(j, c))));

        let (combined, kind) = match (&left_key, &right_key, node_id) {
            (Some(code), _, _) | (None, Some(code), _) => (Some(code.clone()), Some(CodeKind::Code)),
            (None, None, Some(id)) => {
                conflicts.id_fallback_rows += 1;
                (Some(id), Some(CodeKind::NodeId))
            }
            (None, None, None) => {
                conflicts.unidentified_rows += 1;
                (None, None)
            }
        };

        let class = match (l, r) {
            (Some(_), Some(_)) => Presence::Both,
            (Some(_), None) => Presence::LeftOnly,
            _ => Presence::RightOnly,
        };

        let mut cells: Vec<Cell> = vec![
            combined,
            kind.map(|k| k.as_str().to_string()),
            Some(class.as_str().to_string()),
            parent,
        ];
        cells.extend(
            left_value_cols
                .iter()
                .map(|&c| l.and_then(|i| left.cell(i, c)).map(str::to_string)),
        );
        cells.extend(
            right_value_cols
                .iter()
                .map(|&c| r.and_then(|j| right.cell(j, c)).map(str::to_string)),
        );
        cells.push(left_key);
        cells.push(right_key);

        table.push_row(cells);
        presence.push(class);
    };

    let mut matched = vec![false; right.len()];
    for (i, key) in left_keys.iter().enumerate() {
        let matches = key
            .as_deref()
            .and_then(|k| right_index.get(k))
            .filter(|rows| !rows.is_empty());
        match matches {
            Some(rows) => {
                conflicts.fanout_rows += rows.len() - 1;
                for &j in rows {
                    matched[j] = true;
                    emit(Some(i), Some(j), &mut conflicts);
                }
            }
            None => emit(Some(i), None, &mut conflicts),
        }
    }
    for j in 0..right.len() {
        if !matched[j] {
            emit(None, Some(j), &mut conflicts);
        }
    }

    let reconciled = ReconciledTable {
        table,
        presence,
        spec: spec.clone(),
    };
    let counts = reconciled.counts();

    info!(
        "Reconciled {} rows: {} in both, {} {} only, {} {} only",
        counts.total(),
        counts.both,
        counts.left_only,
        spec.left_name,
        counts.right_only,
        spec.right_name
    );
    if !conflicts.left_duplicate_keys.is_empty() || !conflicts.right_duplicate_keys.is_empty() {
        warn!(
            "Duplicate join keys: {} in {}, {} in {} ({} fan-out rows)",
            conflicts.left_duplicate_keys.len(),
            spec.left_name,
            conflicts.right_duplicate_keys.len(),
            spec.right_name,
            conflicts.fanout_rows
        );
    }
    if conflicts.unidentified_rows > 0 {
        warn!("{} reconciled rows have no identifier", conflicts.unidentified_rows);
    }

    Ok(Reconciliation {
        reconciled,
        counts,
        conflicts,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub expected: usize,
    pub present: usize,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare the closure's node ids against every identifier in the reconciled table.
pub fn check_coverage(universe: &BTreeSet<i64>, reconciled: &ReconciledTable) -> CoverageReport {
    let spec = reconciled.spec();
    let table = reconciled.table();
    let expected: BTreeSet<String> = universe.iter().map(i64::to_string).collect();

    let mut present: BTreeSet<String> = BTreeSet::new();
    for column in [
        spec.left_key.clone(),
        spec.right_key.clone(),
        spec.reconciled_id_column(),
        COMBINED_CODE.to_string(),
    ] {
        present.extend(
            table
                .column_values(&column)
                .into_iter()
                .filter_map(normalize_identifier),
        );
    }

    let mut missing: Vec<String> = expected.difference(&present).cloned().collect();
    let mut extra: Vec<String> = present.difference(&expected).cloned().collect();
    missing.sort_by(|a, b| compare_ids(a, b));
    extra.sort_by(|a, b| compare_ids(a, b));

    if missing.is_empty() {
        info!("All {} closure nodes are present in the reconciled table", expected.len());
    } else {
        warn!(
            "{} of {} closure nodes are missing from the reconciled table",
            missing.len(),
            expected.len()
        );
    }

    CoverageReport {
        expected: expected.len(),
        present: present.len(),
        missing,
        extra,
    }
}
