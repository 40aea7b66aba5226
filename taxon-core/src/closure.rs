// Ancestor/descendant closure over a parent-pointer tree

use crate::error::{CoreError, Result};
use crate::model::{NUCC_EXCLUDED_IDS, ROOT_PARENT, RawNode};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const ANCESTOR_COLUMN: &str = "ancestor_id";
pub const CHILD_COLUMN: &str = "child_id";

/// Which nodes take no part in the closure, and which parent value ends a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionPolicy {
    excluded: BTreeSet<i64>,
    root_parent: i64,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl ExclusionPolicy {
    pub fn new(excluded: impl IntoIterator<Item = i64>, root_parent: i64) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
            root_parent,
        }
    }

    pub fn none() -> Self {
        Self::new([], ROOT_PARENT)
    }

    /// The comment nodes of the NUCC taxonomy site.
    pub fn nucc() -> Self {
        Self::new(NUCC_EXCLUDED_IDS, ROOT_PARENT)
    }

    pub fn is_excluded(&self, node_id: i64) -> bool {
        self.excluded.contains(&node_id)
    }

    pub fn excluded(&self) -> &BTreeSet<i64> {
        &self.excluded
    }

    pub fn root_parent(&self) -> i64 {
        self.root_parent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AncestorEdge {
    pub ancestor_id: i64,
    pub descendant_id: i64,
}

impl AncestorEdge {
    pub fn new(ancestor_id: i64, descendant_id: i64) -> Self {
        Self {
            ancestor_id,
            descendant_id,
        }
    }

    pub fn is_reflexive(&self) -> bool {
        self.ancestor_id == self.descendant_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationKind {
    /// The next parent is excluded by policy.
    Excluded,
    /// The next parent is not a known node.
    Dangling,
    /// The next parent was already visited on this walk.
    Cycle,
}

/// A chain walk that stopped before reaching the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub node_id: i64,
    pub at_parent: i64,
    pub kind: TruncationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosureDiagnostics {
    pub input_records: usize,
    pub duplicate_ids: Vec<i64>,
    pub skipped_excluded: Vec<i64>,
    pub truncations: Vec<Truncation>,
}

impl ClosureDiagnostics {
    pub fn count(&self, kind: TruncationKind) -> usize {
        self.truncations.iter().filter(|t| t.kind == kind).count()
    }

    pub fn of_kind(&self, kind: TruncationKind) -> impl Iterator<Item = &Truncation> {
        self.truncations.iter().filter(move |t| t.kind == kind)
    }

    pub fn has_anomalies(&self) -> bool {
        !self.duplicate_ids.is_empty() || !self.truncations.is_empty()
    }
}

/// Set of ancestor edges with a per-node index of strict ancestors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosureSet {
    edges: BTreeSet<AncestorEdge>,
    ancestors: BTreeMap<i64, BTreeSet<i64>>,
}

impl ClosureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge: AncestorEdge) -> bool {
        let entry = self.ancestors.entry(edge.descendant_id).or_default();
        if !edge.is_reflexive() {
            entry.insert(edge.ancestor_id);
        }
        self.edges.insert(edge)
    }

    pub fn contains(&self, ancestor_id: i64, descendant_id: i64) -> bool {
        self.edges
            .contains(&AncestorEdge::new(ancestor_id, descendant_id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &AncestorEdge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Ancestors of `node_id`, excluding the node itself.
    pub fn strict_ancestors(&self, node_id: i64) -> BTreeSet<i64> {
        self.ancestors.get(&node_id).cloned().unwrap_or_default()
    }

    /// Number of strict ancestors; top-level nodes have depth 0.
    pub fn depth_of(&self, node_id: i64) -> usize {
        self.ancestors.get(&node_id).map_or(0, BTreeSet::len)
    }

    /// Every node id that appears on either side of an edge.
    pub fn node_universe(&self) -> BTreeSet<i64> {
        self.edges
            .iter()
            .flat_map(|e| [e.ancestor_id, e.descendant_id])
            .collect()
    }

    pub fn union(&self, other: &ClosureSet) -> ClosureSet {
        let mut merged = self.clone();
        for edge in other.edges() {
            merged.insert(*edge);
        }
        merged
    }

    /// Edges as strings, ordered lexicographically on their text.
    pub fn canonical_rows(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = self
            .edges
            .iter()
            .map(|e| (e.ancestor_id.to_string(), e.descendant_id.to_string()))
            .collect();
        rows.sort();
        rows
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new([ANCESTOR_COLUMN, CHILD_COLUMN]);
        for (ancestor, child) in self.canonical_rows() {
            table.push_row(vec![Some(ancestor), Some(child)]);
        }
        table
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let ancestor_col = table.require_column(ANCESTOR_COLUMN, "closure")?;
        let child_col = table.require_column(CHILD_COLUMN, "closure")?;

        let mut closure = ClosureSet::new();
        for row in 0..table.len() {
            let ancestor = parse_node_id(table.cell(row, ancestor_col), ANCESTOR_COLUMN)?;
            let child = parse_node_id(table.cell(row, child_col), CHILD_COLUMN)?;
            closure.insert(AncestorEdge::new(ancestor, child));
        }
        Ok(closure)
    }
}

/// Parse an integer id, tolerating a `.0` suffix left by float-typed exports.
pub fn parse_node_id(value: Option<&str>, context: &str) -> Result<i64> {
    let text = value.map(str::trim).unwrap_or("");
    let digits = text.strip_suffix(".0").unwrap_or(text);
    digits.parse::<i64>().map_err(|_| CoreError::InvalidValue {
        context: context.to_string(),
        value: text.to_string(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct ClosureOutcome {
    pub closure: ClosureSet,
    pub diagnostics: ClosureDiagnostics,
}

/// Flatten parent pointers into the full ancestor relation, reflexive pairs
/// included. Later records override earlier ones with the same id.
pub fn build_closure(nodes: &[RawNode], policy: &ExclusionPolicy) -> Result<ClosureOutcome> {
    let mut diagnostics = ClosureDiagnostics {
        input_records: nodes.len(),
        ..Default::default()
    };

    let mut parents: BTreeMap<i64, i64> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let node_id = node.node_id.ok_or(CoreError::MalformedNode { index })?;
        if parents.insert(node_id, node.parent_id).is_some() {
            diagnostics.duplicate_ids.push(node_id);
        }
    }
    diagnostics.duplicate_ids.sort_unstable();
    diagnostics.duplicate_ids.dedup();

    let mut closure = ClosureSet::new();

    for &node_id in parents.keys() {
        if policy.is_excluded(node_id) {
            diagnostics.skipped_excluded.push(node_id);
            continue;
        }

        closure.insert(AncestorEdge::new(node_id, node_id));

        let mut visited = BTreeSet::from([node_id]);
        let mut current = node_id;
        while let Some(&parent) = parents.get(&current) {
            if parent == policy.root_parent() {
                break;
            }
            let kind = if policy.is_excluded(parent) {
                Some(TruncationKind::Excluded)
            } else if !parents.contains_key(&parent) {
                Some(TruncationKind::Dangling)
            } else if visited.contains(&parent) {
                Some(TruncationKind::Cycle)
            } else {
                None
            };

            if let Some(kind) = kind {
                debug!("Chain of node {} stops at {} ({:?})", node_id, parent, kind);
                diagnostics.truncations.push(Truncation {
                    node_id,
                    at_parent: parent,
                    kind,
                });
                break;
            }

            closure.insert(AncestorEdge::new(parent, node_id));
            visited.insert(parent);
            current = parent;
        }
    }

    info!(
        "Built closure: {} edges over {} nodes",
        closure.len(),
        parents.len() - diagnostics.skipped_excluded.len()
    );
    if !diagnostics.duplicate_ids.is_empty() {
        warn!("{} duplicate node ids in input", diagnostics.duplicate_ids.len());
    }
    for kind in [TruncationKind::Dangling, TruncationKind::Cycle] {
        let count = diagnostics.count(kind);
        if count > 0 {
            warn!("{} chains truncated ({:?})", count, kind);
        }
    }

    Ok(ClosureOutcome {
        closure,
        diagnostics,
    })
}

/// Node id to immediate parent id, leaving out top-level nodes.
pub fn immediate_parents(nodes: &[RawNode]) -> Result<BTreeMap<i64, i64>> {
    let mut parents = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let node_id = node.node_id.ok_or(CoreError::MalformedNode { index })?;
        if node.parent_id == ROOT_PARENT {
            parents.remove(&node_id);
        } else {
            parents.insert(node_id, node.parent_id);
        }
    }
    Ok(parents)
}

pub const IMMEDIATE_CHILD_COLUMN: &str = "code_id";
pub const IMMEDIATE_PARENT_COLUMN: &str = "immediate_parent_code_id";

pub fn immediate_parents_table(parents: &BTreeMap<i64, i64>) -> Table {
    let mut table = Table::new([IMMEDIATE_CHILD_COLUMN, IMMEDIATE_PARENT_COLUMN]);
    for (child, parent) in parents {
        table.push_row(vec![Some(child.to_string()), Some(parent.to_string())]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_id_accepts_float_suffix() {
        assert_eq!(parse_node_id(Some(" 123.0 "), "x").unwrap(), 123);
        assert_eq!(parse_node_id(Some("7"), "x").unwrap(), 7);
        assert!(parse_node_id(Some("abc"), "x").is_err());
        assert!(parse_node_id(None, "x").is_err());
    }

    #[test]
    fn test_union_merges_index() {
        let mut a = ClosureSet::new();
        a.insert(AncestorEdge::new(1, 2));
        let mut b = ClosureSet::new();
        b.insert(AncestorEdge::new(3, 2));
        let merged = a.union(&b);
        assert_eq!(merged.depth_of(2), 2);
        assert_eq!(merged.len(), 2);
    }
}
