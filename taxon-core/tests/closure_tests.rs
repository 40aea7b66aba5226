// Tests for closure building

mod common;

use common::TREE_JSON;
use std::collections::BTreeSet;
use taxon_core::closure::{ANCESTOR_COLUMN, CHILD_COLUMN, immediate_parents_table};
use taxon_core::model::raw_nodes;
use taxon_core::{
    AncestorEdge, ClosureSet, CoreError, ExclusionPolicy, RawNode, TruncationKind, build_closure,
    immediate_parents,
};
use taxon_scanner::parse_tree_json;

fn fixture_nodes() -> Vec<RawNode> {
    raw_nodes(&parse_tree_json(TREE_JSON).unwrap())
}

fn nucc_closure() -> ClosureSet {
    build_closure(&fixture_nodes(), &ExclusionPolicy::nucc())
        .unwrap()
        .closure
}

// ============================================================================
// Relation Tests
// ============================================================================

#[test]
fn test_every_node_is_its_own_ancestor() {
    let closure = nucc_closure();
    for id in [1, 2, 14, 2496, 2500, 2800, 9999] {
        assert!(closure.contains(id, id), "missing reflexive edge for {id}");
    }
}

#[test]
fn test_chain_is_complete_up_to_root() {
    let closure = nucc_closure();
    for ancestor in [2496, 14, 2] {
        assert!(closure.contains(ancestor, 2500));
    }
    assert_eq!(closure.strict_ancestors(2500), BTreeSet::from([2, 14, 2496]));
    assert_eq!(closure.depth_of(2500), 3);
    assert_eq!(closure.depth_of(2), 0);
}

#[test]
fn test_closure_size() {
    // 1, 2, 9999(2), 14(2), 2496(3), 2500(4), 2800(1)
    assert_eq!(nucc_closure().len(), 14);
}

#[test]
fn test_transitivity() {
    let closure = nucc_closure();
    for a in closure.edges() {
        for b in closure.edges() {
            if a.descendant_id == b.ancestor_id {
                assert!(closure.contains(a.ancestor_id, b.descendant_id));
            }
        }
    }
}

#[test]
fn test_node_universe() {
    assert_eq!(
        nucc_closure().node_universe(),
        BTreeSet::from([1, 2, 14, 2496, 2500, 2800, 9999])
    );
}

// ============================================================================
// Exclusion and Truncation Tests
// ============================================================================

#[test]
fn test_excluded_nodes_emit_no_edges() {
    let closure = nucc_closure();
    for excluded in [5, 2712] {
        assert!(closure.edges().all(|e| e.ancestor_id != excluded && e.descendant_id != excluded));
    }
}

#[test]
fn test_chain_stops_before_excluded_parent() {
    let outcome = build_closure(&fixture_nodes(), &ExclusionPolicy::nucc()).unwrap();
    assert!(outcome.closure.contains(2800, 2800));
    assert!(!outcome.closure.contains(2, 2800));
    assert_eq!(outcome.closure.depth_of(2800), 0);

    let excluded: Vec<_> = outcome
        .diagnostics
        .of_kind(TruncationKind::Excluded)
        .collect();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].node_id, 2800);
    assert_eq!(excluded[0].at_parent, 2712);
    assert_eq!(outcome.diagnostics.skipped_excluded, vec![5, 2712]);
}

#[test]
fn test_without_policy_comment_nodes_are_included() {
    let closure = build_closure(&fixture_nodes(), &ExclusionPolicy::none())
        .unwrap()
        .closure;
    assert!(closure.contains(2712, 2800));
    assert!(closure.contains(2, 2800));
    assert!(closure.contains(5, 5));
}

#[test]
fn test_dangling_parent_truncates_silently() {
    let nodes = vec![RawNode::new(10, 0), RawNode::new(11, 10), RawNode::new(12, 404)];
    let outcome = build_closure(&nodes, &ExclusionPolicy::none()).unwrap();

    assert!(outcome.closure.contains(12, 12));
    assert_eq!(outcome.closure.depth_of(12), 0);
    assert_eq!(outcome.diagnostics.count(TruncationKind::Dangling), 1);
    assert_eq!(outcome.diagnostics.truncations[0].at_parent, 404);
}

#[test]
fn test_cycle_terminates() {
    let nodes = vec![RawNode::new(1, 3), RawNode::new(2, 1), RawNode::new(3, 2)];
    let outcome = build_closure(&nodes, &ExclusionPolicy::none()).unwrap();

    assert_eq!(outcome.diagnostics.count(TruncationKind::Cycle), 3);
    assert!(outcome.closure.contains(1, 2));
    assert!(outcome.closure.contains(3, 2));
    assert_eq!(outcome.closure.len(), 9);
}

#[test]
fn test_self_parent_is_a_cycle() {
    let outcome = build_closure(&[RawNode::new(7, 7)], &ExclusionPolicy::none()).unwrap();
    assert_eq!(outcome.closure.len(), 1);
    assert_eq!(outcome.diagnostics.count(TruncationKind::Cycle), 1);
}

// ============================================================================
// Input Contract Tests
// ============================================================================

#[test]
fn test_missing_node_id_is_fatal() {
    let nodes = vec![
        RawNode::new(1, 0),
        RawNode {
            node_id: None,
            parent_id: 1,
        },
    ];
    let err = build_closure(&nodes, &ExclusionPolicy::none()).unwrap_err();
    assert!(matches!(err, CoreError::MalformedNode { index: 1 }));
}

#[test]
fn test_duplicate_ids_last_record_wins() {
    let nodes = vec![
        RawNode::new(1, 0),
        RawNode::new(2, 0),
        RawNode::new(3, 1),
        RawNode::new(3, 2),
    ];
    let outcome = build_closure(&nodes, &ExclusionPolicy::none()).unwrap();

    assert!(outcome.closure.contains(2, 3));
    assert!(!outcome.closure.contains(1, 3));
    assert_eq!(outcome.diagnostics.duplicate_ids, vec![3]);
}

#[test]
fn test_identical_input_gives_identical_closure() {
    let first = nucc_closure();
    let mut reversed = fixture_nodes();
    reversed.reverse();
    let second = build_closure(&reversed, &ExclusionPolicy::nucc())
        .unwrap()
        .closure;
    assert_eq!(first, second);
}

// ============================================================================
// Serialization Tests
// ============================================================================

#[test]
fn test_canonical_rows_sort_as_strings() {
    let mut closure = ClosureSet::new();
    for edge in [
        AncestorEdge::new(2, 2),
        AncestorEdge::new(10, 10),
        AncestorEdge::new(2, 10),
    ] {
        closure.insert(edge);
    }
    let rows: Vec<(String, String)> = closure.canonical_rows();
    assert_eq!(
        rows,
        vec![
            ("10".to_string(), "10".to_string()),
            ("2".to_string(), "10".to_string()),
            ("2".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn test_table_round_trip() {
    let closure = nucc_closure();
    let table = closure.to_table();
    assert_eq!(table.headers(), [ANCESTOR_COLUMN, CHILD_COLUMN]);
    assert_eq!(table.len(), closure.len());
    assert_eq!(ClosureSet::from_table(&table).unwrap(), closure);
}

#[test]
fn test_from_table_rejects_non_integer() {
    let table = common::table("ancestor_id,child_id\n1,abc\n");
    assert!(matches!(
        ClosureSet::from_table(&table),
        Err(CoreError::InvalidValue { .. })
    ));
}

#[test]
fn test_immediate_parents_omit_top_level() {
    let parents = immediate_parents(&fixture_nodes()).unwrap();
    assert_eq!(parents.get(&2500), Some(&2496));
    assert_eq!(parents.get(&2800), Some(&2712));
    assert!(!parents.contains_key(&1));

    let table = immediate_parents_table(&parents);
    assert_eq!(table.headers(), ["code_id", "immediate_parent_code_id"]);
    assert_eq!(table.get(0, "code_id"), Some("14"));
}
