// Tests for lineage verification

mod common;

use common::{DOWNLOAD_CSV, SCRAPED_CSV, TREE_JSON, table};
use taxon_core::model::raw_nodes;
use taxon_core::verify::{LineageIndex, verify_lineages, verify_with_closure, verify_with_pointers};
use taxon_core::{
    Agreement, ClosureSet, ExclusionPolicy, Identifier, JoinSpec, Lineage, SupplementalMapping,
    VerifySchema, build_closure, reconcile,
};
use taxon_scanner::parse_tree_json;

fn closure_from(tree_json: &str) -> ClosureSet {
    let nodes = raw_nodes(&parse_tree_json(tree_json).unwrap());
    build_closure(&nodes, &ExclusionPolicy::nucc())
        .unwrap()
        .closure
}

fn index_from(scraped_csv: &str) -> LineageIndex {
    let result = reconcile(&table(DOWNLOAD_CSV), &table(scraped_csv), &JoinSpec::nucc()).unwrap();
    LineageIndex::build(
        result.reconciled.table(),
        &VerifySchema::nucc(),
        &SupplementalMapping::nucc(),
    )
    .unwrap()
}

fn lineage(tokens: &[&str]) -> Lineage {
    Lineage::from_tokens(tokens)
}

const FAMILY_PLANNING: [&str; 4] = [
    "261QA1903X",
    "261Q00000X",
    "Ambulatory Health Care Facilities",
    "Non-individual",
];

// ============================================================================
// Reference Lineage Tests
// ============================================================================

#[test]
fn test_reference_lineage_passes_both_strategies() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let report = verify_lineages(&[lineage(&FAMILY_PLANNING)], &index, &closure);

    let result = &report.results[0];
    assert!(result.closure.passed, "{:?}", result.closure.mismatches);
    assert!(result.pointer.passed, "{:?}", result.pointer.mismatches);
    assert_eq!(result.agreement, Agreement::BothPass);
    assert_eq!(result.closure.chain, vec![2500, 2496, 14, 2]);
    assert_eq!(result.pointer.chain, vec![2500, 2496, 14, 2]);
    assert!(report.all_passed());
}

#[test]
fn test_swapped_label_fails_both_strategies() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let swapped = lineage(&["261QA1903X", "261Q00000X", "Hospitals", "Non-individual"]);
    let report = verify_lineages(&[swapped], &index, &closure);

    let result = &report.results[0];
    assert_eq!(result.agreement, Agreement::BothFail);
    assert!(!report.all_passed());

    let closure_miss = &result.closure.mismatches[0];
    assert_eq!(closure_miss.depth, 2);
    assert!(closure_miss.message.contains("'Hospitals'"));
    assert!(closure_miss.message.contains("Ambulatory Health Care Facilities"));

    let pointer_miss = &result.pointer.mismatches[0];
    assert_eq!(pointer_miss.depth, 2);
    assert!(pointer_miss.message.contains("'Hospitals'"));
    assert!(pointer_miss.message.contains("node 14"));
    assert!(pointer_miss.message.contains("Ambulatory Health Care Facilities"));
}

#[test]
fn test_one_failure_does_not_stop_the_rest() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let lineages = vec![
        lineage(&["ZZZZ99999Z", "261Q00000X"]),
        lineage(&FAMILY_PLANNING),
    ];
    let report = verify_lineages(&lineages, &index, &closure);

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.passed_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.results[0].closure.mismatches[0].depth, 0);
}

// ============================================================================
// Disagreement Tests
// ============================================================================

#[test]
fn test_bad_parent_pointer_is_closure_only() {
    let closure = closure_from(TREE_JSON);
    let tampered = SCRAPED_CSV.replace(",2496\n", ",14\n");
    let index = index_from(&tampered);

    let result = &verify_lineages(&[lineage(&FAMILY_PLANNING)], &index, &closure).results[0];
    assert_eq!(result.agreement, Agreement::ClosureOnly);
    assert!(result.agreement.description().contains("parent pointer"));
}

#[test]
fn test_bad_closure_is_pointer_only() {
    let tampered_tree = TREE_JSON.replace(
        r#"{"id": 2500, "pId": 2496"#,
        r#"{"id": 2500, "pId": 14"#,
    );
    let closure = closure_from(&tampered_tree);
    let index = index_from(SCRAPED_CSV);

    let result = &verify_lineages(&[lineage(&FAMILY_PLANNING)], &index, &closure).results[0];
    assert_eq!(result.agreement, Agreement::PointerOnly);
    assert_eq!(result.closure.mismatches[0].depth, 1);

    let report = verify_lineages(&[lineage(&FAMILY_PLANNING)], &index, &closure);
    assert_eq!(report.disagreements().count(), 1);
}

// ============================================================================
// Strategy Detail Tests
// ============================================================================

#[test]
fn test_pointer_chain_ending_early() {
    let index = index_from(SCRAPED_CSV);
    let too_long = lineage(&[
        "261QA1903X",
        "261Q00000X",
        "Ambulatory Health Care Facilities",
        "Non-individual",
        "Beyond the root",
    ]);
    let result = verify_with_pointers(&too_long, &index);

    assert!(!result.passed);
    let miss = &result.mismatches[0];
    assert_eq!(miss.depth, 4);
    assert!(miss.message.contains("chain ended"));
    assert!(miss.message.contains("node 2"));
}

#[test]
fn test_label_leaf_must_be_unambiguous() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let ambiguous = lineage(&["Ambulatory Health Care Facilities", "Non-individual"]);
    let result = verify_with_closure(&ambiguous, &index, &closure);

    assert!(!result.passed);
    assert!(result.mismatches[0].message.contains("ambiguous"));
}

#[test]
fn test_unique_label_leaf_resolves() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let by_long_name = lineage(&[
        "Clinic/Center - Ambulatory Family Planning Facility",
        "261Q00000X",
    ]);
    let result = verify_with_closure(&by_long_name, &index, &closure);
    assert!(result.passed, "{:?}", result.mismatches);
    assert_eq!(result.chain, vec![2500, 2496]);
}

#[test]
fn test_code_parent_must_be_ancestor() {
    let closure = closure_from(TREE_JSON);
    let index = index_from(SCRAPED_CSV);
    let reversed = lineage(&["261Q00000X", "261QA1903X"]);
    let result = verify_with_closure(&reversed, &index, &closure);

    assert!(!result.passed);
    assert!(result.mismatches[0].message.contains("ancestor"));
}

#[test]
fn test_label_matches_section_column() {
    let index = index_from(SCRAPED_CSV);
    let view = index.view(2500).unwrap();
    assert!(view.matches(&Identifier::Label("Non-individual".to_string())));
    assert!(view.matches(&Identifier::Label(
        "Ambulatory Family Planning Facility".to_string()
    )));
    assert!(view.matches(&Identifier::Code("261QA1903X".to_string())));
}

#[test]
fn test_structural_node_uses_supplemental_mapping() {
    let index = index_from(SCRAPED_CSV);
    let view = index.view(2477).unwrap();
    assert!(view.codes.contains("281P00000X"));
    assert!(view.labels.contains("Hospitals"));
    assert!(view.sections.contains("Non-individual"));
}

#[test]
fn test_lineages_from_json() {
    let lineages = Lineage::from_json(
        r#"[{"name": "family planning", "chain": ["261QA1903X", "Non-individual"]},
            {"chain": ["273100000X", "Hospital Units"]}]"#,
    )
    .unwrap();

    assert_eq!(lineages[0].name, "family planning");
    assert_eq!(lineages[1].name, "273100000X");
    assert_eq!(
        lineages[1].entries[1],
        Identifier::Label("Hospital Units".to_string())
    );
}
