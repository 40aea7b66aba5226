// Tests for citation extraction from node notes

mod common;

use common::{SCRAPED_CSV, table};
use taxon_core::CoreError;
use taxon_core::sources::{
    citations_for_node, citations_for_table, citations_from_table, citations_to_table,
    extract_sources, extract_urls,
};

// ============================================================================
// URL Extraction Tests
// ============================================================================

#[test]
fn test_bare_domain_gets_https() {
    assert_eq!(extract_urls("see cms.gov for details"), vec!["https://cms.gov"]);
    assert_eq!(
        extract_urls("Example Org, www.example.org"),
        vec!["https://www.example.org"]
    );
}

#[test]
fn test_full_url_keeps_scheme_and_drops_trailing_punctuation() {
    assert_eq!(
        extract_urls("Visit http://www.nucc.org/about."),
        vec!["http://www.nucc.org/about"]
    );
}

#[test]
fn test_domain_inside_url_is_not_repeated() {
    let urls = extract_urls("https://www.nucc.org/about and www.nucc.org");
    assert_eq!(urls, vec!["https://www.nucc.org/about"]);
}

#[test]
fn test_contained_urls_are_dropped() {
    let urls = extract_urls("https://nucc.org/a and https://nucc.org/a/b");
    assert_eq!(urls, vec!["https://nucc.org/a/b"]);
}

#[test]
fn test_urls_are_sorted() {
    let urls = extract_urls("www.b.org, www.a.org");
    assert_eq!(urls, vec!["https://www.a.org", "https://www.b.org"]);
}

#[test]
fn test_text_without_urls() {
    assert!(extract_urls("American Medical Association").is_empty());
}

// ============================================================================
// Source Segment Tests
// ============================================================================

#[test]
fn test_dated_source() {
    let sources = extract_sources("Source: Example Org, www.example.org [7/1/2003: new]");

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].source_text, "Example Org, www.example.org");
    assert_eq!(sources[0].date, "7/1/2003");
    assert_eq!(sources[0].note, "new");
    assert_eq!(sources[0].urls, vec!["https://www.example.org"]);
}

#[test]
fn test_text_after_date_is_kept() {
    let sources = extract_sources("Source: Example Org [7/1/2003: new] more text");
    assert_eq!(sources[0].source_text, "Example Org more text");
}

#[test]
fn test_multiple_sources() {
    let sources = extract_sources(
        "Definition text. Source: First Org [1/1/2001: added] Source: Second Org, www.second.org",
    );

    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].source_text, "First Org");
    assert_eq!(sources[0].date, "1/1/2001");
    assert!(sources[0].urls.is_empty());
    assert_eq!(sources[1].source_text, "Second Org, www.second.org");
    assert!(sources[1].date.is_empty());
    assert_eq!(sources[1].urls, vec!["https://www.second.org"]);
}

#[test]
fn test_notes_without_marker() {
    assert!(extract_sources("Just a note.").is_empty());
}

// ============================================================================
// Citation Row Tests
// ============================================================================

#[test]
fn test_one_row_per_url() {
    let citations = citations_for_node("77", "Source: Two sites, www.a.org and www.b.org");
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].nucc_code_id, "77");
    assert_eq!(citations[0].extracted_urls, "https://www.a.org");
    assert_eq!(citations[1].extracted_urls, "https://www.b.org");
}

#[test]
fn test_source_without_url_still_yields_a_row() {
    let citations = citations_for_node("77", "Source: A printed manual");
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].extracted_urls, "");
}

#[test]
fn test_citations_for_node_table() {
    let citations = citations_for_table(&table(SCRAPED_CSV)).unwrap();

    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].nucc_code_id, "2500");
    assert_eq!(citations[0].source_date, "7/1/2003");
    assert_eq!(citations[0].extracted_urls, "https://www.example.org");
}

#[test]
fn test_citations_table_requires_notes() {
    let err = citations_for_table(&table("code_id,code_text\n1,X\n")).unwrap_err();
    assert!(matches!(err, CoreError::MissingColumn { ref column, .. } if column == "code_notes"));
}

#[test]
fn test_citations_survive_csv() {
    let citations = citations_for_node("77", "Source: A printed manual [1/1/2001: added]");
    let text = citations_to_table(&citations).to_csv_string().unwrap();
    let restored = citations_from_table(&table(&text)).unwrap();
    assert_eq!(restored, citations);
}
