// Citation extraction from node notes ("Source: ... [date: note]")

use crate::error::{CoreError, Result};
use crate::table::Table;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info};

static FULL_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s,\[\]()"]+"#).expect("valid URL pattern"));

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:www\.)?[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}\b",
    )
    .expect("valid domain pattern")
});

static TRAILING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,;:!?]+$").expect("valid punctuation pattern"));

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("valid scheme pattern"));

static DATED_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s*\[([^:]+):\s*([^\]]+)\](.*)$").expect("valid citation pattern")
});

static TRAILING_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,.\s]+$").expect("valid separator pattern"));

const NOT_DOMAINS: [&str; 8] = ["u.s.", "p.o.", "etc.", "vs.", "no.", "vol.", "ed.", "pp."];

pub const SOURCE_MARKER: &str = "Source:";

pub const CITATION_COLUMNS: [&str; 5] = [
    "nucc_code_id",
    "full_source_text",
    "source_date",
    "source_date_note",
    "extracted_urls",
];

/// One `Source:` segment of a notes field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub source_text: String,
    pub date: String,
    pub note: String,
    pub urls: Vec<String>,
}

/// One output row: a source paired with one of its URLs, or with none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub nucc_code_id: String,
    pub full_source_text: String,
    pub source_date: String,
    pub source_date_note: String,
    pub extracted_urls: String,
}

/// URLs and bare domains in `text`, normalized to `https://` and with any
/// URL that is contained in a longer one dropped. Sorted.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: BTreeSet<String> = FULL_URL
        .find_iter(text)
        .map(|m| TRAILING_PUNCTUATION.replace(m.as_str(), "").into_owned())
        .collect();

    for found in DOMAIN.find_iter(text) {
        let domain = TRAILING_PUNCTUATION.replace(found.as_str(), "").into_owned();
        if domain.starts_with("http") || domain.contains('@') {
            continue;
        }
        if NOT_DOMAINS.contains(&domain.to_lowercase().as_str()) {
            continue;
        }

        let covered = urls
            .iter()
            .any(|existing| SCHEME.replace(existing, "").starts_with(domain.as_str()));
        if !covered {
            urls.insert(format!("https://{}", domain));
        }
    }

    let mut by_length: Vec<String> = urls.into_iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut kept: Vec<String> = Vec::new();
    for url in by_length {
        if !kept.iter().any(|longer| longer != &url && longer.contains(url.as_str())) {
            kept.push(url);
        }
    }
    kept.sort();
    kept
}

/// Split a notes field into its `Source:` segments.
pub fn extract_sources(notes: &str) -> Vec<Source> {
    if !notes.contains(SOURCE_MARKER) {
        return Vec::new();
    }

    notes
        .split(SOURCE_MARKER)
        .skip(1)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match DATED_SOURCE.captures(part) {
            Some(caps) => {
                let mut source_text = TRAILING_SEPARATORS
                    .replace(caps[1].trim(), "")
                    .into_owned();
                let additional = caps[4].trim();
                if !additional.is_empty() {
                    source_text.push(' ');
                    source_text.push_str(additional);
                }
                Source {
                    urls: extract_urls(&source_text),
                    source_text,
                    date: caps[2].trim().to_string(),
                    note: caps[3].trim().to_string(),
                }
            }
            None => Source {
                source_text: part.to_string(),
                urls: extract_urls(part),
                ..Default::default()
            },
        })
        .collect()
}

/// Citation rows for one node, one per URL.
pub fn citations_for_node(node_id: &str, notes: &str) -> Vec<SourceCitation> {
    let mut citations = Vec::new();
    for source in extract_sources(notes) {
        let row = |url: &str| SourceCitation {
            nucc_code_id: node_id.to_string(),
            full_source_text: source.source_text.clone(),
            source_date: source.date.clone(),
            source_date_note: source.note.clone(),
            extracted_urls: url.to_string(),
        };
        if source.urls.is_empty() {
            citations.push(row(""));
        } else {
            citations.extend(source.urls.iter().map(|url| row(url)));
        }
    }
    citations
}

/// Citations for every row of a node table with `code_id` and `code_notes`.
pub fn citations_for_table(nodes: &Table) -> Result<Vec<SourceCitation>> {
    let id_col = nodes.require_column("code_id", "nodes")?;
    let notes_col = nodes.require_column("code_notes", "nodes")?;

    let mut citations = Vec::new();
    for row in 0..nodes.len() {
        let (Some(node_id), Some(notes)) = (nodes.cell(row, id_col), nodes.cell(row, notes_col))
        else {
            continue;
        };
        let found = citations_for_node(node_id, notes);
        debug!("Node {}: {} citation rows", node_id, found.len());
        citations.extend(found);
    }

    info!("Extracted {} source records from {} nodes", citations.len(), nodes.len());
    Ok(citations)
}

pub fn citations_to_table(citations: &[SourceCitation]) -> Table {
    let mut table = Table::new(CITATION_COLUMNS);
    for c in citations {
        table.push_strings([
            &c.nucc_code_id,
            &c.full_source_text,
            &c.source_date,
            &c.source_date_note,
            &c.extracted_urls,
        ]);
    }
    table
}

pub fn citations_from_table(table: &Table) -> Result<Vec<SourceCitation>> {
    let columns = CITATION_COLUMNS
        .iter()
        .map(|c| table.require_column(c, "citations"))
        .collect::<Result<Vec<_>>>()?;
    let text = |row: usize, i: usize| table.cell(row, columns[i]).unwrap_or("").to_string();

    let citations: Vec<SourceCitation> = (0..table.len())
        .map(|row| SourceCitation {
            nucc_code_id: text(row, 0),
            full_source_text: text(row, 1),
            source_date: text(row, 2),
            source_date_note: text(row, 3),
            extracted_urls: text(row, 4),
        })
        .collect();

    if citations.iter().any(|c| c.nucc_code_id.is_empty()) {
        return Err(CoreError::InvalidValue {
            context: "citations".to_string(),
            value: "row without nucc_code_id".to_string(),
        });
    }
    Ok(citations)
}
