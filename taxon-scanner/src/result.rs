use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column order for the fields every node page is mapped onto.
pub const STANDARD_FIELDS: [&str; 8] = [
    "code_id",
    "code_text",
    "code_long_name",
    "code_short_name",
    "code_definition",
    "code_notes",
    "code_effective_date",
    "last_modified_date",
];

/// Attribute record extracted from a single node page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub code_id: String,
    pub code_text: String,
    pub code_long_name: String,
    pub code_short_name: String,
    pub code_definition: String,
    pub code_notes: String,
    pub code_effective_date: String,
    pub last_modified_date: String,
    pub deactivation_date: Option<String>,
    /// Table rows with keys we do not recognize, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn new(code_id: impl Into<String>) -> Self {
        Self {
            code_id: code_id.into(),
            ..Self::default()
        }
    }

    /// Value of a column by its tabular name, if the record carries it.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "code_id" => Some(&self.code_id),
            "code_text" => Some(&self.code_text),
            "code_long_name" => Some(&self.code_long_name),
            "code_short_name" => Some(&self.code_short_name),
            "code_definition" => Some(&self.code_definition),
            "code_notes" => Some(&self.code_notes),
            "code_effective_date" => Some(&self.code_effective_date),
            "last_modified_date" => Some(&self.last_modified_date),
            "deactivation_date" => self.deactivation_date.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    /// Names of the non-standard columns this record contributes.
    pub fn dynamic_fields(&self) -> impl Iterator<Item = &str> {
        self.deactivation_date
            .as_ref()
            .map(|_| "deactivation_date")
            .into_iter()
            .chain(self.extra.keys().map(String::as_str))
    }
}

/// Result of fetching a batch of node pages.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<NodeRecord>,
    pub failed: Vec<String>,
    pub cached: usize,
    pub downloaded: usize,
}

impl FetchOutcome {
    /// Sort records by numeric node id so output never depends on fetch order.
    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| numeric_order(&a.code_id, &b.code_id));
        self.failed.sort_by(|a, b| numeric_order(a, b));
    }
}

fn numeric_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
