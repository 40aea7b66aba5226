// Attributes for structural nodes that have no scraped code or labels

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const INDIVIDUAL: &str = "Individual or Groups (of Individuals)";
const NON_INDIVIDUAL: &str = "Non-individual";
const AMBULATORY: &str = "Ambulatory Health Care Facilities";
const PHYSICIANS: &str = "Allopathic & Osteopathic Physicians";
const BEHAVIORAL: &str = "Behavioral Health & Social Service Providers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementalEntry {
    pub node_id: i64,
    #[serde(default)]
    pub code: Option<String>,
    pub label: String,
    pub section: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplementalMapping {
    entries: BTreeMap<i64, SupplementalEntry>,
}

impl SupplementalMapping {
    pub fn new(entries: impl IntoIterator<Item = SupplementalEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.node_id, e)).collect(),
        }
    }

    pub fn nucc() -> Self {
        let entry = |node_id: i64, code: Option<&str>, label: &str, section: &str| SupplementalEntry {
            node_id,
            code: code.map(str::to_string),
            label: label.to_string(),
            section: section.to_string(),
        };

        Self::new([
            entry(14, None, AMBULATORY, NON_INDIVIDUAL),
            entry(1962, None, PHYSICIANS, INDIVIDUAL),
            entry(2293, None, BEHAVIORAL, INDIVIDUAL),
            entry(2496, Some("261Q00000X"), AMBULATORY, NON_INDIVIDUAL),
            entry(2588, Some("273100000X"), "Hospital Units", NON_INDIVIDUAL),
            entry(2477, Some("281P00000X"), "Hospitals", NON_INDIVIDUAL),
            entry(1974, Some("207N00000X"), PHYSICIANS, INDIVIDUAL),
            entry(2299, Some("101Y00000X"), BEHAVIORAL, INDIVIDUAL),
        ])
    }

    /// Load entries from a JSON array of `{node_id, code, label, section}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<SupplementalEntry> = serde_json::from_str(text)?;
        Ok(Self::new(entries))
    }

    pub fn get(&self, node_id: i64) -> Option<&SupplementalEntry> {
        self.entries.get(&node_id)
    }

    pub fn by_code(&self, code: &str) -> Option<&SupplementalEntry> {
        self.entries
            .values()
            .find(|e| e.code.as_deref() == Some(code))
    }

    pub fn entries(&self) -> impl Iterator<Item = &SupplementalEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nucc_defaults() {
        let mapping = SupplementalMapping::nucc();
        assert_eq!(mapping.len(), 8);
        assert_eq!(mapping.get(14).unwrap().code, None);
        assert_eq!(mapping.by_code("281P00000X").unwrap().node_id, 2477);
        assert_eq!(mapping.get(2588).unwrap().label, "Hospital Units");
    }

    #[test]
    fn test_from_json_defaults_missing_code() {
        let mapping = SupplementalMapping::from_json(
            r#"[{"node_id": 7, "label": "Group", "section": "Non-individual"}]"#,
        )
        .unwrap();
        assert_eq!(mapping.get(7).unwrap().code, None);
    }
}
