use crate::error::{Result, ScanError};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One entry of the site's `treenodes` array.
///
/// `id` stays optional so a malformed entry survives parsing and can be
/// rejected by the closure builder with its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "pId", default)]
    pub p_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parse a bare JSON array of tree nodes.
pub fn parse_tree_json(text: &str) -> Result<Vec<TreeNode>> {
    let nodes: Vec<TreeNode> = serde_json::from_str(text)?;
    Ok(nodes)
}

/// Extract the `var treenodes = [...]` array embedded in the landing page.
pub fn extract_tree_nodes(html: &str) -> Result<Vec<TreeNode>> {
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script")
        .map_err(|e| ScanError::ParseError(format!("bad selector: {}", e)))?;
    let pattern = Regex::new(r"(?s)var treenodes = (\[.*?\]);")
        .map_err(|e| ScanError::ParseError(e.to_string()))?;

    for script in document.select(&script_selector) {
        let text: String = script.text().collect();
        if !text.contains("var treenodes") {
            continue;
        }
        debug!("Found treenodes variable in script block");

        let Some(captures) = pattern.captures(&text) else {
            continue;
        };
        match parse_tree_json(&captures[1]) {
            Ok(nodes) => {
                info!("Parsed {} tree nodes", nodes.len());
                return Ok(nodes);
            }
            Err(e) => {
                warn!("Error parsing treenodes JSON: {}", e);
                continue;
            }
        }
    }

    Err(ScanError::ParseError(
        "Could not find or parse treenodes data in HTML".to_string(),
    ))
}

/// Accept either a landing page or a raw JSON array.
pub fn parse_tree_source(text: &str) -> Result<Vec<TreeNode>> {
    if text.trim_start().starts_with('[') {
        parse_tree_json(text)
    } else {
        extract_tree_nodes(text)
    }
}
