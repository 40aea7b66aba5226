use crate::closure::IMMEDIATE_PARENT_COLUMN;
use crate::error::{CoreError, Result};
use crate::table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taxon_scanner::result::STANDARD_FIELDS;
use taxon_scanner::{
    FetchOutcome, NodeRecord, PageCache, ProgressCallback, TaxonomyClient, TreeNode,
    parse_tree_source,
};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the tree comes from: the live landing page or a saved copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
    Url(String),
    File(PathBuf),
}

/// Options for fetching node pages
pub struct NodeFetchOptions {
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub max_age: Duration,
    pub workers: usize,
    pub timeout_secs: u64,
    pub show_progress_bars: bool,
}

impl NodeFetchOptions {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            max_age: DEFAULT_MAX_AGE,
            workers: DEFAULT_WORKERS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            show_progress_bars: false,
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Load tree nodes from the landing page or a local HTML/JSON file.
pub async fn load_tree(source: &TreeSource, timeout_secs: u64) -> Result<Vec<TreeNode>> {
    let text = match source {
        TreeSource::Url(url) => {
            let client = TaxonomyClient::with_timeout(url, timeout_secs)?;
            client.fetch_tree_html().await?
        }
        TreeSource::File(path) => {
            if !path.exists() {
                return Err(CoreError::FileNotFound(path.clone()));
            }
            std::fs::read_to_string(path)?
        }
    };
    Ok(parse_tree_source(&text)?)
}

/// Fetch every node page with a progress bar, returning records in id order.
pub async fn execute_node_fetch(
    options: &NodeFetchOptions,
    node_ids: &[String],
) -> Result<FetchOutcome> {
    let client = TaxonomyClient::with_timeout(&options.base_url, options.timeout_secs)?;
    let cache = PageCache::new(&options.cache_dir, options.max_age);

    let progress_bar = options
        .show_progress_bars
        .then(|| Arc::new(spinner("Checking page cache...")));

    let callback: Option<ProgressCallback> = progress_bar.clone().map(|pb| {
        Arc::new(move |done: usize, total: usize| {
            pb.set_message(format!("Downloading node pages... {}/{}", done, total));
        }) as ProgressCallback
    });

    let outcome = client
        .fetch_nodes(node_ids, &cache, options.workers, callback)
        .await;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Fetch complete! {} nodes ({} cached, {} downloaded, {} failed)",
            outcome.records.len(),
            outcome.cached,
            outcome.downloaded,
            outcome.failed.len()
        ));
    }

    Ok(outcome)
}

/// Tabulate node records: standard columns, the immediate parent, then
/// every other field sorted by name.
pub fn records_to_table(records: &[NodeRecord], parents: &BTreeMap<i64, i64>) -> Table {
    let dynamic: BTreeSet<&str> = records.iter().flat_map(|r| r.dynamic_fields()).collect();

    let mut headers: Vec<&str> = STANDARD_FIELDS.to_vec();
    headers.push(IMMEDIATE_PARENT_COLUMN);
    headers.extend(dynamic.iter().copied());

    let mut table = Table::new(headers.iter().copied());
    for record in records {
        let parent = record
            .code_id
            .parse::<i64>()
            .ok()
            .and_then(|id| parents.get(&id))
            .map(i64::to_string)
            .unwrap_or_default();

        let row: Vec<String> = headers
            .iter()
            .map(|&column| {
                if column == IMMEDIATE_PARENT_COLUMN {
                    parent.clone()
                } else {
                    record.field(column).unwrap_or_default().to_string()
                }
            })
            .collect();
        table.push_strings(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_to_table_column_order() {
        let mut leaf = NodeRecord::new("2500");
        leaf.code_text = "261QA1903X".to_string();
        leaf.extra.insert("Grouping".to_string(), "Clinics".to_string());
        let mut group = NodeRecord::new("2496");
        group.deactivation_date = Some("12/31/2030".to_string());

        let parents = BTreeMap::from([(2500, 2496), (2496, 14)]);
        let table = records_to_table(&[group, leaf], &parents);

        let headers = table.headers();
        assert_eq!(&headers[..8], &STANDARD_FIELDS[..]);
        assert_eq!(headers[8], IMMEDIATE_PARENT_COLUMN);
        assert_eq!(&headers[9..], ["Grouping", "deactivation_date"]);

        assert_eq!(table.get(0, IMMEDIATE_PARENT_COLUMN), Some("14"));
        assert_eq!(table.get(0, "Grouping"), None);
        assert_eq!(table.get(1, "Grouping"), Some("Clinics"));
        assert_eq!(table.get(1, "code_text"), Some("261QA1903X"));
    }
}
