use crate::error::{Result, ScanError};
use crate::page::parse_node_html;
use crate::result::FetchOutcome;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://taxonomy.nucc.org/";

/// Called with `(completed, total)` as node pages finish downloading.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// On-disk cache of node page HTML, one file per node.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
    max_age: Duration,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, node_id: &str) -> PathBuf {
        self.dir.join(format!("node_{}.html", node_id))
    }

    /// A cached page is fresh when it was written less than `max_age` ago.
    pub fn is_fresh(&self, node_id: &str) -> bool {
        let Ok(modified) = fs::metadata(self.path_for(node_id)).and_then(|m| m.modified()) else {
            return false;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.max_age,
            // mtime in the future: treat as just written
            Err(_) => true,
        }
    }

    pub fn load(&self, node_id: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path_for(node_id))?)
    }

    pub fn store(&self, node_id: &str, html: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(node_id), html)?;
        Ok(())
    }
}

pub struct TaxonomyClient {
    client: Client,
    base_url: Url,
    request_delay: Option<Duration>,
}

impl TaxonomyClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, 30)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent("taxon/0.1 (taxonomy reconciliation)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            base_url,
            request_delay: None,
        })
    }

    /// Pause before every node request to keep load on the site low.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the landing page that embeds the `treenodes` array.
    pub async fn fetch_tree_html(&self) -> Result<String> {
        info!("Fetching taxonomy tree from {}", self.base_url);
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        info!("Fetched tree page ({} characters)", body.len());
        Ok(body)
    }

    fn node_url(&self, node_id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("Default/GetContentByItemId/{}", node_id))
            .map_err(|e| ScanError::InvalidUrl(format!("node {}: {}", node_id, e)))
    }

    /// Fetch the HTML fragment describing one node.
    pub async fn fetch_partial_view(&self, node_id: &str) -> Result<String> {
        if let Some(delay) = self.request_delay {
            tokio::time::sleep(delay).await;
        }
        let url = self.node_url(node_id)?;
        debug!("Fetching {}", url);

        let payload: serde_json::Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        payload
            .get("PartialViewHtml")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ScanError::MissingPartialView {
                node_id: node_id.to_string(),
            })
    }

    /// Fetch and parse every node page, reusing fresh cached copies.
    ///
    /// Failures are collected in [`FetchOutcome::failed`]; they never abort
    /// the batch.
    pub async fn fetch_nodes(
        &self,
        node_ids: &[String],
        cache: &PageCache,
        workers: usize,
        progress: Option<ProgressCallback>,
    ) -> FetchOutcome {
        let (fresh, mut stale): (Vec<String>, Vec<String>) =
            node_ids.iter().cloned().partition(|id| cache.is_fresh(id));
        info!(
            "Found {} fresh cached pages, {} stale or missing",
            fresh.len(),
            stale.len()
        );

        let mut outcome = FetchOutcome::default();

        for node_id in fresh {
            let parsed = cache
                .load(&node_id)
                .and_then(|html| parse_node_html(&node_id, &html));
            match parsed {
                Ok(record) => {
                    outcome.records.push(record);
                    outcome.cached += 1;
                }
                Err(e) => {
                    warn!("Cached page for node {} unusable ({}), downloading", node_id, e);
                    stale.push(node_id);
                }
            }
        }

        let total = stale.len();
        let completed = AtomicUsize::new(0);

        let fetched: Vec<(String, Result<String>)> = stream::iter(stale)
            .map(|node_id| async move {
                let html = self.fetch_partial_view(&node_id).await;
                (node_id, html)
            })
            .buffer_unordered(workers.max(1))
            .inspect(|_| {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(ref callback) = progress {
                    callback(done, total);
                }
            })
            .collect()
            .await;

        for (node_id, html) in fetched {
            let html = match html {
                Ok(html) => html,
                Err(e) => {
                    warn!("Error downloading node {}: {}", node_id, e);
                    outcome.failed.push(node_id);
                    continue;
                }
            };
            if let Err(e) = cache.store(&node_id, &html) {
                warn!("Could not cache node {}: {}", node_id, e);
            }
            match parse_node_html(&node_id, &html) {
                Ok(record) => {
                    outcome.records.push(record);
                    outcome.downloaded += 1;
                }
                Err(e) => {
                    warn!("Error parsing node {}: {}", node_id, e);
                    outcome.failed.push(node_id);
                }
            }
        }

        outcome.sort();
        info!(
            "Processed {} nodes ({} cached, {} downloaded, {} failed)",
            outcome.records.len(),
            outcome.cached,
            outcome.downloaded,
            outcome.failed.len()
        );
        outcome
    }
}
