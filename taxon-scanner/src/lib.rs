pub mod error;
pub mod fetcher;
pub mod page;
pub mod result;
pub mod tree;

pub use error::ScanError;
pub use fetcher::{PageCache, ProgressCallback, TaxonomyClient};
pub use page::parse_node_html;
pub use result::{FetchOutcome, NodeRecord};
pub use tree::{TreeNode, extract_tree_nodes, parse_tree_json, parse_tree_source};
