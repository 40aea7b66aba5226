use serde::{Deserialize, Serialize};
use taxon_scanner::TreeNode;

/// Parent pointer value that marks a top-level node.
pub const ROOT_PARENT: i64 = 0;

/// Node ids the taxonomy site uses for comment entries rather than categories.
pub const NUCC_EXCLUDED_IDS: [i64; 3] = [5, 2712, 2714];

/// Minimal node shape the closure builder works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    pub node_id: Option<i64>,
    pub parent_id: i64,
}

impl RawNode {
    pub fn new(node_id: i64, parent_id: i64) -> Self {
        Self {
            node_id: Some(node_id),
            parent_id,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }
}

impl From<&TreeNode> for RawNode {
    fn from(node: &TreeNode) -> Self {
        Self {
            node_id: node.id,
            parent_id: node.p_id,
        }
    }
}

pub fn raw_nodes(tree: &[TreeNode]) -> Vec<RawNode> {
    tree.iter().map(RawNode::from).collect()
}
