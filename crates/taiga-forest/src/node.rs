//! The immutable tree-node record.

use std::collections::BTreeMap;

use crate::ids::{FeatureId, NodeId, TaskId, TreeId};

/// Reserved split value marking a degenerate split.
///
/// A degenerate split is inserted during growth when every candidate feature
/// is constant at a node: it has a single left child and routes every input
/// to it. The compressor removes these nodes.
pub const DEGENERATE_SPLIT: f64 = f64::NEG_INFINITY;

/// One node of a decision tree.
///
/// Nodes are flat records so the whole forest serializes as a tagged numeric
/// table (see [`Model`](crate::Model)). A node is immutable once emitted:
/// compression produces an entirely new node set, never edits in place.
///
/// A node is a leaf iff `split_feature` is [`FeatureId::SENTINEL`]. The root
/// sits at level 1 with id [`NodeId::ROOT`] and parent [`NodeId::NULL`], and
/// `node_id` is unique within (task, tree, level) with children addressed by
/// the `2n-1`/`2n` rule.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeNode {
    /// Training task this node belongs to.
    pub task: TaskId,
    /// Tree within the task's forest.
    pub tree: TreeId,
    /// One-based tree level; the root is level 1.
    pub level: u32,
    /// Level-local node identifier.
    pub node_id: NodeId,
    /// Parent's node identifier at the previous level; null for the root.
    pub parent_id: NodeId,
    /// Whether this node is its parent's left child.
    pub is_left: bool,
    /// Split feature; the sentinel value 0 marks a leaf.
    pub split_feature: FeatureId,
    /// Split threshold (ordinal) or match value (categorical);
    /// [`DEGENERATE_SPLIT`] marks a degenerate split.
    pub split_value: f64,
    /// Whether the split feature is ordinal (`<=`) rather than categorical (`==`).
    pub is_ordinal: bool,
    /// Predicted value at a leaf; zero on branch nodes.
    pub leaf_value: f64,
    /// Number of training samples that reached this node.
    pub support: u64,
    /// Weighted impurity decrease contributed by this split; zero on leaves
    /// and degenerate splits.
    pub impurity_reduction: f64,
}

impl TreeNode {
    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.split_feature.is_sentinel()
    }

    /// Return `true` if this node is a degenerate split.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.is_leaf() && self.split_value == DEGENERATE_SPLIT
    }

    /// Canonical node-table ordering key: (task, tree, level, node id).
    #[must_use]
    pub fn sort_key(&self) -> (TaskId, TreeId, u32, NodeId) {
        (self.task, self.tree, self.level, self.node_id)
    }
}

/// Group a node table by (task, tree), preserving canonical order within each tree.
#[must_use]
pub fn group_by_tree(nodes: &[TreeNode]) -> BTreeMap<(TaskId, TreeId), Vec<&TreeNode>> {
    let mut groups: BTreeMap<(TaskId, TreeId), Vec<&TreeNode>> = BTreeMap::new();
    for node in nodes {
        groups.entry((node.task, node.tree)).or_default().push(node);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|n| (n.level, n.node_id));
    }
    groups
}
