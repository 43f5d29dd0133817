//! Structural statistics for persisted forests.

use std::collections::BTreeMap;

use tracing::instrument;

use taiga_forest::{Model, TaskId, TreeId, TreeNode};

use crate::error::AnalysisError;

/// Structural statistics for one task's forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskStats {
    /// The task these statistics describe.
    pub task: TaskId,
    /// Number of trees.
    pub n_trees: usize,
    /// Shallowest tree depth (a root-only tree has depth 1).
    pub min_depth: u32,
    /// Deepest tree depth.
    pub max_depth: u32,
    /// Mean tree depth.
    pub avg_depth: f64,
    /// Smallest per-tree node count.
    pub min_nodes: usize,
    /// Largest per-tree node count.
    pub max_nodes: usize,
    /// Mean per-tree node count.
    pub avg_nodes: f64,
    /// Total node count across trees.
    pub total_nodes: usize,
    /// Total leaf count across trees.
    pub n_leaves: usize,
    /// Shallowest leaf level.
    pub min_leaf_depth: u32,
    /// Deepest leaf level.
    pub max_leaf_depth: u32,
    /// Mean leaf level.
    pub avg_leaf_depth: f64,
    /// Summed support over all leaves.
    pub total_leaf_support: u64,
}

/// Compute per-task structural statistics from a persisted model.
///
/// # Errors
///
/// Returns decode errors from the model.
pub fn model_stats(model: &Model) -> Result<Vec<TaskStats>, AnalysisError> {
    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    Ok(node_table_stats(&nodes))
}

/// Compute per-task structural statistics from a node table.
///
/// Returns one entry per task, ordered by task id. Depth is the deepest
/// level a tree reaches, so a root-only tree has depth 1.
#[instrument(skip_all, fields(nodes = nodes.len()))]
#[must_use]
pub fn node_table_stats(nodes: &[TreeNode]) -> Vec<TaskStats> {
    let mut by_task: BTreeMap<TaskId, Vec<&TreeNode>> = BTreeMap::new();
    for node in nodes {
        by_task.entry(node.task).or_default().push(node);
    }

    by_task
        .into_iter()
        .map(|(task, task_nodes)| {
            let mut depth_by_tree: BTreeMap<TreeId, u32> = BTreeMap::new();
            let mut count_by_tree: BTreeMap<TreeId, usize> = BTreeMap::new();
            let mut n_leaves = 0usize;
            let mut leaf_depth_sum = 0u64;
            let mut min_leaf_depth = u32::MAX;
            let mut max_leaf_depth = 0u32;
            let mut total_leaf_support = 0u64;

            for node in &task_nodes {
                let depth = depth_by_tree.entry(node.tree).or_insert(0);
                *depth = (*depth).max(node.level);
                *count_by_tree.entry(node.tree).or_insert(0) += 1;

                if node.is_leaf() {
                    n_leaves += 1;
                    leaf_depth_sum += u64::from(node.level);
                    min_leaf_depth = min_leaf_depth.min(node.level);
                    max_leaf_depth = max_leaf_depth.max(node.level);
                    total_leaf_support += node.support;
                }
            }

            let n_trees = depth_by_tree.len();
            let depth_sum: u64 = depth_by_tree.values().map(|&d| u64::from(d)).sum();
            let total_nodes = task_nodes.len();

            TaskStats {
                task,
                n_trees,
                min_depth: depth_by_tree.values().copied().min().unwrap_or(0),
                max_depth: depth_by_tree.values().copied().max().unwrap_or(0),
                avg_depth: depth_sum as f64 / n_trees as f64,
                min_nodes: count_by_tree.values().copied().min().unwrap_or(0),
                max_nodes: count_by_tree.values().copied().max().unwrap_or(0),
                avg_nodes: total_nodes as f64 / n_trees as f64,
                total_nodes,
                n_leaves,
                min_leaf_depth: if n_leaves == 0 { 0 } else { min_leaf_depth },
                max_leaf_depth,
                avg_leaf_depth: if n_leaves == 0 {
                    0.0
                } else {
                    leaf_depth_sum as f64 / n_leaves as f64
                },
                total_leaf_support,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taiga_forest::{FeatureId, NodeId};

    fn node(
        task: u32,
        tree: u32,
        level: u32,
        node_id: u64,
        split_feature: u32,
        support: u64,
    ) -> TreeNode {
        TreeNode {
            task: TaskId::new(task),
            tree: TreeId::new(tree),
            level,
            node_id: NodeId::new(node_id),
            parent_id: if level == 1 {
                NodeId::NULL
            } else {
                NodeId::ROOT
            },
            is_left: false,
            split_feature: FeatureId::new(split_feature),
            split_value: 1.0,
            is_ordinal: true,
            leaf_value: 0.0,
            support,
            impurity_reduction: 0.0,
        }
    }

    /// Task 1: a 3-node stump (depth 2) and a root-only leaf (depth 1).
    fn table() -> Vec<TreeNode> {
        vec![
            node(1, 1, 1, 1, 5, 10),
            node(1, 1, 2, 1, 0, 4),
            node(1, 1, 2, 2, 0, 6),
            node(1, 2, 1, 1, 0, 10),
        ]
    }

    #[test]
    fn counts_trees_nodes_and_leaves() {
        let stats = node_table_stats(&table());
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.n_trees, 2);
        assert_eq!(s.total_nodes, 4);
        assert_eq!(s.min_nodes, 1);
        assert_eq!(s.max_nodes, 3);
        assert!((s.avg_nodes - 2.0).abs() < 1e-12);
        assert_eq!(s.n_leaves, 3);
    }

    #[test]
    fn depth_statistics() {
        let stats = node_table_stats(&table());
        let s = &stats[0];
        assert_eq!(s.min_depth, 1);
        assert_eq!(s.max_depth, 2);
        assert!((s.avg_depth - 1.5).abs() < 1e-12);
        assert_eq!(s.min_leaf_depth, 1);
        assert_eq!(s.max_leaf_depth, 2);
        assert!((s.avg_leaf_depth - (2.0 + 2.0 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn leaf_support_totals() {
        let stats = node_table_stats(&table());
        assert_eq!(stats[0].total_leaf_support, 4 + 6 + 10);
    }

    #[test]
    fn tasks_report_separately() {
        let mut nodes = table();
        nodes.push(node(2, 1, 1, 1, 0, 7));
        let stats = node_table_stats(&nodes);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].task, TaskId::new(1));
        assert_eq!(stats[1].task, TaskId::new(2));
        assert_eq!(stats[1].n_trees, 1);
        assert_eq!(stats[1].total_leaf_support, 7);
    }
}
