//! Decision-path extraction: root-to-leaf node sequences per point and tree.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use taiga_forest::{
    FeatureRow, Model, RecordId, TaskId, TreeId, TreeLinkage, TreeNode, group_by_tree,
    route_nodes,
};

use crate::error::AnalysisError;

/// The ordered unique-id path a record takes through one tree, root to leaf
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPath {
    /// Task of the routed record.
    pub task: TaskId,
    /// The routed record.
    pub record: RecordId,
    /// The tree the record was routed through.
    pub tree: TreeId,
    /// Tree-scoped unique node ids from the root to the leaf.
    pub nodes: Vec<u64>,
}

/// Extract decision paths for every point of one task from a persisted model.
///
/// # Errors
///
/// Decode errors from the model plus everything [`decision_paths_nodes`]
/// returns.
pub fn decision_paths(
    model: &Model,
    task: TaskId,
    features: &[FeatureRow],
) -> Result<Vec<DecisionPath>, AnalysisError> {
    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    decision_paths_nodes(&nodes, task, features)
}

/// Extract decision paths from a node table.
///
/// Feature rows of other tasks are ignored; every remaining point is routed
/// through each of the task's trees, and the leaf's ancestor chain is read
/// off the tree's unique-id linkage.
///
/// # Errors
///
/// | Variant | When |
/// |---|---|
/// | [`AnalysisError::UnknownTask`] | the task has no trees in the table |
/// | [`AnalysisError::Forest`] | linkage or routing fails |
#[instrument(skip_all, fields(task = %task, rows = features.len()))]
pub fn decision_paths_nodes(
    nodes: &[TreeNode],
    task: TaskId,
    features: &[FeatureRow],
) -> Result<Vec<DecisionPath>, AnalysisError> {
    let task_nodes: Vec<TreeNode> = nodes.iter().filter(|n| n.task == task).cloned().collect();
    if task_nodes.is_empty() {
        return Err(AnalysisError::UnknownTask { task });
    }

    let mut linkages: BTreeMap<TreeId, TreeLinkage> = BTreeMap::new();
    for ((_, tree), tree_nodes) in group_by_tree(&task_nodes) {
        linkages.insert(
            tree,
            TreeLinkage::build(task, tree, &tree_nodes)
                .map_err(taiga_forest::ForestError::from)?,
        );
    }

    let task_features: Vec<FeatureRow> = features
        .iter()
        .filter(|r| r.task == task)
        .copied()
        .collect();
    let assignments =
        route_nodes(&task_nodes, &task_features).map_err(taiga_forest::ForestError::from)?;

    let paths: Vec<DecisionPath> = assignments
        .iter()
        .map(|a| {
            let linkage = &linkages[&a.tree];
            let uid = linkage
                .uid_of(a.leaf.level, a.leaf.node_id)
                .expect("routed leaves come from the same node table");
            DecisionPath {
                task,
                record: a.record,
                tree: a.tree,
                nodes: linkage.ancestor_path(uid),
            }
        })
        .collect();

    debug!(paths = paths.len(), "decision paths extracted");
    Ok(paths)
}
