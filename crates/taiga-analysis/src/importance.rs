//! Mean-Decrease-Impurity feature importance.

use std::collections::BTreeMap;

use tracing::instrument;

use taiga_forest::{FeatureId, Model, TaskId, TreeId, TreeNode};

use crate::error::AnalysisError;

/// A ranked feature with its MDI importance score.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedFeature {
    /// The feature number.
    pub feature: FeatureId,
    /// Summed `impurity_reduction × support` over the task's branch nodes
    /// using this feature, divided by the task's tree count.
    pub importance: f64,
    /// How many branch nodes split on this feature.
    pub usage_count: usize,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Per-task feature importances, ranked descending.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TaskImportance {
    /// The task the ranking belongs to.
    pub task: TaskId,
    /// Features ranked descending by importance.
    pub features: Vec<RankedFeature>,
}

/// Compute Mean-Decrease-Impurity importances from a persisted model.
///
/// # Errors
///
/// Returns decode errors from the model.
pub fn feature_importance(model: &Model) -> Result<Vec<TaskImportance>, AnalysisError> {
    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    Ok(node_table_importance(&nodes))
}

/// Compute Mean-Decrease-Impurity importances from a node table.
///
/// Per feature: `Σ impurity_reduction × support` over the branch nodes that
/// split on it, divided by the task's tree count. Leaves contribute nothing;
/// degenerate splits carry zero reduction, so they contribute nothing
/// either, but they do not count as usage.
#[instrument(skip_all, fields(nodes = nodes.len()))]
#[must_use]
pub fn node_table_importance(nodes: &[TreeNode]) -> Vec<TaskImportance> {
    let mut trees_by_task: BTreeMap<TaskId, Vec<TreeId>> = BTreeMap::new();
    let mut totals: BTreeMap<TaskId, BTreeMap<FeatureId, (f64, usize)>> = BTreeMap::new();

    for node in nodes {
        let trees = trees_by_task.entry(node.task).or_default();
        if !trees.contains(&node.tree) {
            trees.push(node.tree);
        }
        if node.is_leaf() || node.is_degenerate() {
            continue;
        }
        let entry = totals
            .entry(node.task)
            .or_default()
            .entry(node.split_feature)
            .or_insert((0.0, 0));
        entry.0 += node.impurity_reduction * node.support as f64;
        entry.1 += 1;
    }

    trees_by_task
        .into_iter()
        .map(|(task, trees)| {
            let tree_count = trees.len() as f64;
            let mut features: Vec<RankedFeature> = totals
                .remove(&task)
                .unwrap_or_default()
                .into_iter()
                .map(|(feature, (total, usage_count))| RankedFeature {
                    feature,
                    importance: total / tree_count,
                    usage_count,
                    rank: 0, // assigned after sorting
                })
                .collect();

            features.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            for (i, feature) in features.iter_mut().enumerate() {
                feature.rank = i + 1;
            }

            TaskImportance { task, features }
        })
        .collect()
}
