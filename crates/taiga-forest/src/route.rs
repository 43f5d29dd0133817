//! Leaf routing: feature vectors through a persisted forest.

use std::collections::{BTreeMap, HashMap};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::codec::Model;
use crate::error::{DataError, ForestError, IntegrityError, RoutingError};
use crate::ids::{FeatureId, NodeId, RecordId, TaskId, TreeId};
use crate::node::{TreeNode, group_by_tree};
use crate::rows::FeatureRow;

/// One routed point: the leaf a record reaches in one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafAssignment {
    /// Task of the routed record.
    pub task: TaskId,
    /// The routed record.
    pub record: RecordId,
    /// The tree the record was routed through.
    pub tree: TreeId,
    /// The terminal node reached.
    pub leaf: TreeNode,
}

/// Route feature rows through a persisted model.
///
/// # Errors
///
/// Decode errors from the model plus everything [`route_nodes`] returns.
#[instrument(skip_all, fields(rows = features.len()))]
pub fn route_model(model: &Model, features: &[FeatureRow]) -> Result<Vec<LeafAssignment>, ForestError> {
    let nodes = model.decode_nodes()?;
    route_nodes(&nodes, features)
}

/// Route feature rows through a node table to their leaves.
///
/// Every (task, record) point starts at the root of each of its task's
/// trees; each round advances the whole frontier one level together, so all
/// active points of a round are processed as one batch. Trees run in
/// parallel. A root that is itself a leaf is returned immediately.
///
/// Branch evaluation: a degenerate split always descends left; an ordinal
/// split descends left iff `value <= split_value`; a categorical split
/// descends left iff `value == split_value`.
///
/// # Errors
///
/// | Variant | When |
/// |---|---|
/// | [`DataError`] | malformed feature rows (reserved feature, duplicates, non-finite) |
/// | [`RoutingError::UnknownTask`] | a point's task has no trees in the table |
/// | [`RoutingError::MissingFeatureValue`] | a point lacks a value for a split feature |
/// | [`IntegrityError::MissingRoot`] | a tree has no root node |
/// | [`IntegrityError::OrphanedChild`] | a branch references a child that does not exist |
pub fn route_nodes(
    nodes: &[TreeNode],
    features: &[FeatureRow],
) -> Result<Vec<LeafAssignment>, ForestError> {
    let points = assemble_points(features)?;
    let trees = group_by_tree(nodes);

    let known_tasks: Vec<TaskId> = trees.keys().map(|(task, _)| *task).collect();
    for (task, _) in points.keys() {
        if !known_tasks.contains(task) {
            return Err(RoutingError::UnknownTask { task: *task }.into());
        }
    }

    let groups: Vec<((TaskId, TreeId), &Vec<&TreeNode>)> =
        trees.iter().map(|(key, group)| (*key, group)).collect();
    let mut assignments: Vec<LeafAssignment> = groups
        .into_par_iter()
        .map(|((task, tree), tree_nodes)| route_tree(task, tree, tree_nodes, &points))
        .collect::<Result<Vec<Vec<LeafAssignment>>, ForestError>>()?
        .into_iter()
        .flatten()
        .collect();

    assignments.sort_by_key(|a| (a.task, a.record, a.tree));
    debug!(assignments = assignments.len(), "routing complete");
    Ok(assignments)
}

type PointMap = BTreeMap<(TaskId, RecordId), HashMap<FeatureId, f64>>;

/// Collect feature rows into per-(task, record) value maps.
fn assemble_points(features: &[FeatureRow]) -> Result<PointMap, DataError> {
    let mut points: PointMap = BTreeMap::new();
    for row in features {
        if row.feature.is_sentinel() {
            return Err(DataError::SentinelFeature {
                task: row.task,
                record: row.record,
            });
        }
        if !row.value.is_finite() {
            return Err(DataError::NonFiniteFeature {
                task: row.task,
                record: row.record,
                feature: row.feature,
            });
        }
        let previous = points
            .entry((row.task, row.record))
            .or_default()
            .insert(row.feature, row.value);
        if previous.is_some() {
            return Err(DataError::DuplicateFeatureCell {
                task: row.task,
                record: row.record,
                feature: row.feature,
            });
        }
    }
    Ok(points)
}

/// Route every point of one task through one tree.
fn route_tree(
    task: TaskId,
    tree: TreeId,
    tree_nodes: &[&TreeNode],
    points: &PointMap,
) -> Result<Vec<LeafAssignment>, ForestError> {
    let index: HashMap<(u32, NodeId), &TreeNode> = tree_nodes
        .iter()
        .map(|n| ((n.level, n.node_id), *n))
        .collect();

    let root = *index
        .get(&(1, NodeId::ROOT))
        .filter(|n| n.parent_id.is_null())
        .ok_or(IntegrityError::MissingRoot { task, tree })?;

    let mut frontier: Vec<(RecordId, &HashMap<FeatureId, f64>, &TreeNode)> = points
        .iter()
        .filter(|((point_task, _), _)| *point_task == task)
        .map(|((_, record), values)| (*record, values, root))
        .collect();

    let mut out = Vec::with_capacity(frontier.len());
    while !frontier.is_empty() {
        let mut next = Vec::with_capacity(frontier.len());
        for (record, values, node) in frontier {
            if node.is_leaf() {
                out.push(LeafAssignment {
                    task,
                    record,
                    tree,
                    leaf: node.clone(),
                });
                continue;
            }
            let go_left = if node.is_degenerate() {
                true
            } else {
                let value =
                    values
                        .get(&node.split_feature)
                        .ok_or(RoutingError::MissingFeatureValue {
                            task,
                            record,
                            feature: node.split_feature,
                        })?;
                if node.is_ordinal {
                    *value <= node.split_value
                } else {
                    *value == node.split_value
                }
            };
            let child_id = if go_left {
                node.node_id.left_child()
            } else {
                node.node_id.right_child()
            };
            let child =
                *index
                    .get(&(node.level + 1, child_id))
                    .ok_or(IntegrityError::OrphanedChild {
                        task,
                        tree,
                        level: node.level,
                        node: node.node_id,
                    })?;
            next.push((record, values, child));
        }
        frontier = next;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::DEGENERATE_SPLIT;

    fn node(
        tree: u32,
        level: u32,
        node_id: u64,
        parent_id: u64,
        is_left: bool,
        split_feature: u32,
        split_value: f64,
        leaf_value: f64,
    ) -> TreeNode {
        TreeNode {
            task: TaskId::new(1),
            tree: TreeId::new(tree),
            level,
            node_id: NodeId::new(node_id),
            parent_id: NodeId::new(parent_id),
            is_left,
            split_feature: FeatureId::new(split_feature),
            split_value,
            is_ordinal: true,
            leaf_value,
            support: 1,
            impurity_reduction: 0.0,
        }
    }

    fn point(record: u64, feature: u32, value: f64) -> FeatureRow {
        FeatureRow {
            task: TaskId::new(1),
            record: RecordId::new(record),
            feature: FeatureId::new(feature),
            value,
        }
    }

    /// Root splits on feature 1 at 5.0; leaves predict -1 (left) and 1 (right).
    fn stump() -> Vec<TreeNode> {
        vec![
            node(1, 1, 1, 0, false, 1, 5.0, 0.0),
            node(1, 2, 1, 1, true, 0, 0.0, -1.0),
            node(1, 2, 2, 1, false, 0, 0.0, 1.0),
        ]
    }

    #[test]
    fn ordinal_routing_left_and_right() {
        let rows = vec![point(1, 1, 3.0), point(2, 1, 7.0), point(3, 1, 5.0)];
        let assignments = route_nodes(&stump(), &rows).unwrap();
        assert_eq!(assignments.len(), 3);
        // Boundary value routes left (<=).
        assert_eq!(assignments[0].leaf.leaf_value, -1.0);
        assert_eq!(assignments[1].leaf.leaf_value, 1.0);
        assert_eq!(assignments[2].leaf.leaf_value, -1.0);
    }

    #[test]
    fn categorical_routing_matches_equality() {
        let mut nodes = stump();
        nodes[0].is_ordinal = false;
        let rows = vec![point(1, 1, 5.0), point(2, 1, 4.9)];
        let assignments = route_nodes(&nodes, &rows).unwrap();
        assert_eq!(assignments[0].leaf.leaf_value, -1.0);
        assert_eq!(assignments[1].leaf.leaf_value, 1.0);
    }

    #[test]
    fn leaf_root_returns_immediately() {
        let nodes = vec![node(1, 1, 1, 0, false, 0, 0.0, 42.0)];
        let rows = vec![point(1, 1, 0.0)];
        let assignments = route_nodes(&nodes, &rows).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].leaf.leaf_value, 42.0);
    }

    #[test]
    fn degenerate_always_descends_left() {
        let nodes = vec![
            node(1, 1, 1, 0, false, 1, DEGENERATE_SPLIT, 0.0),
            node(1, 2, 1, 1, true, 0, 0.0, 9.0),
        ];
        // Value far above any threshold still goes left.
        let rows = vec![point(1, 1, 1e9)];
        let assignments = route_nodes(&nodes, &rows).unwrap();
        assert_eq!(assignments[0].leaf.leaf_value, 9.0);
    }

    #[test]
    fn routes_multiple_trees_per_point() {
        let mut nodes = stump();
        let mut second: Vec<TreeNode> = stump()
            .into_iter()
            .map(|mut n| {
                n.tree = TreeId::new(2);
                n
            })
            .collect();
        nodes.append(&mut second);
        let rows = vec![point(1, 1, 3.0)];
        let assignments = route_nodes(&nodes, &rows).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].tree, TreeId::new(1));
        assert_eq!(assignments[1].tree, TreeId::new(2));
    }

    #[test]
    fn missing_feature_value_error() {
        let rows = vec![point(1, 2, 3.0)];
        let err = route_nodes(&stump(), &rows).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Routing(RoutingError::MissingFeatureValue { .. })
        ));
    }

    #[test]
    fn unknown_task_error() {
        let rows = vec![FeatureRow {
            task: TaskId::new(9),
            record: RecordId::new(1),
            feature: FeatureId::new(1),
            value: 0.0,
        }];
        let err = route_nodes(&stump(), &rows).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Routing(RoutingError::UnknownTask { .. })
        ));
    }

    #[test]
    fn orphaned_child_error() {
        // Branch root with no children at all.
        let nodes = vec![node(1, 1, 1, 0, false, 1, 5.0, 0.0)];
        let rows = vec![point(1, 1, 3.0)];
        let err = route_nodes(&nodes, &rows).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Integrity(IntegrityError::OrphanedChild { .. })
        ));
    }

    #[test]
    fn missing_root_error() {
        let nodes = vec![node(1, 2, 1, 1, true, 0, 0.0, 1.0)];
        let rows = vec![point(1, 1, 3.0)];
        let err = route_nodes(&nodes, &rows).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Integrity(IntegrityError::MissingRoot { .. })
        ));
    }
}
