//! Level-by-level forest growth over an injected split strategy.

use tracing::{debug, instrument};

use crate::error::{ForestError, IntegrityError};
use crate::ids::{FeatureId, NodeId, TaskId, TreeId};
use crate::node::{DEGENERATE_SPLIT, TreeNode};
use crate::rows::TaskData;

/// A pending node: its skeleton plus the sample rows assigned to it.
///
/// `rows` are zero-based record positions into the node's [`TaskData`].
#[derive(Debug, Clone)]
pub struct ActiveNode<'a> {
    /// Task the node belongs to.
    pub task: TaskId,
    /// Tree the node belongs to.
    pub tree: TreeId,
    /// One-based level of the node.
    pub level: u32,
    /// Level-local node id.
    pub node_id: NodeId,
    /// Parent id at the previous level; null for a root.
    pub parent_id: NodeId,
    /// Whether the node is its parent's left child.
    pub is_left: bool,
    data: &'a TaskData,
    rows: Vec<usize>,
}

impl<'a> ActiveNode<'a> {
    /// Create the root seed of one tree with its bootstrap sample rows.
    #[must_use]
    pub fn root(data: &'a TaskData, tree: TreeId, rows: Vec<usize>) -> Self {
        Self {
            task: data.task(),
            tree,
            level: 1,
            node_id: NodeId::ROOT,
            parent_id: NodeId::NULL,
            is_left: false,
            data,
            rows,
        }
    }

    /// Return the task data the node's rows index into.
    #[must_use]
    pub fn data(&self) -> &'a TaskData {
        self.data
    }

    /// Return the node's sample rows (zero-based record positions).
    #[must_use]
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Iterate over the node's target values.
    pub fn target_values(&self) -> impl Iterator<Item = f64> + '_ {
        let targets = self.data.targets();
        self.rows.iter().map(move |&r| targets[r])
    }
}

/// What a split strategy decided for one active node.
#[derive(Debug, Clone)]
pub enum SplitDecision {
    /// The node terminates with the given predicted value.
    Leaf {
        /// Predicted value for samples reaching this node.
        value: f64,
    },
    /// The node splits; the engine derives both children.
    Split {
        /// Feature the split tests.
        feature: FeatureId,
        /// Threshold (ordinal) or match value (categorical).
        value: f64,
        /// Whether the split compares with `<=` rather than `==`.
        ordinal: bool,
        /// Weighted impurity decrease of the split.
        reduction: f64,
        /// Sample rows routed to the left child.
        left: Vec<usize>,
        /// Sample rows routed to the right child.
        right: Vec<usize>,
    },
    /// No candidate feature varied; all samples go to a single left child so
    /// a later round may draw different candidates.
    Degenerate {
        /// A candidate feature recorded on the placeholder split.
        feature: FeatureId,
    },
}

/// Pluggable split selection.
///
/// The growth loop is strategy-agnostic: the strategy only decides, per
/// active node, whether and how to split; the engine derives child identity
/// (`2n-1`/`2n`), emits the immutable nodes and enforces the structural
/// invariants.
pub trait SplitStrategy: Send + Sync {
    /// Decide one round. Must return exactly one decision per active node,
    /// in order.
    ///
    /// # Errors
    ///
    /// Implementations may fail on internal invariant violations; any error
    /// aborts the whole growth run.
    fn split_level(
        &self,
        active: &[ActiveNode<'_>],
        level: u32,
    ) -> Result<Vec<SplitDecision>, ForestError>;

    /// Predicted value for a node forced terminal by the depth ceiling.
    fn leaf_value(&self, node: &ActiveNode<'_>) -> f64;
}

/// Round-based tree expansion with a hard depth ceiling.
///
/// One round grows one tree level across every (task, tree) at once; the
/// round boundary is a barrier, and each round is a pure function of the
/// previous round's output. Termination is guaranteed: growth stops when no
/// active node remains or when `max_depth` rounds have run, whichever comes
/// first.
pub struct ForestGrowthEngine<'s> {
    strategy: &'s dyn SplitStrategy,
    max_depth: u32,
}

impl<'s> ForestGrowthEngine<'s> {
    /// Create an engine over the given strategy and depth ceiling.
    #[must_use]
    pub fn new(strategy: &'s dyn SplitStrategy, max_depth: u32) -> Self {
        Self {
            strategy,
            max_depth,
        }
    }

    /// Grow every tree from its root seed and return the full node table,
    /// ordered by (task, tree, level, node id).
    ///
    /// # Errors
    ///
    /// Returns [`IntegrityError`] variants when the strategy produces an
    /// inconsistent decision set (wrong count, lost or duplicated samples,
    /// sentinel split feature, one-sided split). These are fatal: a broken
    /// strategy cannot be retried into correctness.
    #[instrument(skip_all, fields(seeds = seeds.len(), max_depth = self.max_depth))]
    pub fn grow(&self, seeds: Vec<ActiveNode<'_>>) -> Result<Vec<TreeNode>, ForestError> {
        let mut emitted: Vec<TreeNode> = Vec::new();
        let mut active = seeds;
        let mut level = 1u32;

        while !active.is_empty() {
            let decisions = if level >= self.max_depth {
                // Depth ceiling: every survivor terminates this round.
                active
                    .iter()
                    .map(|node| SplitDecision::Leaf {
                        value: self.strategy.leaf_value(node),
                    })
                    .collect()
            } else {
                let decisions = self.strategy.split_level(&active, level)?;
                if decisions.len() != active.len() {
                    return Err(IntegrityError::DecisionCountMismatch {
                        expected: active.len(),
                        got: decisions.len(),
                    }
                    .into());
                }
                decisions
            };

            let mut next: Vec<ActiveNode<'_>> = Vec::new();
            for (node, decision) in active.into_iter().zip(decisions) {
                emit_node(node, decision, &mut emitted, &mut next)?;
            }

            debug!(level, emitted = emitted.len(), active = next.len(), "round complete");
            active = next;
            level += 1;
        }

        emitted.sort_by_key(TreeNode::sort_key);
        check_unique_ids(&emitted)?;
        Ok(emitted)
    }
}

/// Finalize one active node and queue its children.
fn emit_node<'a>(
    node: ActiveNode<'a>,
    decision: SplitDecision,
    emitted: &mut Vec<TreeNode>,
    next: &mut Vec<ActiveNode<'a>>,
) -> Result<(), ForestError> {
    let support = node.rows.len() as u64;
    let skeleton = TreeNode {
        task: node.task,
        tree: node.tree,
        level: node.level,
        node_id: node.node_id,
        parent_id: node.parent_id,
        is_left: node.is_left,
        split_feature: FeatureId::SENTINEL,
        split_value: 0.0,
        is_ordinal: true,
        leaf_value: 0.0,
        support,
        impurity_reduction: 0.0,
    };

    match decision {
        SplitDecision::Leaf { value } => {
            emitted.push(TreeNode {
                leaf_value: value,
                ..skeleton
            });
        }
        SplitDecision::Split {
            feature,
            value,
            ordinal,
            reduction,
            left,
            right,
        } => {
            if feature.is_sentinel() {
                return Err(IntegrityError::InvalidSplitFeature {
                    task: node.task,
                    tree: node.tree,
                    level: node.level,
                    node: node.node_id,
                }
                .into());
            }
            if !partitions(&node.rows, &left, &right) {
                return Err(IntegrityError::SampleConservation {
                    task: node.task,
                    tree: node.tree,
                    level: node.level,
                    node: node.node_id,
                }
                .into());
            }
            emitted.push(TreeNode {
                split_feature: feature,
                split_value: value,
                is_ordinal: ordinal,
                impurity_reduction: reduction,
                ..skeleton
            });
            next.push(ActiveNode {
                task: node.task,
                tree: node.tree,
                level: node.level + 1,
                node_id: node.node_id.left_child(),
                parent_id: node.node_id,
                is_left: true,
                data: node.data,
                rows: left,
            });
            next.push(ActiveNode {
                task: node.task,
                tree: node.tree,
                level: node.level + 1,
                node_id: node.node_id.right_child(),
                parent_id: node.node_id,
                is_left: false,
                data: node.data,
                rows: right,
            });
        }
        SplitDecision::Degenerate { feature } => {
            if feature.is_sentinel() {
                return Err(IntegrityError::InvalidSplitFeature {
                    task: node.task,
                    tree: node.tree,
                    level: node.level,
                    node: node.node_id,
                }
                .into());
            }
            emitted.push(TreeNode {
                split_feature: feature,
                split_value: DEGENERATE_SPLIT,
                ..skeleton
            });
            let rows = node.rows;
            next.push(ActiveNode {
                task: node.task,
                tree: node.tree,
                level: node.level + 1,
                node_id: node.node_id.left_child(),
                parent_id: node.node_id,
                is_left: true,
                data: node.data,
                rows,
            });
        }
    }
    Ok(())
}

/// Check that `left` and `right` form a two-sided partition of `rows`.
fn partitions(rows: &[usize], left: &[usize], right: &[usize]) -> bool {
    if left.is_empty() || right.is_empty() || left.len() + right.len() != rows.len() {
        return false;
    }
    let mut combined: Vec<usize> = left.iter().chain(right).copied().collect();
    combined.sort_unstable();
    let mut expected: Vec<usize> = rows.to_vec();
    expected.sort_unstable();
    combined == expected
}

/// Reject duplicate ids within any (task, tree, level) of a sorted table.
fn check_unique_ids(sorted: &[TreeNode]) -> Result<(), IntegrityError> {
    for pair in sorted.windows(2) {
        if pair[0].sort_key() == pair[1].sort_key() {
            return Err(IntegrityError::DuplicateNodeId {
                task: pair[0].task,
                tree: pair[0].tree,
                level: pair[0].level,
                node: pair[0].node_id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{FeatureRow, TargetRow, TrainingData};
    use crate::ids::RecordId;

    fn task_data() -> TaskData {
        let features = (1..=4u64)
            .map(|r| FeatureRow {
                task: TaskId::new(1),
                record: RecordId::new(r),
                feature: FeatureId::new(1),
                value: r as f64,
            })
            .collect();
        let targets = (1..=4u64)
            .map(|r| TargetRow {
                task: TaskId::new(1),
                record: RecordId::new(r),
                value: r as f64 * 10.0,
            })
            .collect();
        let mut tasks = TrainingData::new(features, targets).assemble().unwrap();
        tasks.remove(0)
    }

    /// Splits every node down the middle once, then terminates everything.
    struct HalvingStrategy;

    impl SplitStrategy for HalvingStrategy {
        fn split_level(
            &self,
            active: &[ActiveNode<'_>],
            level: u32,
        ) -> Result<Vec<SplitDecision>, ForestError> {
            Ok(active
                .iter()
                .map(|node| {
                    if level == 1 {
                        let rows = node.rows();
                        let mid = rows.len() / 2;
                        SplitDecision::Split {
                            feature: FeatureId::new(1),
                            value: 2.5,
                            ordinal: true,
                            reduction: 1.0,
                            left: rows[..mid].to_vec(),
                            right: rows[mid..].to_vec(),
                        }
                    } else {
                        SplitDecision::Leaf {
                            value: self.leaf_value(node),
                        }
                    }
                })
                .collect())
        }

        fn leaf_value(&self, node: &ActiveNode<'_>) -> f64 {
            let n = node.rows().len() as f64;
            node.target_values().sum::<f64>() / n
        }
    }

    /// Returns one decision too few.
    struct ShortStrategy;

    impl SplitStrategy for ShortStrategy {
        fn split_level(
            &self,
            _active: &[ActiveNode<'_>],
            _level: u32,
        ) -> Result<Vec<SplitDecision>, ForestError> {
            Ok(vec![])
        }

        fn leaf_value(&self, _node: &ActiveNode<'_>) -> f64 {
            0.0
        }
    }

    /// Drops a sample from the right side.
    struct LossyStrategy;

    impl SplitStrategy for LossyStrategy {
        fn split_level(
            &self,
            active: &[ActiveNode<'_>],
            _level: u32,
        ) -> Result<Vec<SplitDecision>, ForestError> {
            Ok(active
                .iter()
                .map(|node| {
                    let rows = node.rows();
                    SplitDecision::Split {
                        feature: FeatureId::new(1),
                        value: 0.0,
                        ordinal: true,
                        reduction: 0.0,
                        left: rows[..1].to_vec(),
                        right: rows[2..].to_vec(),
                    }
                })
                .collect())
        }

        fn leaf_value(&self, _node: &ActiveNode<'_>) -> f64 {
            0.0
        }
    }

    fn seeds(data: &TaskData) -> Vec<ActiveNode<'_>> {
        vec![ActiveNode::root(data, TreeId::new(1), vec![0, 1, 2, 3])]
    }

    #[test]
    fn grows_one_split_and_two_leaves() {
        let data = task_data();
        let engine = ForestGrowthEngine::new(&HalvingStrategy, 5);
        let nodes = engine.grow(seeds(&data)).unwrap();

        assert_eq!(nodes.len(), 3);
        let root = &nodes[0];
        assert_eq!(root.level, 1);
        assert_eq!(root.node_id, NodeId::ROOT);
        assert!(!root.is_leaf());
        assert_eq!(root.support, 4);

        let left = &nodes[1];
        assert_eq!(left.level, 2);
        assert_eq!(left.node_id, NodeId::new(1));
        assert_eq!(left.parent_id, NodeId::ROOT);
        assert!(left.is_left);
        assert!(left.is_leaf());
        assert!((left.leaf_value - 15.0).abs() < 1e-12);

        let right = &nodes[2];
        assert_eq!(right.node_id, NodeId::new(2));
        assert!(!right.is_left);
        assert!((right.leaf_value - 35.0).abs() < 1e-12);
    }

    #[test]
    fn depth_ceiling_forces_leaves() {
        let data = task_data();
        let engine = ForestGrowthEngine::new(&HalvingStrategy, 1);
        let nodes = engine.grow(seeds(&data)).unwrap();
        // The would-be split never happens: the root terminates at level 1.
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_leaf());
        assert!((nodes[0].leaf_value - 25.0).abs() < 1e-12);
    }

    #[test]
    fn decision_count_mismatch_is_fatal() {
        let data = task_data();
        let engine = ForestGrowthEngine::new(&ShortStrategy, 5);
        let err = engine.grow(seeds(&data)).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Integrity(IntegrityError::DecisionCountMismatch { expected: 1, got: 0 })
        ));
    }

    #[test]
    fn lost_sample_is_fatal() {
        let data = task_data();
        let engine = ForestGrowthEngine::new(&LossyStrategy, 5);
        let err = engine.grow(seeds(&data)).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Integrity(IntegrityError::SampleConservation { .. })
        ));
    }

    #[test]
    fn output_is_canonically_ordered() {
        let data = task_data();
        let engine = ForestGrowthEngine::new(&HalvingStrategy, 5);
        let nodes = engine
            .grow(vec![
                ActiveNode::root(&data, TreeId::new(2), vec![0, 1, 2, 3]),
                ActiveNode::root(&data, TreeId::new(1), vec![0, 1, 2, 3]),
            ])
            .unwrap();
        let keys: Vec<_> = nodes.iter().map(TreeNode::sort_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
