//! Default split strategy: variance-reduction regression splits.
//!
//! The growth engine treats split selection as a pluggable strategy; this is
//! the reference implementation. Swap in a different [`SplitStrategy`] to
//! change the impurity measure without touching the growth loop.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::ForestError;
use crate::growth::{ActiveNode, SplitDecision, SplitStrategy};
use crate::ids::FeatureId;
use crate::rows::FeatureKind;

/// Variance below which a node is considered pure.
const PURITY_EPS: f64 = 1e-12;

/// Variance-reduction split selection over a random feature subset per node.
///
/// Per node: draws `features_per_node` candidate features (clamped to the
/// task's feature count), scans ordinal candidates at sorted value
/// boundaries and categorical candidates at distinct values, and keeps the
/// split with the largest decrease in summed squared error. Leaf values are
/// target means. A node whose candidates are all constant but which is not
/// otherwise terminal emits a degenerate split, so the next round can draw a
/// different candidate subset.
#[derive(Debug, Clone)]
pub struct VarianceSplitStrategy {
    features_per_node: usize,
    seed: u64,
    kinds: BTreeMap<FeatureId, FeatureKind>,
}

impl VarianceSplitStrategy {
    /// Create a strategy drawing `features_per_node` candidates per node.
    #[must_use]
    pub fn new(features_per_node: usize, seed: u64) -> Self {
        Self {
            features_per_node,
            seed,
            kinds: BTreeMap::new(),
        }
    }

    /// Declare feature kinds; undeclared features are ordinal.
    #[must_use]
    pub fn with_feature_kinds(mut self, kinds: BTreeMap<FeatureId, FeatureKind>) -> Self {
        self.kinds = kinds;
        self
    }

    fn kind(&self, feature: FeatureId) -> FeatureKind {
        self.kinds
            .get(&feature)
            .copied()
            .unwrap_or(FeatureKind::Ordinal)
    }

    /// Per-node RNG stream, independent of node evaluation order.
    fn node_rng(&self, node: &ActiveNode<'_>) -> ChaCha8Rng {
        let mut h = self.seed;
        for part in [
            u64::from(node.task.value()),
            u64::from(node.tree.value()),
            u64::from(node.level),
            node.node_id.value(),
        ] {
            // splitmix64 round per component
            h = h.wrapping_add(part).wrapping_add(0x9e37_79b9_7f4a_7c15);
            h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            h ^= h >> 31;
        }
        ChaCha8Rng::seed_from_u64(h)
    }

    fn decide(&self, node: &ActiveNode<'_>) -> SplitDecision {
        let rows = node.rows();
        let n = rows.len();
        if n < 2 {
            // A fully-truncated bootstrap can leave a root with no samples.
            let value = node.target_values().sum::<f64>() / n.max(1) as f64;
            return SplitDecision::Leaf { value };
        }
        let mean = node.target_values().sum::<f64>() / n as f64;

        let parent_sse: f64 = node.target_values().map(|t| (t - mean) * (t - mean)).sum();
        if parent_sse <= PURITY_EPS {
            return SplitDecision::Leaf { value: mean };
        }

        // Partial Fisher-Yates: shuffle only the first `take` positions.
        let mut candidates: Vec<FeatureId> = node.data().feature_ids().collect();
        let take = self.features_per_node.min(candidates.len());
        let mut rng = self.node_rng(node);
        for i in 0..take {
            let j = rng.gen_range(i..candidates.len());
            candidates.swap(i, j);
        }
        candidates.truncate(take);

        let targets = node.data().targets();
        let mut best: Option<SplitDecision> = None;
        let mut best_reduction = f64::NEG_INFINITY;

        for &feature in &candidates {
            let column = node
                .data()
                .column(feature)
                .expect("candidate features come from the task's own feature set");
            let candidate = match self.kind(feature) {
                FeatureKind::Ordinal => best_ordinal_split(column, targets, rows, parent_sse),
                FeatureKind::Categorical => {
                    best_categorical_split(column, targets, rows, parent_sse)
                }
            };
            if let Some((value, reduction, left, right)) = candidate
                && reduction > best_reduction
            {
                best_reduction = reduction;
                best = Some(SplitDecision::Split {
                    feature,
                    value,
                    ordinal: self.kind(feature) == FeatureKind::Ordinal,
                    reduction,
                    left,
                    right,
                });
            }
        }

        match best {
            Some(split) => split,
            // Impure node, but every candidate was constant: placeholder split.
            None => SplitDecision::Degenerate {
                feature: candidates
                    .iter()
                    .min()
                    .copied()
                    .unwrap_or_else(|| {
                        node.data()
                            .feature_ids()
                            .next()
                            .expect("assembled tasks always have at least one feature")
                    }),
            },
        }
    }
}

impl SplitStrategy for VarianceSplitStrategy {
    fn split_level(
        &self,
        active: &[ActiveNode<'_>],
        _level: u32,
    ) -> Result<Vec<SplitDecision>, ForestError> {
        // All nodes of the round decide together; each draws its own RNG
        // stream, so parallel evaluation is deterministic.
        Ok(active.par_iter().map(|node| self.decide(node)).collect())
    }

    fn leaf_value(&self, node: &ActiveNode<'_>) -> f64 {
        let n = node.rows().len().max(1) as f64;
        node.target_values().sum::<f64>() / n
    }
}

/// Best `<=` boundary for one ordinal column, as
/// `(threshold, reduction, left_rows, right_rows)`.
fn best_ordinal_split(
    column: &[f64],
    targets: &[f64],
    rows: &[usize],
    parent_sse: f64,
) -> Option<(f64, f64, Vec<usize>, Vec<usize>)> {
    let n = rows.len();
    let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (column[r], r)).collect();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let total_sum: f64 = rows.iter().map(|&r| targets[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| targets[r] * targets[r]).sum();

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(f64, f64)> = None;
    let mut best_reduction = f64::NEG_INFINITY;

    for i in 0..(n - 1) {
        let (value, row) = sorted[i];
        let t = targets[row];
        left_sum += t;
        left_sq += t * t;

        // No boundary between equal values.
        let next_value = sorted[i + 1].0;
        if value == next_value {
            continue;
        }

        let n_left = (i + 1) as f64;
        let n_right = (n - i - 1) as f64;
        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;
        let left_sse = left_sq - left_sum * left_sum / n_left;
        let right_sse = right_sq - right_sum * right_sum / n_right;
        let reduction = parent_sse - left_sse - right_sse;

        if reduction > best_reduction {
            best_reduction = reduction;
            best = Some(((value + next_value) / 2.0, reduction));
        }
    }

    let (threshold, reduction) = best?;
    let mut left = Vec::with_capacity(n / 2);
    let mut right = Vec::with_capacity(n / 2);
    for &r in rows {
        if column[r] <= threshold {
            left.push(r);
        } else {
            right.push(r);
        }
    }
    Some((threshold, reduction, left, right))
}

/// Best `==` value for one categorical column.
fn best_categorical_split(
    column: &[f64],
    targets: &[f64],
    rows: &[usize],
    parent_sse: f64,
) -> Option<(f64, f64, Vec<usize>, Vec<usize>)> {
    let n = rows.len();
    let mut values: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
    values.sort_unstable_by(f64::total_cmp);
    values.dedup();
    if values.len() < 2 {
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    let mut best_reduction = f64::NEG_INFINITY;

    for &value in &values {
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut right_sum = 0.0;
        let mut right_sq = 0.0;
        let mut n_left = 0usize;
        for &r in rows {
            let t = targets[r];
            if column[r] == value {
                left_sum += t;
                left_sq += t * t;
                n_left += 1;
            } else {
                right_sum += t;
                right_sq += t * t;
            }
        }
        let n_right = n - n_left;
        if n_left == 0 || n_right == 0 {
            continue;
        }
        let left_sse = left_sq - left_sum * left_sum / n_left as f64;
        let right_sse = right_sq - right_sum * right_sum / n_right as f64;
        let reduction = parent_sse - left_sse - right_sse;
        if reduction > best_reduction {
            best_reduction = reduction;
            best = Some((value, reduction));
        }
    }

    let (value, reduction) = best?;
    let mut left = Vec::with_capacity(n / 2);
    let mut right = Vec::with_capacity(n / 2);
    for &r in rows {
        if column[r] == value {
            left.push(r);
        } else {
            right.push(r);
        }
    }
    Some((value, reduction, left, right))
}
