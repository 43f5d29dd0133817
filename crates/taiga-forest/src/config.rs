//! Configuration builder and training driver for forest growth.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::codec::Model;
use crate::error::{ConfigError, ForestError};
use crate::growth::{ActiveNode, ForestGrowthEngine, SplitStrategy};
use crate::ids::{FeatureId, TreeId};
use crate::rows::{FeatureKind, TrainingData};
use crate::sample::BootstrapSampler;
use crate::variance::VarianceSplitStrategy;

/// Configuration for training a forest over one or more tasks.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `features_per_node` | `None` (all features) |
/// | `max_depth`         | 10                    |
/// | `seed`              | 42                    |
/// | `feature_kinds`     | empty (all ordinal)   |
/// | `model_id`          | 1                     |
/// | `model_name`        | `"forest"`            |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    num_trees: usize,
    features_per_node: Option<usize>,
    max_depth: u32,
    seed: u64,
    feature_kinds: BTreeMap<FeatureId, FeatureKind>,
    model_id: u64,
    model_name: String,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTreeCount`] if `num_trees` is zero.
    pub fn new(num_trees: usize) -> Result<Self, ConfigError> {
        if num_trees == 0 {
            return Err(ConfigError::InvalidTreeCount { num_trees });
        }
        Ok(Self {
            num_trees,
            features_per_node: None,
            max_depth: 10,
            seed: 42,
            feature_kinds: BTreeMap::new(),
            model_id: 1,
            model_name: "forest".to_string(),
        })
    }

    // --- Setters ---

    /// Set the number of candidate features drawn per node.
    ///
    /// `None` means all features. A value exceeding a task's feature count is
    /// clamped to it silently.
    #[must_use]
    pub fn with_features_per_node(mut self, features_per_node: Option<usize>) -> Self {
        self.features_per_node = features_per_node;
        self
    }

    /// Set the hard depth ceiling (the root is level 1).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Declare feature kinds; undeclared features are ordinal.
    #[must_use]
    pub fn with_feature_kinds(mut self, feature_kinds: BTreeMap<FeatureId, FeatureKind>) -> Self {
        self.feature_kinds = feature_kinds;
        self
    }

    /// Set the model identifier carried by the encoded model.
    #[must_use]
    pub fn with_model_id(mut self, model_id: u64) -> Self {
        self.model_id = model_id;
        self
    }

    /// Set the model name carried by the encoded model.
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Return the candidate feature count per node, if limited.
    #[must_use]
    pub fn features_per_node(&self) -> Option<usize> {
        self.features_per_node
    }

    /// Return the depth ceiling.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the declared feature kinds.
    #[must_use]
    pub fn feature_kinds(&self) -> &BTreeMap<FeatureId, FeatureKind> {
        &self.feature_kinds
    }

    /// Train a forest with the default variance-reduction strategy.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`ConfigError::InvalidMaxDepth`] | `max_depth` is zero |
    /// | [`ConfigError::InvalidFeaturesPerNode`] | `features_per_node` is `Some(0)` |
    /// | [`crate::DataError`] | the training input fails assembly |
    /// | [`crate::IntegrityError`] | the strategy produces an inconsistent round |
    pub fn fit(&self, data: &TrainingData) -> Result<Model, ForestError> {
        // The strategy draws from its own stream so split selection and the
        // bootstrap stay independent under one user-facing seed.
        let strategy_seed: u64 = ChaCha8Rng::seed_from_u64(self.seed).r#gen();
        let strategy = VarianceSplitStrategy::new(
            self.features_per_node.unwrap_or(usize::MAX),
            strategy_seed,
        )
        .with_feature_kinds(self.feature_kinds.clone());

        self.fit_with(data, &strategy)
    }

    /// Train a forest with an injected split strategy.
    ///
    /// The growth loop is strategy-agnostic; anything implementing
    /// [`SplitStrategy`] can replace the impurity measure.
    ///
    /// # Errors
    ///
    /// Same as [`ForestConfig::fit`].
    #[instrument(skip_all, fields(num_trees = self.num_trees, max_depth = self.max_depth))]
    pub fn fit_with(
        &self,
        data: &TrainingData,
        strategy: &dyn SplitStrategy,
    ) -> Result<Model, ForestError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth { max_depth: 0 }.into());
        }
        if self.features_per_node == Some(0) {
            return Err(ConfigError::InvalidFeaturesPerNode.into());
        }

        let tasks = data.assemble()?;
        let max_samples = tasks
            .iter()
            .map(crate::rows::TaskData::n_records)
            .max()
            .unwrap_or(0);

        if let Some(requested) = self.features_per_node {
            for task in &tasks {
                if requested > task.n_features() {
                    // Clamped silently by design; worth a trace all the same.
                    debug!(
                        task = %task.task(),
                        requested,
                        available = task.n_features(),
                        "features_per_node clamped to the task's feature count"
                    );
                }
            }
        }

        info!(
            num_trees = self.num_trees,
            tasks = tasks.len(),
            max_samples,
            "training forest"
        );

        let sampler = BootstrapSampler::draw(self.num_trees, max_samples, self.seed);

        let mut seeds = Vec::with_capacity(tasks.len() * self.num_trees);
        for task in &tasks {
            for tree_index in 1..=self.num_trees {
                let tree = TreeId::new(tree_index as u32);
                let rows = sampler.truncated_rows(tree, task.n_records());
                seeds.push(ActiveNode::root(task, tree, rows));
            }
        }

        let engine = ForestGrowthEngine::new(strategy, self.max_depth);
        let nodes = engine.grow(seeds)?;

        info!(nodes = nodes.len(), "forest grown");
        Ok(Model::encode(
            self.model_id,
            &self.model_name,
            &nodes,
            sampler.rows(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{RecordId, TaskId};
    use crate::node::TreeNode;
    use crate::rows::{FeatureRow, TargetRow};

    fn make_data(n: u64) -> TrainingData {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for r in 1..=n {
            for f in 1..=2u32 {
                features.push(FeatureRow {
                    task: TaskId::new(1),
                    record: RecordId::new(r),
                    feature: FeatureId::new(f),
                    value: (r as f64) * (f as f64),
                });
            }
            targets.push(TargetRow {
                task: TaskId::new(1),
                record: RecordId::new(r),
                value: if r <= n / 2 { 0.0 } else { 10.0 },
            });
        }
        TrainingData::new(features, targets)
    }

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            ForestConfig::new(0),
            Err(ConfigError::InvalidTreeCount { num_trees: 0 })
        ));
    }

    #[test]
    fn zero_max_depth_rejected() {
        let config = ForestConfig::new(2).unwrap().with_max_depth(0);
        let err = config.fit(&make_data(8)).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Config(ConfigError::InvalidMaxDepth { .. })
        ));
    }

    #[test]
    fn zero_features_per_node_rejected() {
        let config = ForestConfig::new(2)
            .unwrap()
            .with_features_per_node(Some(0));
        let err = config.fit(&make_data(8)).unwrap_err();
        assert!(matches!(
            err,
            ForestError::Config(ConfigError::InvalidFeaturesPerNode)
        ));
    }

    #[test]
    fn oversized_features_per_node_clamps_silently() {
        let config = ForestConfig::new(2)
            .unwrap()
            .with_features_per_node(Some(100));
        assert!(config.fit(&make_data(8)).is_ok());
    }

    #[test]
    fn fit_produces_decodable_model() {
        let config = ForestConfig::new(3).unwrap().with_seed(7);
        let model = config.fit(&make_data(10)).unwrap();

        let nodes = model.decode_nodes().unwrap();
        assert!(!nodes.is_empty());
        let trees: std::collections::BTreeSet<_> = nodes.iter().map(|n| n.tree).collect();
        assert_eq!(trees.len(), 3);

        let samples = model.decode_samples().unwrap();
        assert_eq!(samples.len(), 3 * 10);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let config = ForestConfig::new(4).unwrap().with_seed(99);
        let a = config.fit(&make_data(12)).unwrap();
        let b = config.fit(&make_data(12)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn max_depth_bounds_levels() {
        let config = ForestConfig::new(2).unwrap().with_max_depth(2).with_seed(3);
        let model = config.fit(&make_data(16)).unwrap();
        let nodes = model.decode_nodes().unwrap();
        assert!(nodes.iter().all(|n| n.level <= 2));
        // Everything at the ceiling is terminal.
        assert!(nodes.iter().filter(|n| n.level == 2).all(TreeNode::is_leaf));
    }
}
