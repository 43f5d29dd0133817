//! Decision-path analytics and structural statistics for persisted forests.
//!
//! Consumes the node/model API of `taiga-forest`: extracts root-to-leaf
//! decision paths, derives pairwise decision-distance and per-point
//! uniqueness metrics, and aggregates structural statistics and
//! Mean-Decrease-Impurity feature importance.

mod distance;
mod error;
mod importance;
mod path;
mod stats;

pub use distance::{
    DistanceMatrix, UniquenessScore, decision_distance, decision_distance_nodes,
    uniqueness_factor, uniqueness_factor_nodes,
};
pub use error::AnalysisError;
pub use importance::{RankedFeature, TaskImportance, feature_importance, node_table_importance};
pub use path::{DecisionPath, decision_paths, decision_paths_nodes};
pub use stats::{TaskStats, model_stats, node_table_stats};
