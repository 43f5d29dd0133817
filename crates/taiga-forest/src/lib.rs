//! Distributed decision-forest structural engine.
//!
//! Trains Random-Forest-style ensembles over horizontally-partitioned
//! tabular data and exports a compact, portable tree representation:
//! shared bootstrap-sample generation, level-by-level growth over a
//! pluggable split strategy, a flat tagged-array model codec, batch leaf
//! routing, and structural compression of degenerate splits.
//!
//! Every transform is a pure function from one node-table snapshot to the
//! next; growth rounds are synchronization barriers and `max_depth` is the
//! hard termination guarantee. Structural invariants (unique ids,
//! deterministic `2n-1`/`2n` child addressing, parent linkage) are enforced
//! fatally: a violated table is never silently repaired.

mod codec;
mod compress;
mod config;
mod error;
mod growth;
mod ids;
mod link;
mod node;
mod route;
mod rows;
mod sample;
mod variance;

pub use codec::{Model, ModelSlot, NODE_FIELDS, SAMPLE_FIELDS};
pub use compress::{compress_model, compress_nodes};
pub use config::ForestConfig;
pub use error::{
    ConfigError, DataError, ForestError, FormatError, IntegrityError, RoutingError,
};
pub use growth::{ActiveNode, ForestGrowthEngine, SplitDecision, SplitStrategy};
pub use ids::{FeatureId, NodeId, RecordId, TaskId, TreeId};
pub use link::{LinkEntry, TreeLinkage};
pub use node::{DEGENERATE_SPLIT, TreeNode, group_by_tree};
pub use route::{LeafAssignment, route_model, route_nodes};
pub use rows::{FeatureKind, FeatureRow, TargetRow, TaskData, TrainingData};
pub use sample::{BootstrapSampler, SampleIndex};
pub use variance::VarianceSplitStrategy;
