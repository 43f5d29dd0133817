//! Error types for the forest engine.
//!
//! Errors are grouped by kind so callers can distinguish configuration
//! problems from malformed models and from structural invariant violations.
//! Format and integrity errors are never retried internally: every transform
//! is pure and deterministic, so retrying cannot change the outcome.

use std::path::PathBuf;

use crate::ids::{FeatureId, NodeId, RecordId, TaskId, TreeId};

/// Invalid training parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Returned when the number of trees is zero.
    #[error("num_trees must be at least 1, got {num_trees}")]
    InvalidTreeCount {
        /// The invalid tree count provided.
        num_trees: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: u32,
    },

    /// Returned when features_per_node is zero.
    ///
    /// A value exceeding the feature count is not an error: it is clamped
    /// silently.
    #[error("features_per_node must be at least 1, got 0")]
    InvalidFeaturesPerNode,
}

/// Malformed training input.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Returned when the training input contains no feature rows.
    #[error("training input has no feature rows")]
    EmptyDataset,

    /// Returned when a feature row uses the reserved feature number 0.
    #[error("task {task}, record {record}: feature number 0 is reserved")]
    SentinelFeature {
        /// Task of the offending row.
        task: TaskId,
        /// Record of the offending row.
        record: RecordId,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("task {task}, record {record}, feature {feature}: non-finite value")]
    NonFiniteFeature {
        /// Task of the offending row.
        task: TaskId,
        /// Record of the offending row.
        record: RecordId,
        /// Feature of the offending row.
        feature: FeatureId,
    },

    /// Returned when a target value is NaN or infinite.
    #[error("task {task}, record {record}: non-finite target value")]
    NonFiniteTarget {
        /// Task of the offending row.
        task: TaskId,
        /// Record of the offending row.
        record: RecordId,
    },

    /// Returned when the same (record, feature) cell appears twice.
    #[error("task {task}, record {record}, feature {feature}: duplicate feature cell")]
    DuplicateFeatureCell {
        /// Task of the offending cell.
        task: TaskId,
        /// Record of the offending cell.
        record: RecordId,
        /// Feature of the offending cell.
        feature: FeatureId,
    },

    /// Returned when a record is missing a value for a feature other records have.
    #[error("task {task}, record {record}, feature {feature}: missing feature cell")]
    MissingFeatureCell {
        /// Task of the incomplete record.
        task: TaskId,
        /// The incomplete record.
        record: RecordId,
        /// The feature with no value.
        feature: FeatureId,
    },

    /// Returned when a record has feature rows but no target row.
    #[error("task {task}, record {record}: no target value")]
    MissingTarget {
        /// Task of the record.
        task: TaskId,
        /// The record without a target.
        record: RecordId,
    },

    /// Returned when a record has more than one target row.
    #[error("task {task}, record {record}: duplicate target value")]
    DuplicateTarget {
        /// Task of the record.
        task: TaskId,
        /// The record with duplicate targets.
        record: RecordId,
    },

    /// Returned when a task has target rows but no feature rows.
    #[error("task {task} has targets but no feature rows")]
    NoFeatures {
        /// The task without features.
        task: TaskId,
    },
}

/// Malformed or incomplete serialized model.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Returned when the model contains no node-table slot.
    #[error("model has no node-table slot")]
    NoNodeTables,

    /// Returned when a node-table slot length is not a multiple of the record width.
    #[error("task {task}: node table length {len} is not a multiple of {width}")]
    TruncatedNodeTable {
        /// Task whose slot is malformed.
        task: TaskId,
        /// Actual slot length.
        len: usize,
        /// Expected record width.
        width: usize,
    },

    /// Returned when a node field cannot be decoded (non-integral id, bad flag).
    #[error("task {task}, node record {index}: invalid {field} value {value}")]
    InvalidNodeField {
        /// Task whose slot is malformed.
        task: TaskId,
        /// Zero-based node record index within the slot.
        index: usize,
        /// Name of the offending field.
        field: &'static str,
        /// The raw numeric value found.
        value: f64,
    },

    /// Returned when the model has no sample-index slot.
    #[error("model has no sample-index slot")]
    NoSampleTable,

    /// Returned when the sample-index slot length is not a multiple of three.
    #[error("sample table length {len} is not a multiple of 3")]
    TruncatedSampleTable {
        /// Actual slot length.
        len: usize,
    },

    /// Returned when a sample-index field cannot be decoded.
    #[error("sample record {index}: invalid {field} value {value}")]
    InvalidSampleField {
        /// Zero-based sample record index within the slot.
        index: usize,
        /// Name of the offending field.
        field: &'static str,
        /// The raw numeric value found.
        value: f64,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}

/// Structural invariant violation in a node table.
///
/// Always fatal: growth, compression and renumbering abort rather than
/// produce a silently-wrong tree.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    /// Returned when a tree has no root node (level 1, id 1, null parent).
    #[error("task {task}, tree {tree}: no root node")]
    MissingRoot {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
    },

    /// Returned when a tree has more than one node with a null parent.
    #[error("task {task}, tree {tree}: multiple root nodes")]
    MultipleRoots {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
    },

    /// Returned when two nodes share an id within one (task, tree, level).
    #[error("task {task}, tree {tree}, level {level}: duplicate node id {node}")]
    DuplicateNodeId {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Level of the collision.
        level: u32,
        /// The duplicated node id.
        node: NodeId,
    },

    /// Returned when a node references a parent that does not exist.
    #[error(
        "task {task}, tree {tree}, level {level}, node {node}: parent {parent} not found"
    )]
    OrphanedParent {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Level of the orphaned node.
        level: u32,
        /// The orphaned node.
        node: NodeId,
        /// The missing parent id.
        parent: NodeId,
    },

    /// Returned when a branch node's child is absent during routing.
    #[error("task {task}, tree {tree}, level {level}, node {node}: child not found")]
    OrphanedChild {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Level of the branch node.
        level: u32,
        /// The branch node with a missing child.
        node: NodeId,
    },

    /// Returned when linkage traversal cannot reach every node (cycle or island).
    #[error("task {task}, tree {tree}: {count} node(s) unreachable from the root")]
    UnreachableNodes {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// How many nodes were never reached.
        count: usize,
    },

    /// Returned when a degenerate split does not have exactly one child.
    #[error("task {task}, tree {tree}, unique id {uid}: degenerate split has {children} children")]
    DegenerateChildCount {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Tree-scoped unique id of the degenerate node.
        uid: u64,
        /// Number of children found.
        children: usize,
    },

    /// Returned when a real branch does not have exactly two children.
    #[error("task {task}, tree {tree}, unique id {uid}: branch has {children} children")]
    BranchChildCount {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Tree-scoped unique id of the branch node.
        uid: u64,
        /// Number of children found.
        children: usize,
    },

    /// Returned when two children of one node claim the same side.
    #[error("task {task}, tree {tree}, unique id {uid}: two children on the same side")]
    DuplicateChildSide {
        /// Task of the malformed tree.
        task: TaskId,
        /// The malformed tree.
        tree: TreeId,
        /// Tree-scoped unique id of the parent node.
        uid: u64,
    },

    /// Returned when a split strategy emits the reserved feature number on a branch.
    #[error(
        "task {task}, tree {tree}, level {level}, node {node}: split uses reserved feature 0"
    )]
    InvalidSplitFeature {
        /// Task of the offending node.
        task: TaskId,
        /// Tree of the offending node.
        tree: TreeId,
        /// Level of the offending node.
        level: u32,
        /// The offending node.
        node: NodeId,
    },

    /// Returned when a split strategy loses or duplicates samples.
    #[error(
        "task {task}, tree {tree}, level {level}, node {node}: split does not partition its samples"
    )]
    SampleConservation {
        /// Task of the offending node.
        task: TaskId,
        /// Tree of the offending node.
        tree: TreeId,
        /// Level of the offending node.
        level: u32,
        /// The offending node.
        node: NodeId,
    },

    /// Returned when a split strategy yields the wrong number of decisions.
    #[error("split strategy returned {got} decisions for {expected} active nodes")]
    DecisionCountMismatch {
        /// Number of active nodes handed to the strategy.
        expected: usize,
        /// Number of decisions returned.
        got: usize,
    },
}

/// Routing failures for a persisted forest.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Returned when feature rows reference a task absent from the model.
    #[error("task {task} not present in the model")]
    UnknownTask {
        /// The unknown task.
        task: TaskId,
    },

    /// Returned when a routed record lacks a value for a split feature.
    #[error("task {task}, record {record}: no value for split feature {feature}")]
    MissingFeatureValue {
        /// Task of the record.
        task: TaskId,
        /// The record being routed.
        record: RecordId,
        /// The split feature with no value.
        feature: FeatureId,
    },
}

/// Errors from forest engine operations.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Invalid training parameters.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed training input.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Malformed or incomplete serialized model.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Structural invariant violation.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Routing failure.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}
