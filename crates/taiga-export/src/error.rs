//! Error types for scorecard export.

use taiga_forest::{FeatureId, ForestError, TaskId, TreeId};

/// Errors from rendering a model into LUCI records.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// An underlying forest operation failed (decode, linkage).
    #[error(transparent)]
    Forest(#[from] ForestError),

    /// Returned when no scorecards are supplied.
    #[error("export requires at least one scorecard")]
    NoScorecards,

    /// Returned when a scorecard's task has no trees in the model.
    #[error("scorecard {scorecard}: task {task} not present in the model")]
    UnknownTask {
        /// Name of the offending scorecard.
        scorecard: String,
        /// The missing task.
        task: TaskId,
    },

    /// Returned when a branch node's feature has no field-name mapping.
    ///
    /// Export fails for the whole scorecard rather than emitting a sentinel:
    /// a silent `-1` in a branch line would mask a labeling bug downstream.
    #[error(
        "scorecard {scorecard}: no field name for feature {feature} \
         (task {task}, tree {tree}, node {uid})"
    )]
    MissingFieldName {
        /// Name of the offending scorecard.
        scorecard: String,
        /// Task of the unmapped node.
        task: TaskId,
        /// Tree of the unmapped node.
        tree: TreeId,
        /// Tree-scoped unique id of the unmapped node.
        uid: u64,
        /// The feature with no mapping.
        feature: FeatureId,
    },

    /// Returned when the node table still contains a degenerate split.
    ///
    /// Degenerate splits have no scoring-engine equivalent; compress the
    /// model before exporting it.
    #[error("task {task}, tree {tree}: degenerate split in export input; compress first")]
    DegenerateSplit {
        /// Task of the degenerate node.
        task: TaskId,
        /// Tree of the degenerate node.
        tree: TreeId,
    },

    /// Returned when writing records to the output fails.
    #[error("failed to write export records")]
    Write {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
