//! Error types for forest analytics.

use taiga_forest::{ForestError, TaskId};

/// Errors from path, distance and statistics computations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An underlying forest operation failed (decode, routing, linkage).
    #[error(transparent)]
    Forest(#[from] ForestError),

    /// Returned when the requested task has no trees in the model.
    #[error("task {task} not present in the model")]
    UnknownTask {
        /// The unknown task.
        task: TaskId,
    },

    /// Returned when a point set is empty.
    #[error("point set is empty")]
    EmptyPointSet,
}
