//! Pairwise decision-distance and uniqueness metrics.
//!
//! Two points that take the same path through every tree have distance 0;
//! points whose paths diverge at the root in every tree approach 1. Distance
//! is derived from per-tree path similarity:
//! `similarity = common_prefix / ((|p| + |q|) / 2)`, averaged over the
//! task's trees, then `distance = 1 - mean similarity`.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use taiga_forest::{FeatureRow, Model, RecordId, TaskId, TreeId, TreeNode};

use crate::error::AnalysisError;
use crate::path::{DecisionPath, decision_paths_nodes};

/// Pairwise decision distances between two point sets.
///
/// For a single point set the matrix is symmetric with a zero diagonal and
/// is stored lower-triangular; for two sets it is a dense rows × cols
/// matrix. Row and column indices address the record lists returned by
/// [`DistanceMatrix::row_records`] and [`DistanceMatrix::col_records`].
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    row_records: Vec<RecordId>,
    col_records: Vec<RecordId>,
    symmetric: bool,
    data: Vec<f64>,
}

impl DistanceMatrix {
    fn symmetric(records: Vec<RecordId>, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), records.len() * records.len().saturating_sub(1) / 2);
        Self {
            col_records: records.clone(),
            row_records: records,
            symmetric: true,
            data,
        }
    }

    fn rectangular(rows: Vec<RecordId>, cols: Vec<RecordId>, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), rows.len() * cols.len());
        Self {
            row_records: rows,
            col_records: cols,
            symmetric: false,
            data,
        }
    }

    /// Return the records addressed by row indices.
    #[must_use]
    pub fn row_records(&self) -> &[RecordId] {
        &self.row_records
    }

    /// Return the records addressed by column indices.
    #[must_use]
    pub fn col_records(&self) -> &[RecordId] {
        &self.col_records
    }

    /// Return `true` when built from a single point set.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Return the distance at (row, col).
    ///
    /// Symmetric matrices answer `get(i, j) == get(j, i)` and a zero
    /// diagonal.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(
            row < self.row_records.len(),
            "row index {row} out of bounds for {} rows",
            self.row_records.len()
        );
        assert!(
            col < self.col_records.len(),
            "column index {col} out of bounds for {} columns",
            self.col_records.len()
        );
        if self.symmetric {
            if row == col {
                return 0.0;
            }
            let (i, j) = if row > col { (row, col) } else { (col, row) };
            self.data[i * (i - 1) / 2 + j]
        } else {
            self.data[row * self.col_records.len() + col]
        }
    }

    /// Iterate over all stored pairs as `(row, col, distance)`.
    ///
    /// Symmetric matrices yield only the strict lower triangle.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let cols = self.col_records.len();
        let symmetric = self.symmetric;
        self.data.iter().enumerate().map(move |(k, &d)| {
            if symmetric {
                // Invert k = i*(i-1)/2 + j within the lower triangle.
                let mut i = 1;
                while (i + 1) * i / 2 <= k {
                    i += 1;
                }
                (i, k - i * (i - 1) / 2, d)
            } else {
                (k / cols, k % cols, d)
            }
        })
    }
}

/// Per-record uniqueness score: mean distance to the comparison set.
#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessScore {
    /// The scored record.
    pub record: RecordId,
    /// Mean decision distance to every other point (range `[0, 1]`).
    pub score: f64,
}

/// Compute pairwise decision distances from a persisted model.
///
/// # Errors
///
/// Decode errors from the model plus everything [`decision_distance_nodes`]
/// returns.
pub fn decision_distance(
    model: &Model,
    task: TaskId,
    points: &[FeatureRow],
    comparison: Option<&[FeatureRow]>,
) -> Result<DistanceMatrix, AnalysisError> {
    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    decision_distance_nodes(&nodes, task, points, comparison)
}

/// Compute pairwise decision distances from a node table.
///
/// With one point set, produces the symmetric N×N matrix; with a comparison
/// set, the rectangular N×M matrix of distances from `points` rows to
/// `comparison` columns.
///
/// # Errors
///
/// | Variant | When |
/// |---|---|
/// | [`AnalysisError::EmptyPointSet`] | either set has no points |
/// | [`AnalysisError::UnknownTask`] | the task has no trees in the table |
/// | [`AnalysisError::Forest`] | routing or linkage fails |
#[instrument(skip_all, fields(task = %task))]
pub fn decision_distance_nodes(
    nodes: &[TreeNode],
    task: TaskId,
    points: &[FeatureRow],
    comparison: Option<&[FeatureRow]>,
) -> Result<DistanceMatrix, AnalysisError> {
    let row_paths = PathTable::extract(nodes, task, points)?;

    match comparison {
        None => {
            let records = row_paths.records.clone();
            let n = records.len();
            // Rows of the lower triangle are independent work items.
            let data: Vec<f64> = (1..n)
                .into_par_iter()
                .flat_map_iter(|i| {
                    let records = &records;
                    let row_paths = &row_paths;
                    (0..i).map(move |j| row_paths.distance(&records[i], row_paths, &records[j]))
                })
                .collect();
            debug!(points = n, "symmetric distance matrix computed");
            Ok(DistanceMatrix::symmetric(records, data))
        }
        Some(comparison) => {
            let col_paths = PathTable::extract(nodes, task, comparison)?;
            let rows = row_paths.records.clone();
            let cols = col_paths.records.clone();
            let data: Vec<f64> = rows
                .par_iter()
                .flat_map_iter(|row| {
                    let cols = &cols;
                    let row_paths = &row_paths;
                    let col_paths = &col_paths;
                    cols.iter().map(move |col| row_paths.distance(row, col_paths, col))
                })
                .collect();
            debug!(
                rows = rows.len(),
                cols = cols.len(),
                "rectangular distance matrix computed"
            );
            Ok(DistanceMatrix::rectangular(rows, cols, data))
        }
    }
}

/// Compute per-point uniqueness factors from a persisted model.
///
/// # Errors
///
/// Decode errors from the model plus everything
/// [`uniqueness_factor_nodes`] returns.
pub fn uniqueness_factor(
    model: &Model,
    task: TaskId,
    points: &[FeatureRow],
    comparison: Option<&[FeatureRow]>,
) -> Result<Vec<UniquenessScore>, AnalysisError> {
    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    uniqueness_factor_nodes(&nodes, task, points, comparison)
}

/// Compute per-point uniqueness factors from a node table.
///
/// Each point's score is its mean decision distance to every *other* point
/// of its own set, or to every point of the comparison set when one is
/// supplied. A singleton set with no comparison scores 0.
///
/// # Errors
///
/// Same as [`decision_distance_nodes`].
pub fn uniqueness_factor_nodes(
    nodes: &[TreeNode],
    task: TaskId,
    points: &[FeatureRow],
    comparison: Option<&[FeatureRow]>,
) -> Result<Vec<UniquenessScore>, AnalysisError> {
    let matrix = decision_distance_nodes(nodes, task, points, comparison)?;
    let rows = matrix.row_records();
    let cols = matrix.col_records();

    let scores = rows
        .iter()
        .enumerate()
        .map(|(i, &record)| {
            let mut total = 0.0;
            let mut count = 0usize;
            for j in 0..cols.len() {
                if matrix.is_symmetric() && i == j {
                    continue;
                }
                total += matrix.get(i, j);
                count += 1;
            }
            let score = if count == 0 { 0.0 } else { total / count as f64 };
            UniquenessScore { record, score }
        })
        .collect();
    Ok(scores)
}

/// Per-record decision paths for one task, keyed for pair lookups.
struct PathTable {
    records: Vec<RecordId>,
    paths: BTreeMap<(RecordId, TreeId), Vec<u64>>,
    trees: Vec<TreeId>,
}

impl PathTable {
    fn extract(
        nodes: &[TreeNode],
        task: TaskId,
        points: &[FeatureRow],
    ) -> Result<Self, AnalysisError> {
        if points.iter().filter(|r| r.task == task).count() == 0 {
            return Err(AnalysisError::EmptyPointSet);
        }
        let paths = decision_paths_nodes(nodes, task, points)?;

        let mut records: Vec<RecordId> = Vec::new();
        let mut trees: Vec<TreeId> = Vec::new();
        let mut table: BTreeMap<(RecordId, TreeId), Vec<u64>> = BTreeMap::new();
        for path in paths {
            if !records.contains(&path.record) {
                records.push(path.record);
            }
            if !trees.contains(&path.tree) {
                trees.push(path.tree);
            }
            table.insert((path.record, path.tree), path.nodes);
        }
        records.sort_unstable();
        trees.sort_unstable();
        Ok(Self {
            records,
            paths: table,
            trees,
        })
    }

    /// Decision distance between one of our records and one of `other`'s.
    fn distance(&self, p: &RecordId, other: &PathTable, q: &RecordId) -> f64 {
        let mut total = 0.0;
        for tree in &self.trees {
            let p_path = &self.paths[&(*p, *tree)];
            let q_path = &other.paths[&(*q, *tree)];
            total += similarity(p_path, q_path);
        }
        1.0 - total / self.trees.len() as f64
    }
}

/// Path similarity: shared prefix length over the average path length.
fn similarity(p: &[u64], q: &[u64]) -> f64 {
    let common = p.iter().zip(q).take_while(|(a, b)| a == b).count();
    let avg_len = (p.len() + q.len()) as f64 / 2.0;
    common as f64 / avg_len
}
