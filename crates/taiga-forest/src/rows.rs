//! Long-format training input and per-task dataset assembly.

use std::collections::BTreeMap;

use crate::error::DataError;
use crate::ids::{FeatureId, RecordId, TaskId};

/// One observed feature value: (task, record, feature, value).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureRow {
    /// Training task of the observation.
    pub task: TaskId,
    /// Record the observation belongs to.
    pub record: RecordId,
    /// Feature number (never 0, which is reserved).
    pub feature: FeatureId,
    /// Observed value.
    pub value: f64,
}

/// One dependent value: (task, record, value).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetRow {
    /// Training task of the observation.
    pub task: TaskId,
    /// Record the target belongs to.
    pub record: RecordId,
    /// Dependent value.
    pub value: f64,
}

/// How a feature participates in splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FeatureKind {
    /// Ordered feature; splits compare with `<=`.
    Ordinal,
    /// Unordered feature; splits compare with `==`.
    Categorical,
}

/// Long-format training input for one or more tasks.
#[derive(Debug, Clone)]
pub struct TrainingData {
    features: Vec<FeatureRow>,
    targets: Vec<TargetRow>,
}

impl TrainingData {
    /// Create a training input from feature and target rows.
    #[must_use]
    pub fn new(features: Vec<FeatureRow>, targets: Vec<TargetRow>) -> Self {
        Self { features, targets }
    }

    /// Return the feature rows.
    #[must_use]
    pub fn features(&self) -> &[FeatureRow] {
        &self.features
    }

    /// Return the target rows.
    #[must_use]
    pub fn targets(&self) -> &[TargetRow] {
        &self.targets
    }

    /// Assemble the long-format rows into dense per-task column matrices.
    ///
    /// Every record of a task must carry a value for every feature the task
    /// uses, plus exactly one target. Records are ordered by id; their
    /// one-based position is the `original` id the bootstrap sampler draws.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`DataError::EmptyDataset`] | no feature rows at all |
    /// | [`DataError::SentinelFeature`] | a row uses feature number 0 |
    /// | [`DataError::NonFiniteFeature`] | a feature value is NaN or infinite |
    /// | [`DataError::NonFiniteTarget`] | a target value is NaN or infinite |
    /// | [`DataError::DuplicateFeatureCell`] | a (record, feature) cell repeats |
    /// | [`DataError::MissingFeatureCell`] | a record lacks one of the task's features |
    /// | [`DataError::DuplicateTarget`] | a record has two targets |
    /// | [`DataError::MissingTarget`] | a record has no target |
    /// | [`DataError::NoFeatures`] | a task has targets but no features |
    pub fn assemble(&self) -> Result<Vec<TaskData>, DataError> {
        if self.features.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        // task → record → feature → value
        let mut cells: BTreeMap<TaskId, BTreeMap<RecordId, BTreeMap<FeatureId, f64>>> =
            BTreeMap::new();
        for row in &self.features {
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
            let previous = cells
                .entry(row.task)
                .or_default()
                .entry(row.record)
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

        let mut target_map: BTreeMap<TaskId, BTreeMap<RecordId, f64>> = BTreeMap::new();
        for row in &self.targets {
            if !row.value.is_finite() {
                return Err(DataError::NonFiniteTarget {
                    task: row.task,
                    record: row.record,
                });
            }
            let previous = target_map
                .entry(row.task)
                .or_default()
                .insert(row.record, row.value);
            if previous.is_some() {
                return Err(DataError::DuplicateTarget {
                    task: row.task,
                    record: row.record,
                });
            }
        }

        // A task named only by targets has no features to split on.
        for task in target_map.keys() {
            if !cells.contains_key(task) {
                return Err(DataError::NoFeatures { task: *task });
            }
        }

        let mut tasks = Vec::with_capacity(cells.len());
        for (task, records) in cells {
            let task_targets = target_map.remove(&task).unwrap_or_default();

            // The task's feature set is the union across its records.
            let mut feature_ids: Vec<FeatureId> = Vec::new();
            for row_cells in records.values() {
                for feature in row_cells.keys() {
                    if !feature_ids.contains(feature) {
                        feature_ids.push(*feature);
                    }
                }
            }
            feature_ids.sort_unstable();

            let mut record_ids = Vec::with_capacity(records.len());
            let mut columns: BTreeMap<FeatureId, Vec<f64>> = feature_ids
                .iter()
                .map(|f| (*f, Vec::with_capacity(records.len())))
                .collect();
            let mut targets = Vec::with_capacity(records.len());

            for (record, row_cells) in records {
                for feature in &feature_ids {
                    let Some(value) = row_cells.get(feature) else {
                        return Err(DataError::MissingFeatureCell {
                            task,
                            record,
                            feature: *feature,
                        });
                    };
                    columns
                        .get_mut(feature)
                        .expect("column exists for every task feature")
                        .push(*value);
                }
                let Some(target) = task_targets.get(&record) else {
                    return Err(DataError::MissingTarget { task, record });
                };
                record_ids.push(record);
                targets.push(*target);
            }

            tasks.push(TaskData {
                task,
                records: record_ids,
                columns,
                targets,
            });
        }

        Ok(tasks)
    }
}

/// One task's training set as dense columns.
///
/// Records are sorted by id; all columns and the target vector are indexed
/// by record position.
#[derive(Debug, Clone)]
pub struct TaskData {
    task: TaskId,
    records: Vec<RecordId>,
    columns: BTreeMap<FeatureId, Vec<f64>>,
    targets: Vec<f64>,
}

impl TaskData {
    /// Return the task identifier.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Return the number of records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Return the record ids in position order.
    #[must_use]
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    /// Iterate over the task's feature ids in ascending order.
    pub fn feature_ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.columns.keys().copied()
    }

    /// Return one feature column, indexed by record position.
    #[must_use]
    pub fn column(&self, feature: FeatureId) -> Option<&[f64]> {
        self.columns.get(&feature).map(Vec::as_slice)
    }

    /// Return the target vector, indexed by record position.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(task: u32, record: u64, feature_id: u32, value: f64) -> FeatureRow {
        FeatureRow {
            task: TaskId::new(task),
            record: RecordId::new(record),
            feature: FeatureId::new(feature_id),
            value,
        }
    }

    fn target(task: u32, record: u64, value: f64) -> TargetRow {
        TargetRow {
            task: TaskId::new(task),
            record: RecordId::new(record),
            value,
        }
    }

    #[test]
    fn assembles_dense_columns() {
        let data = TrainingData::new(
            vec![
                feature(1, 2, 1, 10.0),
                feature(1, 2, 2, 20.0),
                feature(1, 1, 1, 30.0),
                feature(1, 1, 2, 40.0),
            ],
            vec![target(1, 1, 0.5), target(1, 2, 1.5)],
        );
        let tasks = data.assemble().unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.n_records(), 2);
        assert_eq!(task.n_features(), 2);
        // Records ordered by id, so record 1 sits at position 0.
        assert_eq!(task.column(FeatureId::new(1)).unwrap(), &[30.0, 10.0]);
        assert_eq!(task.targets(), &[0.5, 1.5]);
    }

    #[test]
    fn empty_dataset_error() {
        let data = TrainingData::new(vec![], vec![target(1, 1, 0.0)]);
        assert!(matches!(data.assemble(), Err(DataError::EmptyDataset)));
    }

    #[test]
    fn sentinel_feature_error() {
        let data = TrainingData::new(vec![feature(1, 1, 0, 1.0)], vec![target(1, 1, 0.0)]);
        assert!(matches!(
            data.assemble(),
            Err(DataError::SentinelFeature { .. })
        ));
    }

    #[test]
    fn missing_cell_error() {
        let data = TrainingData::new(
            vec![
                feature(1, 1, 1, 1.0),
                feature(1, 1, 2, 2.0),
                feature(1, 2, 1, 3.0),
            ],
            vec![target(1, 1, 0.0), target(1, 2, 1.0)],
        );
        assert!(matches!(
            data.assemble(),
            Err(DataError::MissingFeatureCell { .. })
        ));
    }

    #[test]
    fn missing_target_error() {
        let data = TrainingData::new(vec![feature(1, 1, 1, 1.0)], vec![]);
        assert!(matches!(
            data.assemble(),
            Err(DataError::MissingTarget { .. })
        ));
    }

    #[test]
    fn duplicate_cell_error() {
        let data = TrainingData::new(
            vec![feature(1, 1, 1, 1.0), feature(1, 1, 1, 2.0)],
            vec![target(1, 1, 0.0)],
        );
        assert!(matches!(
            data.assemble(),
            Err(DataError::DuplicateFeatureCell { .. })
        ));
    }

    #[test]
    fn non_finite_feature_error() {
        let data = TrainingData::new(vec![feature(1, 1, 1, f64::NAN)], vec![target(1, 1, 0.0)]);
        assert!(matches!(
            data.assemble(),
            Err(DataError::NonFiniteFeature { .. })
        ));
    }

    #[test]
    fn two_tasks_assemble_independently() {
        let data = TrainingData::new(
            vec![feature(1, 1, 1, 1.0), feature(2, 1, 7, 9.0)],
            vec![target(1, 1, 0.0), target(2, 1, 1.0)],
        );
        let tasks = data.assemble().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task(), TaskId::new(1));
        assert_eq!(tasks[1].task(), TaskId::new(2));
        assert!(tasks[1].column(FeatureId::new(7)).is_some());
        assert!(tasks[1].column(FeatureId::new(1)).is_none());
    }
}
