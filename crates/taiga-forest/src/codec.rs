//! The serialized model: flat, tagged numeric arrays addressed by slot.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::FormatError;
use crate::ids::{FeatureId, NodeId, TaskId, TreeId};
use crate::node::TreeNode;
use crate::sample::SampleIndex;

/// Numeric fields per serialized node record.
pub const NODE_FIELDS: usize = 11;

/// Numeric fields per serialized sample-index record.
pub const SAMPLE_FIELDS: usize = 3;

/// Current binary format version of the on-disk envelope.
const FORMAT_VERSION: u32 = 1;

/// Logical slot addressing one sub-array of a model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
pub enum ModelSlot {
    /// One task's node table, [`NODE_FIELDS`] values per node.
    Nodes(TaskId),
    /// The shared bootstrap table, [`SAMPLE_FIELDS`] values per row.
    Samples,
}

/// A persisted forest: named sub-arrays of numbers, nothing else.
///
/// The model is the sole artifact exchanged across process boundaries. Node
/// tables are grouped per task (the task id lives in the slot key, not in
/// the node record); the shared bootstrap draw sits in its own slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Model {
    id: u64,
    name: String,
    slots: BTreeMap<ModelSlot, Vec<f64>>,
}

/// Versioned envelope for the on-disk model.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    /// Format version for compatibility checking.
    format_version: u32,
    /// The serialized model.
    model: Model,
}

impl Model {
    /// Encode a node table and bootstrap draw into a model.
    ///
    /// Nodes are grouped by task; field order within a node record is fixed:
    /// tree, level, node id, parent id, is-left, split feature, split value,
    /// is-ordinal, leaf value, support, impurity reduction. Encoding never
    /// drops or reorders logical fields.
    #[instrument(skip(nodes, samples), fields(nodes = nodes.len(), samples = samples.len()))]
    #[must_use]
    pub fn encode(id: u64, name: &str, nodes: &[TreeNode], samples: &[SampleIndex]) -> Self {
        let mut slots: BTreeMap<ModelSlot, Vec<f64>> = BTreeMap::new();

        for node in nodes {
            let slot = slots.entry(ModelSlot::Nodes(node.task)).or_default();
            slot.extend_from_slice(&[
                f64::from(node.tree.value()),
                f64::from(node.level),
                node.node_id.value() as f64,
                node.parent_id.value() as f64,
                f64::from(u8::from(node.is_left)),
                f64::from(node.split_feature.value()),
                node.split_value,
                f64::from(u8::from(node.is_ordinal)),
                node.leaf_value,
                node.support as f64,
                node.impurity_reduction,
            ]);
        }

        let sample_slot = slots.entry(ModelSlot::Samples).or_default();
        for row in samples {
            sample_slot.extend_from_slice(&[
                f64::from(row.tree.value()),
                row.local as f64,
                row.original as f64,
            ]);
        }

        debug!(slots = slots.len(), "model encoded");
        Self {
            id,
            name: name.to_string(),
            slots,
        }
    }

    /// Rebuild a model around a replacement node table, keeping id, name and
    /// the sample slot. Used by transforms that emit a new node set.
    #[must_use]
    pub fn with_nodes(&self, nodes: &[TreeNode]) -> Self {
        let samples = self.decode_samples().unwrap_or_default();
        Self::encode(self.id, &self.name, nodes, &samples)
    }

    /// Return the model identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate over the tasks that have a node-table slot.
    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots.keys().filter_map(|slot| match slot {
            ModelSlot::Nodes(task) => Some(*task),
            ModelSlot::Samples => None,
        })
    }

    /// Decode the full node table across all tasks, in canonical order.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`FormatError::NoNodeTables`] | the model has no node slot at all |
    /// | [`FormatError::TruncatedNodeTable`] | a slot length is not a multiple of [`NODE_FIELDS`] |
    /// | [`FormatError::InvalidNodeField`] | an id field is non-integral or out of range, or a flag is not 0/1 |
    pub fn decode_nodes(&self) -> Result<Vec<TreeNode>, FormatError> {
        let mut nodes = Vec::new();
        let mut saw_slot = false;

        for (slot, values) in &self.slots {
            let ModelSlot::Nodes(task) = slot else {
                continue;
            };
            saw_slot = true;
            if values.len() % NODE_FIELDS != 0 {
                return Err(FormatError::TruncatedNodeTable {
                    task: *task,
                    len: values.len(),
                    width: NODE_FIELDS,
                });
            }
            for (index, record) in values.chunks_exact(NODE_FIELDS).enumerate() {
                nodes.push(decode_node(*task, index, record)?);
            }
        }

        if !saw_slot {
            return Err(FormatError::NoNodeTables);
        }
        nodes.sort_by_key(TreeNode::sort_key);
        Ok(nodes)
    }

    /// Decode the shared bootstrap table.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`FormatError::NoSampleTable`] | the model has no sample slot |
    /// | [`FormatError::TruncatedSampleTable`] | slot length is not a multiple of [`SAMPLE_FIELDS`] |
    /// | [`FormatError::InvalidSampleField`] | a field is non-integral or out of range |
    pub fn decode_samples(&self) -> Result<Vec<SampleIndex>, FormatError> {
        let values = self
            .slots
            .get(&ModelSlot::Samples)
            .ok_or(FormatError::NoSampleTable)?;
        if values.len() % SAMPLE_FIELDS != 0 {
            return Err(FormatError::TruncatedSampleTable { len: values.len() });
        }
        values
            .chunks_exact(SAMPLE_FIELDS)
            .enumerate()
            .map(|(index, record)| {
                Ok(SampleIndex {
                    tree: TreeId::new(sample_u32(index, "tree", record[0])?),
                    local: sample_u64(index, "local", record[1])?,
                    original: sample_u64(index, "original", record[2])?,
                })
            })
            .collect()
    }

    /// Save the model to a binary file inside a versioned envelope.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FormatError::SerializeModel`] | bincode encoding failed |
    /// | [`FormatError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            model: self.clone(),
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| FormatError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| FormatError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), slots = self.slots.len(), "model saved");
        Ok(())
    }

    /// Load a model from a binary file, checking the format version.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`FormatError::ReadModel`] | file read failed |
    /// | [`FormatError::DeserializeModel`] | bincode decoding failed |
    /// | [`FormatError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| FormatError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|e| FormatError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(FormatError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(slots = envelope.model.slots.len(), "model loaded");
        Ok(envelope.model)
    }
}

/// Decode one node record.
fn decode_node(task: TaskId, index: usize, record: &[f64]) -> Result<TreeNode, FormatError> {
    Ok(TreeNode {
        task,
        tree: TreeId::new(node_u32(task, index, "tree", record[0])?),
        level: node_u32(task, index, "level", record[1])?,
        node_id: NodeId::new(node_u64(task, index, "node_id", record[2])?),
        parent_id: NodeId::new(node_u64(task, index, "parent_id", record[3])?),
        is_left: node_flag(task, index, "is_left", record[4])?,
        split_feature: FeatureId::new(node_u32(task, index, "split_feature", record[5])?),
        split_value: record[6],
        is_ordinal: node_flag(task, index, "is_ordinal", record[7])?,
        leaf_value: record[8],
        support: node_u64(task, index, "support", record[9])?,
        impurity_reduction: record[10],
    })
}

fn node_u64(
    task: TaskId,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<u64, FormatError> {
    if value.fract() != 0.0 || value < 0.0 || value > u64::MAX as f64 {
        return Err(FormatError::InvalidNodeField {
            task,
            index,
            field,
            value,
        });
    }
    Ok(value as u64)
}

fn node_u32(
    task: TaskId,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<u32, FormatError> {
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(FormatError::InvalidNodeField {
            task,
            index,
            field,
            value,
        });
    }
    Ok(value as u32)
}

fn node_flag(
    task: TaskId,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<bool, FormatError> {
    match value {
        v if v == 0.0 => Ok(false),
        v if v == 1.0 => Ok(true),
        _ => Err(FormatError::InvalidNodeField {
            task,
            index,
            field,
            value,
        }),
    }
}

fn sample_u64(index: usize, field: &'static str, value: f64) -> Result<u64, FormatError> {
    if value.fract() != 0.0 || value < 0.0 || value > u64::MAX as f64 {
        return Err(FormatError::InvalidSampleField {
            index,
            field,
            value,
        });
    }
    Ok(value as u64)
}

fn sample_u32(index: usize, field: &'static str, value: f64) -> Result<u32, FormatError> {
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(FormatError::InvalidSampleField {
            index,
            field,
            value,
        });
    }
    Ok(value as u32)
}
