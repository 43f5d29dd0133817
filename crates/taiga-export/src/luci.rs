//! LUCI record rendering: L1MD / L2FO / L2SE / L3TN lines.
//!
//! Record shapes are fixed by the downstream scoring engine and must remain
//! stable:
//!
//! ```text
//! L1MD,<modelId>,<modelName>,<single|multi>,,LT,0
//! L2FO,<modelId>,<scorecardName>,AVE,0,,N,N,,N,
//! L2SE,<modelId>,<scorecardName>,"<filterExpression>"
//! L3TN,<modelId>,<scorecardName>,<treeId>,<globalNodeId>,<fieldNameOrMinusOne>,
//!      <splitValueOrLeafValue>,<leftChildGlobalId>,<rightChildGlobalId>,0,<LE|E>
//! ```

use std::io::Write;

use tracing::{debug, instrument};

use taiga_forest::{IntegrityError, Model, TreeLinkage, TreeNode, group_by_tree};

use crate::error::ExportError;
use crate::scorecard::Scorecard;

/// Render a model into LUCI records, one string per line.
///
/// The model must be compressed: degenerate splits have no scoring-engine
/// equivalent. Emits one `L1MD` header, one `L2FO` per scorecard, an `L2SE`
/// per non-empty filter, then one `L3TN` per node per scorecard over the
/// node's task. Node lines use tree-scoped global ids from the unique-id
/// linkage; leaves emit `-1` for the field and `0` for both children.
///
/// # Errors
///
/// | Variant | When |
/// |---|---|
/// | [`ExportError::NoScorecards`] | `scorecards` is empty |
/// | [`ExportError::DegenerateSplit`] | the node table holds a degenerate split |
/// | [`ExportError::UnknownTask`] | a scorecard's task has no trees |
/// | [`ExportError::MissingFieldName`] | a branch feature has no field mapping |
/// | [`ExportError::Forest`] | decoding or linkage fails |
#[instrument(skip_all, fields(model = model.name(), scorecards = scorecards.len()))]
pub fn export_model(
    model: &Model,
    scorecards: &[Scorecard],
) -> Result<Vec<String>, ExportError> {
    if scorecards.is_empty() {
        return Err(ExportError::NoScorecards);
    }

    let nodes = model.decode_nodes().map_err(taiga_forest::ForestError::from)?;
    if let Some(bad) = nodes.iter().find(|n| n.is_degenerate()) {
        return Err(ExportError::DegenerateSplit {
            task: bad.task,
            tree: bad.tree,
        });
    }

    let trees = group_by_tree(&nodes);
    for card in scorecards {
        if !trees.keys().any(|(task, _)| *task == card.task()) {
            return Err(ExportError::UnknownTask {
                scorecard: card.name().to_string(),
                task: card.task(),
            });
        }
    }

    let mode = if scorecards.len() == 1 { "single" } else { "multi" };
    let mut lines = vec![format!(
        "L1MD,{},{},{mode},,LT,0",
        model.id(),
        model.name()
    )];

    for card in scorecards {
        lines.push(format!("L2FO,{},{},AVE,0,,N,N,,N,", model.id(), card.name()));
        if let Some(filter) = card.filter()
            && !filter.is_empty()
        {
            lines.push(format!("L2SE,{},{},\"{filter}\"", model.id(), card.name()));
        }
    }

    for card in scorecards {
        for ((task, tree), tree_nodes) in &trees {
            if *task != card.task() {
                continue;
            }
            let linkage = TreeLinkage::build(*task, *tree, tree_nodes)
                .map_err(taiga_forest::ForestError::from)?;
            for entry in linkage.entries() {
                lines.push(node_line(model, card, &linkage, entry.uid, &entry.node)?);
            }
        }
    }

    debug!(lines = lines.len(), "export rendered");
    Ok(lines)
}

/// Render a model's LUCI records into a writer, one record per line.
///
/// # Errors
///
/// Everything [`export_model`] returns, plus [`ExportError::Write`] on I/O
/// failure.
pub fn write_model<W: Write>(
    mut writer: W,
    model: &Model,
    scorecards: &[Scorecard],
) -> Result<(), ExportError> {
    for line in export_model(model, scorecards)? {
        writeln!(writer, "{line}").map_err(|e| ExportError::Write { source: e })?;
    }
    Ok(())
}

/// Render one `L3TN` line.
fn node_line(
    model: &Model,
    card: &Scorecard,
    linkage: &TreeLinkage,
    uid: u64,
    node: &TreeNode,
) -> Result<String, ExportError> {
    let comparator = if node.is_ordinal { "LE" } else { "E" };

    if node.is_leaf() {
        return Ok(format!(
            "L3TN,{},{},{},{uid},-1,{},0,0,0,{comparator}",
            model.id(),
            card.name(),
            node.tree,
            node.leaf_value
        ));
    }

    let field = card
        .field(node.split_feature)
        .ok_or_else(|| ExportError::MissingFieldName {
            scorecard: card.name().to_string(),
            task: node.task,
            tree: node.tree,
            uid,
            feature: node.split_feature,
        })?;

    let mut left = None;
    let mut right = None;
    for &(child_uid, is_left) in linkage.children(uid) {
        if is_left {
            left = Some(child_uid);
        } else {
            right = Some(child_uid);
        }
    }
    let (Some(left), Some(right)) = (left, right) else {
        return Err(taiga_forest::ForestError::from(IntegrityError::BranchChildCount {
            task: node.task,
            tree: node.tree,
            uid,
            children: linkage.children(uid).len(),
        })
        .into());
    };

    Ok(format!(
        "L3TN,{},{},{},{uid},{field},{},{left},{right},0,{comparator}",
        model.id(),
        card.name(),
        node.tree,
        node.split_value
    ))
}
