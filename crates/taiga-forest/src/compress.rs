//! Structural compression: removal of degenerate single-child splits.
//!
//! A degenerate split routes every input to its single child, so it adds no
//! decision value. Compression splices such nodes out and renumbers the
//! survivors; routing behavior is preserved by construction, because 100% of
//! a degenerate node's inputs already went to the spliced-in child.

use std::collections::{HashMap, HashSet};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::codec::Model;
use crate::error::{ForestError, IntegrityError};
use crate::ids::NodeId;
use crate::link::TreeLinkage;
use crate::node::{TreeNode, group_by_tree};

/// Compress every tree of a persisted model.
///
/// The node slots are replaced by the compressed table; the sample slot, id
/// and name pass through unchanged.
///
/// # Errors
///
/// Decode errors from the model plus everything [`compress_nodes`] returns.
#[instrument(skip_all, fields(model = model.name()))]
pub fn compress_model(model: &Model) -> Result<Model, ForestError> {
    let nodes = model.decode_nodes()?;
    let compressed = compress_nodes(&nodes)?;
    Ok(model.with_nodes(&compressed))
}

/// Compress a node table, producing an entirely new node set.
///
/// Two phases per tree, both over unique-id linkage:
/// 1. **Splice** (top-down): every degenerate node is removed and its sole
///    child re-linked to the degenerate node's current parent, inheriting
///    its side. A degenerate root makes its child the new root.
/// 2. **Renumber**: `level`/`node_id` are recomputed from the new root with
///    the `2n-1`/`2n` rule; every surviving node is re-emitted with its new
///    address and its payload fields untouched.
///
/// # Errors
///
/// Linkage errors from [`TreeLinkage::build`], plus:
///
/// | Variant | When |
/// |---|---|
/// | [`IntegrityError::DegenerateChildCount`] | a degenerate node does not have exactly one child |
/// | [`IntegrityError::BranchChildCount`] | a surviving branch lacks two children, or a leaf has any |
/// | [`IntegrityError::DuplicateChildSide`] | two children of one node claim the same side |
/// | [`IntegrityError::UnreachableNodes`] | splicing left nodes unreachable from the root |
#[instrument(skip_all, fields(nodes = nodes.len()))]
pub fn compress_nodes(nodes: &[TreeNode]) -> Result<Vec<TreeNode>, ForestError> {
    let groups: Vec<_> = group_by_tree(nodes).into_iter().collect();
    let mut out: Vec<TreeNode> = groups
        .into_par_iter()
        .map(|((task, tree), tree_nodes)| {
            let linkage = TreeLinkage::build(task, tree, &tree_nodes)?;
            compress_tree(&linkage)
        })
        .collect::<Result<Vec<Vec<TreeNode>>, IntegrityError>>()?
        .into_iter()
        .flatten()
        .collect();

    out.sort_by_key(TreeNode::sort_key);
    debug!(input = nodes.len(), output = out.len(), "compression complete");
    Ok(out)
}

/// Compress one tree.
fn compress_tree(linkage: &TreeLinkage) -> Result<Vec<TreeNode>, IntegrityError> {
    let task = linkage.task();
    let tree = linkage.tree();

    // --- Splice ---
    // uid → current (parent uid, is_left); None = root position.
    let mut parent: HashMap<u64, Option<(u64, bool)>> = linkage
        .entries()
        .iter()
        .map(|e| {
            let link = e.parent.map(|p| (p, e.node.is_left));
            (e.uid, link)
        })
        .collect();
    let mut removed: HashSet<u64> = HashSet::new();

    // Entries are in (level, node id) order, so parents precede children and
    // a chain of degenerate nodes collapses in one pass.
    for entry in linkage.entries() {
        if !entry.node.is_degenerate() {
            continue;
        }
        let children = linkage.children(entry.uid);
        if children.len() != 1 {
            return Err(IntegrityError::DegenerateChildCount {
                task,
                tree,
                uid: entry.uid,
                children: children.len(),
            });
        }
        let (child_uid, _) = children[0];
        let inherited = parent[&entry.uid];
        parent.insert(child_uid, inherited);
        removed.insert(entry.uid);
    }

    // --- Renumber ---
    let survivors: Vec<u64> = linkage
        .entries()
        .iter()
        .map(|e| e.uid)
        .filter(|uid| !removed.contains(uid))
        .collect();

    let mut child_map: HashMap<u64, Vec<(u64, bool)>> = HashMap::new();
    let mut root = None;
    for &uid in &survivors {
        match parent[&uid] {
            None => {
                if root.replace(uid).is_some() {
                    return Err(IntegrityError::MultipleRoots { task, tree });
                }
            }
            Some((parent_uid, is_left)) => {
                child_map.entry(parent_uid).or_default().push((uid, is_left));
            }
        }
    }
    let root = root.ok_or(IntegrityError::MissingRoot { task, tree })?;

    let mut out = Vec::with_capacity(survivors.len());
    let mut queue = vec![(root, 1u32, NodeId::ROOT, NodeId::NULL, false)];
    let mut visited = 0usize;

    while let Some((uid, level, node_id, parent_id, is_left)) = queue.pop() {
        visited += 1;
        let node = &linkage.entry(uid).node;

        let children = child_map.get(&uid).map_or(&[] as &[_], Vec::as_slice);
        let expected = if node.is_leaf() { 0 } else { 2 };
        if children.len() != expected {
            return Err(IntegrityError::BranchChildCount {
                task,
                tree,
                uid,
                children: children.len(),
            });
        }
        let mut saw_left = false;
        let mut saw_right = false;
        for &(child_uid, child_is_left) in children {
            let seen = if child_is_left {
                &mut saw_left
            } else {
                &mut saw_right
            };
            if *seen {
                return Err(IntegrityError::DuplicateChildSide { task, tree, uid });
            }
            *seen = true;
            let child_id = if child_is_left {
                node_id.left_child()
            } else {
                node_id.right_child()
            };
            queue.push((child_uid, level + 1, child_id, node_id, child_is_left));
        }

        out.push(TreeNode {
            level,
            node_id,
            parent_id,
            is_left,
            ..node.clone()
        });
    }

    if visited != survivors.len() {
        return Err(IntegrityError::UnreachableNodes {
            task,
            tree,
            count: survivors.len() - visited,
        });
    }

    out.sort_by_key(TreeNode::sort_key);
    Ok(out)
}
