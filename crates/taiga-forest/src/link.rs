//! Tree-scoped unique-id linkage over a node table.
//!
//! `level`/`node_id` address nodes only within their level; structural
//! transforms (splicing, renumbering) and path analytics need identity that
//! survives restructuring. The linkage assigns every node of a tree a
//! sequential unique id and records parent/child edges by that id, making
//! `level`/`node_id` derived display fields.

use std::collections::HashMap;

use crate::error::IntegrityError;
use crate::ids::{NodeId, TaskId, TreeId};
use crate::node::TreeNode;

/// One node with its tree-scoped unique id and parent link.
#[derive(Debug, Clone)]
pub struct LinkEntry {
    /// Tree-scoped unique id (1-based, level-independent).
    pub uid: u64,
    /// Parent's unique id; `None` for the root.
    pub parent: Option<u64>,
    /// The underlying node record.
    pub node: TreeNode,
}

/// Unique-id view of one (task, tree) node set.
#[derive(Debug, Clone)]
pub struct TreeLinkage {
    task: TaskId,
    tree: TreeId,
    entries: Vec<LinkEntry>,
    children: HashMap<u64, Vec<(u64, bool)>>,
    root: u64,
}

impl TreeLinkage {
    /// Build the linkage for one tree's nodes.
    ///
    /// `nodes` must all belong to (task, tree). Unique ids are assigned in
    /// (level, node id) order, so they are deterministic for a given table.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`IntegrityError::DuplicateNodeId`] | two nodes share (level, node id) |
    /// | [`IntegrityError::MissingRoot`] | no node has a null parent |
    /// | [`IntegrityError::MultipleRoots`] | several nodes have a null parent |
    /// | [`IntegrityError::OrphanedParent`] | a parent reference resolves to nothing |
    pub fn build(
        task: TaskId,
        tree: TreeId,
        nodes: &[&TreeNode],
    ) -> Result<Self, IntegrityError> {
        let mut sorted: Vec<&TreeNode> = nodes.to_vec();
        sorted.sort_by_key(|n| (n.level, n.node_id));

        let mut by_address: HashMap<(u32, NodeId), u64> = HashMap::new();
        for (position, node) in sorted.iter().enumerate() {
            let uid = position as u64 + 1;
            if by_address.insert((node.level, node.node_id), uid).is_some() {
                return Err(IntegrityError::DuplicateNodeId {
                    task,
                    tree,
                    level: node.level,
                    node: node.node_id,
                });
            }
        }

        let mut entries = Vec::with_capacity(sorted.len());
        let mut children: HashMap<u64, Vec<(u64, bool)>> = HashMap::new();
        let mut root = None;

        for (position, node) in sorted.iter().enumerate() {
            let uid = position as u64 + 1;
            let parent = if node.parent_id.is_null() {
                if root.replace(uid).is_some() {
                    return Err(IntegrityError::MultipleRoots { task, tree });
                }
                None
            } else {
                let parent_uid = *by_address
                    .get(&(node.level - 1, node.parent_id))
                    .ok_or(IntegrityError::OrphanedParent {
                        task,
                        tree,
                        level: node.level,
                        node: node.node_id,
                        parent: node.parent_id,
                    })?;
                children
                    .entry(parent_uid)
                    .or_default()
                    .push((uid, node.is_left));
                Some(parent_uid)
            };
            entries.push(LinkEntry {
                uid,
                parent,
                node: (*node).clone(),
            });
        }

        let root = root.ok_or(IntegrityError::MissingRoot { task, tree })?;
        Ok(Self {
            task,
            tree,
            entries,
            children,
            root,
        })
    }

    /// Return the task this linkage covers.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Return the tree this linkage covers.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// Return the root's unique id.
    #[must_use]
    pub fn root_uid(&self) -> u64 {
        self.root
    }

    /// Return every entry in unique-id order.
    #[must_use]
    pub fn entries(&self) -> &[LinkEntry] {
        &self.entries
    }

    /// Return the entry with the given unique id.
    ///
    /// # Panics
    ///
    /// Panics when `uid` was not assigned by this linkage.
    #[must_use]
    pub fn entry(&self, uid: u64) -> &LinkEntry {
        &self.entries[(uid - 1) as usize]
    }

    /// Return `(child uid, is_left)` pairs of a node.
    #[must_use]
    pub fn children(&self, uid: u64) -> &[(u64, bool)] {
        self.children.get(&uid).map_or(&[], Vec::as_slice)
    }

    /// Return the unique id at a (level, node id) address.
    #[must_use]
    pub fn uid_of(&self, level: u32, node_id: NodeId) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.node.level == level && e.node.node_id == node_id)
            .map(|e| e.uid)
    }

    /// Return the unique-id path from the root to `uid`, inclusive.
    #[must_use]
    pub fn ancestor_path(&self, uid: u64) -> Vec<u64> {
        let mut path = vec![uid];
        let mut current = uid;
        while let Some(parent) = self.entry(current).parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FeatureId;
    use crate::node::group_by_tree;

    fn node(level: u32, node_id: u64, parent_id: u64, is_left: bool, feature: u32) -> TreeNode {
        TreeNode {
            task: TaskId::new(1),
            tree: TreeId::new(1),
            level,
            node_id: NodeId::new(node_id),
            parent_id: NodeId::new(parent_id),
            is_left,
            split_feature: FeatureId::new(feature),
            split_value: 1.0,
            is_ordinal: true,
            leaf_value: 0.0,
            support: 1,
            impurity_reduction: 0.0,
        }
    }

    fn build(nodes: &[TreeNode]) -> Result<TreeLinkage, IntegrityError> {
        let groups = group_by_tree(nodes);
        let tree_nodes = &groups[&(TaskId::new(1), TreeId::new(1))];
        TreeLinkage::build(TaskId::new(1), TreeId::new(1), tree_nodes)
    }

    /// Root → (left branch → two leaves), (right leaf).
    fn three_level_tree() -> Vec<TreeNode> {
        vec![
            node(1, 1, 0, false, 1),
            node(2, 1, 1, true, 2),
            node(2, 2, 1, false, 0),
            node(3, 1, 1, true, 0),
            node(3, 2, 1, false, 0),
        ]
    }

    #[test]
    fn uids_follow_level_order() {
        let linkage = build(&three_level_tree()).unwrap();
        assert_eq!(linkage.root_uid(), 1);
        let uids: Vec<u64> = linkage.entries().iter().map(|e| e.uid).collect();
        assert_eq!(uids, vec![1, 2, 3, 4, 5]);
        assert_eq!(linkage.uid_of(2, NodeId::new(2)), Some(3));
    }

    #[test]
    fn parent_links_resolve() {
        let linkage = build(&three_level_tree()).unwrap();
        assert_eq!(linkage.entry(1).parent, None);
        assert_eq!(linkage.entry(2).parent, Some(1));
        assert_eq!(linkage.entry(4).parent, Some(2));
        assert_eq!(linkage.children(1), &[(2, true), (3, false)]);
        assert_eq!(linkage.children(2), &[(4, true), (5, false)]);
    }

    #[test]
    fn ancestor_paths_run_root_to_leaf() {
        let linkage = build(&three_level_tree()).unwrap();
        assert_eq!(linkage.ancestor_path(5), vec![1, 2, 5]);
        assert_eq!(linkage.ancestor_path(3), vec![1, 3]);
        assert_eq!(linkage.ancestor_path(1), vec![1]);
    }

    #[test]
    fn duplicate_address_rejected() {
        let mut nodes = three_level_tree();
        nodes.push(node(2, 2, 1, false, 5));
        assert!(matches!(
            build(&nodes),
            Err(IntegrityError::DuplicateNodeId { .. })
        ));
    }

    #[test]
    fn orphaned_parent_rejected() {
        let mut nodes = three_level_tree();
        nodes.push(node(3, 4, 2, false, 0));
        assert!(matches!(
            build(&nodes),
            Err(IntegrityError::OrphanedParent { .. })
        ));
    }

    #[test]
    fn missing_root_rejected() {
        let nodes = vec![node(2, 1, 1, true, 0)];
        // The only node claims a parent at level 1 that does not exist.
        assert!(matches!(
            build(&nodes),
            Err(IntegrityError::OrphanedParent { .. })
        ));
    }

    #[test]
    fn multiple_roots_rejected() {
        let nodes = vec![node(1, 1, 0, false, 1), node(1, 2, 0, false, 2)];
        assert!(matches!(
            build(&nodes),
            Err(IntegrityError::MultipleRoots { .. })
        ));
    }
}
