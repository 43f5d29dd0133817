//! Identifier newtypes shared across the forest engine.

use std::fmt;

/// Identifier of one independent training task (response variable × feature subset).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct TaskId(u32);

impl TaskId {
    /// Create a new task identifier.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw task identifier.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one tree within a forest, shared across tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct TreeId(u32);

impl TreeId {
    /// Create a new tree identifier.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw tree identifier.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one original record in a task's training set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct RecordId(u64);

impl RecordId {
    /// Create a new record identifier.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the raw record identifier.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-based feature number. Zero is reserved: on an input row it is invalid,
/// and on a [`TreeNode`](crate::TreeNode) it marks a leaf.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureId(u32);

impl FeatureId {
    /// Reserved feature number marking a leaf node.
    pub const SENTINEL: Self = Self(0);

    /// Create a new feature number.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw feature number.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Return `true` if this is the reserved leaf-marker value.
    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Level-local node identifier with deterministic child addressing.
///
/// Within one (task, tree, level) the identifier is unique. The root is 1,
/// and a node `n` addresses its children at the next level as `2n-1` (left)
/// and `2n` (right), so child identity is derivable without extra state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(u64);

impl NodeId {
    /// The root node identifier (level 1).
    pub const ROOT: Self = Self(1);

    /// The null identifier, used as the root's parent reference.
    pub const NULL: Self = Self(0);

    /// Create a new node identifier.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the raw node identifier.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Return the left-child identifier at the next level (`2n-1`).
    #[must_use]
    pub fn left_child(self) -> Self {
        Self(2 * self.0 - 1)
    }

    /// Return the right-child identifier at the next level (`2n`).
    #[must_use]
    pub fn right_child(self) -> Self {
        Self(2 * self.0)
    }

    /// Return `true` if this is the null (root-parent) identifier.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
