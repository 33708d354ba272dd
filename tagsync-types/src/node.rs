//! Browsed address-space nodes.
//!
//! A browse returns a forest of [`NodeTreeEntry`] values. Every entry owns
//! its children outright, so `Clone` is a full structural copy and two
//! clones can never observe each other's mutations.

use crate::TagValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The class of an address-space node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// A folder or object that groups other nodes.
    Object,
    /// A node holding a typed live value.
    Variable,
    /// A callable method node.
    Method,
    /// Any other node class reported by the source.
    Other,
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeClass::Object => "Object",
            NodeClass::Variable => "Variable",
            NodeClass::Method => "Method",
            NodeClass::Other => "Other",
        };
        f.write_str(s)
    }
}

/// One node of a browsed subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTreeEntry {
    /// Identifier, unique within one endpoint.
    pub node_id: String,
    /// Human readable name.
    pub display_name: String,
    /// Node class.
    pub node_class: NodeClass,
    /// Declared value type name, for variables.
    pub data_type: Option<String>,
    /// Last value read during the browse.
    pub value: Option<TagValue>,
    /// Whether the source reports children for this node, even if they were
    /// not fetched because of the browse depth.
    pub has_children: bool,
    /// Fetched children, owned by this node.
    pub children: Vec<NodeTreeEntry>,
    /// Transient selection mark. Never part of a cached snapshot.
    #[serde(default)]
    pub selected: bool,
}

impl NodeTreeEntry {
    /// Creates an object (folder) node with no children yet.
    pub fn object(node_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            display_name: display_name.into(),
            node_class: NodeClass::Object,
            data_type: None,
            value: None,
            has_children: false,
            children: Vec::new(),
            selected: false,
        }
    }

    /// Creates a variable node of the given declared type.
    pub fn variable(
        node_id: impl Into<String>,
        display_name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            display_name: display_name.into(),
            node_class: NodeClass::Variable,
            data_type: Some(data_type.into()),
            value: None,
            has_children: false,
            children: Vec::new(),
            selected: false,
        }
    }

    /// Sets the last-read value.
    #[must_use]
    pub fn with_value(mut self, value: TagValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Appends a child and marks this node as having children.
    #[must_use]
    pub fn with_child(mut self, child: NodeTreeEntry) -> Self {
        self.has_children = true;
        self.children.push(child);
        self
    }

    /// A leaf has no fetched children and the source reports none.
    pub fn is_leaf(&self) -> bool {
        !self.has_children && self.children.is_empty()
    }

    /// Deep copy with every `selected` flag in the subtree reset.
    #[must_use]
    pub fn cleared_clone(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            display_name: self.display_name.clone(),
            node_class: self.node_class,
            data_type: self.data_type.clone(),
            value: self.value.clone(),
            has_children: self.has_children,
            children: self.children.iter().map(Self::cleared_clone).collect(),
            selected: false,
        }
    }

    /// Visits this node and its descendants depth-first, parents last.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut NodeTreeEntry)) {
        for child in &mut self.children {
            child.walk_mut(visit);
        }
        visit(self);
    }

    /// Number of nodes in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Self::subtree_len).sum::<usize>()
    }

    /// Finds a node by id in this subtree.
    pub fn find(&self, node_id: &str) -> Option<&NodeTreeEntry> {
        if self.node_id == node_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(node_id))
    }
}
