//! Shared document tree
//!
//! The tree is the unit of replication: every feature persists its state as
//! named, valued, attributed nodes. The store itself (and the peer
//! replication behind it) belongs to the host; this module defines the seam
//! the rest of the crate talks to, plus an arena-backed in-memory host.
//!
//! Mutations never call back into observers directly. Every mutation
//! appends a [`TreeEvent`] to the store's queue, and the observer service
//! drains that queue when it dispatches.

mod memory;
mod scalar;

pub use memory::MemoryTree;
pub use scalar::Scalar;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SyncError};

/// Identifier of a node in the store. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live node as seen through the store
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub value: Option<Scalar>,
    pub attributes: BTreeMap<String, Scalar>,
    pub children: Vec<NodeId>,
    /// Non-owning back-reference; `None` for roots
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn attribute(&self, key: &str) -> Option<&Scalar> {
        self.attributes.get(key)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A detached, owned tree fragment.
///
/// Produced by the codec and by [`TreeStore::snapshot`], consumed by
/// [`TreeStore::graft`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Scalar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn leaf(name: impl Into<String>, value: Scalar) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// One entry of the global mutation stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEvent {
    Added { node: NodeId },
    Updated { node: NodeId },
    /// `parent` is where the node hung before it was removed
    Deleted { node: NodeId, parent: Option<NodeId> },
    BulkLoadBegin,
    BulkLoadComplete,
}

/// Tree primitives a host store must provide
pub trait TreeStore {
    /// Resolve a node by id; `None` once deleted
    fn node(&self, id: NodeId) -> Option<&Node>;

    /// All live root nodes, in creation order
    fn roots(&self) -> Vec<NodeId>;

    /// Register a new root node in the shared store
    fn create_root(&mut self, name: &str) -> NodeId;

    /// Append a new child to `parent`
    fn create_child(&mut self, parent: NodeId, name: &str, value: Option<Scalar>) -> Result<NodeId>;

    fn set_value(&mut self, id: NodeId, value: Option<Scalar>) -> Result<()>;

    fn set_attribute(&mut self, id: NodeId, key: &str, value: Scalar) -> Result<()>;

    fn remove_attribute(&mut self, id: NodeId, key: &str) -> Result<()>;

    /// Relocate `id` (with its subtree) to the end of `new_parent`'s children.
    /// Raises `Updated` for the node and then for its former parent.
    fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> Result<()>;

    /// Swap two children of `parent` by position
    fn swap_children(&mut self, parent: NodeId, a: usize, b: usize) -> Result<()>;

    /// Delete `id` and its whole subtree
    fn delete_node(&mut self, id: NodeId) -> Result<()>;

    /// Signal the start of a large structural replacement
    fn begin_bulk_load(&mut self);

    /// Signal the end of a large structural replacement
    fn end_bulk_load(&mut self);

    /// Pop the oldest pending mutation event
    fn next_event(&mut self) -> Option<TreeEvent>;

    /// Number of events waiting in the queue
    fn pending_events(&self) -> usize;

    fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn value(&self, id: NodeId) -> Option<Scalar> {
        self.node(id).and_then(|n| n.value.clone())
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// First child of `parent` with the given name
    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let node = self.node(parent)?;
        node.children
            .iter()
            .copied()
            .find(|c| self.node(*c).map(|n| n.name == name).unwrap_or(false))
    }

    fn children_named(&self, parent: NodeId, name: &str) -> Vec<NodeId> {
        self.children(parent)
            .into_iter()
            .filter(|c| self.node(*c).map(|n| n.name == name).unwrap_or(false))
            .collect()
    }

    /// Parent chain of `id`, nearest first
    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            // A cycle would be a store bug; stop rather than spin
            if chain.contains(&p) {
                break;
            }
            chain.push(p);
            current = self.parent(p);
        }
        chain
    }

    /// Child named `name`, created on first use
    fn ensure_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        match self.child_named(parent, name) {
            Some(id) => Ok(id),
            None => self.create_child(parent, name, None),
        }
    }

    /// Write a scalar leaf under `parent`, creating it on first write.
    /// Unchanged values are left alone so no event is raised.
    fn write_leaf(&mut self, parent: NodeId, name: &str, value: Scalar) -> Result<NodeId> {
        match self.child_named(parent, name) {
            Some(id) => {
                if self.value(id).as_ref() != Some(&value) {
                    self.set_value(id, Some(value))?;
                }
                Ok(id)
            }
            None => self.create_child(parent, name, Some(value)),
        }
    }

    /// Read the scalar leaf `name` under `parent`
    fn read_leaf(&self, parent: NodeId, name: &str) -> Option<Scalar> {
        self.child_named(parent, name).and_then(|c| self.value(c))
    }

    /// Copy a detached fragment under `parent` (or as a new root)
    fn graft(&mut self, parent: Option<NodeId>, element: &Element) -> Result<NodeId> {
        let id = match parent {
            Some(p) => self.create_child(p, &element.name, element.value.clone())?,
            None => {
                let id = self.create_root(&element.name);
                if element.value.is_some() {
                    self.set_value(id, element.value.clone())?;
                }
                id
            }
        };
        for (key, value) in &element.attributes {
            self.set_attribute(id, key, value.clone())?;
        }
        for child in &element.children {
            self.graft(Some(id), child)?;
        }
        Ok(id)
    }

    /// Export the subtree rooted at `id` as a detached fragment
    fn snapshot(&self, id: NodeId) -> Option<Element> {
        let node = self.node(id)?;
        Some(Element {
            name: node.name.clone(),
            value: node.value.clone(),
            attributes: node.attributes.clone(),
            children: node
                .children
                .iter()
                .filter_map(|c| self.snapshot(*c))
                .collect(),
        })
    }

    /// Require a live node, for primitives that cannot act on absence
    fn require(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(SyncError::NodeNotFound(id))
    }
}
