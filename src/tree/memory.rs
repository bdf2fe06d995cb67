//! Arena-backed in-memory tree store
//!
//! Nodes live in a flat table indexed by [`NodeId`]; parent and child links
//! are ids into that table, so there are no ownership cycles. Deleted slots
//! stay empty and ids are never handed out twice.

use std::collections::VecDeque;

use super::{Node, NodeId, Scalar, TreeEvent, TreeStore};
use crate::error::{Result, SyncError};

/// In-process host for the shared tree
#[derive(Debug, Default)]
pub struct MemoryTree {
    slots: Vec<Option<Node>>,
    roots: Vec<NodeId>,
    events: VecDeque<TreeEvent>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all queued events without delivering them
    pub fn discard_events(&mut self) -> usize {
        let n = self.events.len();
        self.events.clear();
        n
    }

    fn alloc(&mut self, name: &str, value: Option<Scalar>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.slots.len() as u64);
        self.slots.push(Some(Node {
            id,
            name: name.to_string(),
            value,
            attributes: Default::default(),
            children: Vec::new(),
            parent,
        }));
        id
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(SyncError::NodeNotFound(id))
    }

    fn detach(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        let parent = self.require(id)?.parent;
        match parent {
            Some(p) => {
                let parent_node = self.slot_mut(p)?;
                parent_node.children.retain(|c| *c != id);
            }
            None => self.roots.retain(|r| *r != id),
        }
        Ok(parent)
    }

    /// Subtree ids, descendants before their parent
    fn post_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.node(id) {
            for child in &node.children {
                self.post_order(*child, out);
            }
            out.push(id);
        }
    }
}

impl TreeStore for MemoryTree {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    fn roots(&self) -> Vec<NodeId> {
        self.roots.clone()
    }

    fn create_root(&mut self, name: &str) -> NodeId {
        let id = self.alloc(name, None, None);
        self.roots.push(id);
        self.events.push_back(TreeEvent::Added { node: id });
        id
    }

    fn create_child(&mut self, parent: NodeId, name: &str, value: Option<Scalar>) -> Result<NodeId> {
        self.require(parent)?;
        let id = self.alloc(name, value, Some(parent));
        self.slot_mut(parent)?.children.push(id);
        self.events.push_back(TreeEvent::Added { node: id });
        Ok(id)
    }

    fn set_value(&mut self, id: NodeId, value: Option<Scalar>) -> Result<()> {
        self.slot_mut(id)?.value = value;
        self.events.push_back(TreeEvent::Updated { node: id });
        Ok(())
    }

    fn set_attribute(&mut self, id: NodeId, key: &str, value: Scalar) -> Result<()> {
        self.slot_mut(id)?.attributes.insert(key.to_string(), value);
        self.events.push_back(TreeEvent::Updated { node: id });
        Ok(())
    }

    fn remove_attribute(&mut self, id: NodeId, key: &str) -> Result<()> {
        if self.slot_mut(id)?.attributes.remove(key).is_some() {
            self.events.push_back(TreeEvent::Updated { node: id });
        }
        Ok(())
    }

    fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        self.require(id)?;
        self.require(new_parent)?;
        if id == new_parent || self.ancestors(new_parent).contains(&id) {
            return Err(SyncError::InvalidMove { node: id, target: new_parent });
        }
        let old_parent = self.detach(id)?;
        self.slot_mut(new_parent)?.children.push(id);
        self.slot_mut(id)?.parent = Some(new_parent);
        self.events.push_back(TreeEvent::Updated { node: id });
        // The subtree that lost the node changed too
        if let Some(p) = old_parent.filter(|p| *p != new_parent) {
            self.events.push_back(TreeEvent::Updated { node: p });
        }
        Ok(())
    }

    fn swap_children(&mut self, parent: NodeId, a: usize, b: usize) -> Result<()> {
        let node = self.slot_mut(parent)?;
        if a >= node.children.len() || b >= node.children.len() || a == b {
            return Ok(());
        }
        node.children.swap(a, b);
        self.events.push_back(TreeEvent::Updated { node: parent });
        Ok(())
    }

    fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)?;
        let mut doomed = Vec::new();
        self.post_order(id, &mut doomed);
        for node_id in doomed {
            if let Some(node) = self.slots.get_mut(node_id.0 as usize).and_then(|s| s.take()) {
                self.events.push_back(TreeEvent::Deleted {
                    node: node_id,
                    parent: node.parent,
                });
            }
        }
        Ok(())
    }

    fn begin_bulk_load(&mut self) {
        self.events.push_back(TreeEvent::BulkLoadBegin);
    }

    fn end_bulk_load(&mut self) {
        self.events.push_back(TreeEvent::BulkLoadComplete);
    }

    fn next_event(&mut self) -> Option<TreeEvent> {
        self.events.pop_front()
    }

    fn pending_events(&self) -> usize {
        self.events.len()
    }
}
