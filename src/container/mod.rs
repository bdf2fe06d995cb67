//! Container registry
//!
//! A container is a root node that namespaces one feature instance's state
//! inside the shared tree. It is addressed by a `(featureId, instanceHint)`
//! pair carried as two attributes on the root.
//!
//! Containers are only created on first write. Two peers racing through
//! [`get_or_create`] can both create one before replication settles; this
//! module does not resolve that, but [`find`] always prefers the lowest id so
//! every peer converges on the same pick once both are visible.

use crate::error::Result;
use crate::tree::{Node, NodeId, Scalar, TreeStore};

pub const FEATURE_ID_ATTR: &str = "featureId";
pub const INSTANCE_HINT_ATTR: &str = "instanceHint";

/// Default tag for newly created container roots
pub const DEFAULT_CONTAINER_TAG: &str = "container";

/// Address of a feature instance's container
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    pub feature_id: String,
    pub instance_hint: String,
}

impl ContainerKey {
    pub fn new(feature_id: impl Into<String>, instance_hint: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            instance_hint: instance_hint.into(),
        }
    }

    /// Whether `node` is a root carrying this key
    pub fn matches(&self, node: &Node) -> bool {
        is_container(node, &self.feature_id, &self.instance_hint)
    }
}

/// Whether `node` is a root tagged with the given feature and instance
pub fn is_container(node: &Node, feature_id: &str, instance_hint: &str) -> bool {
    node.is_root()
        && attr_eq(node.attribute(FEATURE_ID_ATTR), feature_id)
        && attr_eq(node.attribute(INSTANCE_HINT_ATTR), instance_hint)
}

// Attribute values may come back from the wire retyped, so compare by text
fn attr_eq(attr: Option<&Scalar>, expected: &str) -> bool {
    match attr {
        Some(Scalar::Str(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

/// Every live container for the pair, lowest id first
pub fn find_all<S: TreeStore + ?Sized>(store: &S, feature_id: &str, instance_hint: &str) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = store
        .roots()
        .into_iter()
        .filter(|id| {
            store
                .node(*id)
                .map(|n| is_container(n, feature_id, instance_hint))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

/// Locate the container for the pair, if one exists yet
pub fn find<S: TreeStore + ?Sized>(store: &S, feature_id: &str, instance_hint: &str) -> Option<NodeId> {
    let found = find_all(store, feature_id, instance_hint);
    if found.len() > 1 {
        log::warn!(
            "{} containers for ({}, {}); using {}",
            found.len(),
            feature_id,
            instance_hint,
            found[0]
        );
    }
    found.first().copied()
}

/// Find the container, creating it under the default tag if absent
pub fn get_or_create<S: TreeStore + ?Sized>(store: &mut S, feature_id: &str, instance_hint: &str) -> Result<NodeId> {
    get_or_create_tagged(store, DEFAULT_CONTAINER_TAG, feature_id, instance_hint)
}

/// Like [`get_or_create`] with an explicit node name for new roots
pub fn get_or_create_tagged<S: TreeStore + ?Sized>(
    store: &mut S,
    tag: &str,
    feature_id: &str,
    instance_hint: &str,
) -> Result<NodeId> {
    if let Some(id) = find(&*store, feature_id, instance_hint) {
        return Ok(id);
    }
    let id = store.create_root(tag);
    store.set_attribute(id, FEATURE_ID_ATTR, Scalar::string(feature_id))?;
    store.set_attribute(id, INSTANCE_HINT_ATTR, Scalar::string(instance_hint))?;
    log::debug!("Created container {} for ({}, {})", id, feature_id, instance_hint);
    Ok(id)
}

/// Relation test: is `node_id` the container itself or one of its descendants?
///
/// Walks parent links upward, so a node relocated between containers is
/// judged by where it hangs now. A deleted container relates to nothing.
pub fn is_related<S: TreeStore + ?Sized>(store: &S, container: NodeId, node_id: NodeId) -> bool {
    if !store.contains(container) {
        return false;
    }
    if node_id == container {
        return true;
    }
    if !store.contains(node_id) {
        return false;
    }
    store.ancestors(node_id).contains(&container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryTree;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut tree = MemoryTree::new();
        let first = get_or_create(&mut tree, "initiative", "main").unwrap();
        let second = get_or_create(&mut tree, "initiative", "main").unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn test_find_distinguishes_instances() {
        let mut tree = MemoryTree::new();
        let a = get_or_create(&mut tree, "notes", "a").unwrap();
        let b = get_or_create(&mut tree, "notes", "b").unwrap();
        assert_ne!(a, b);
        assert_eq!(find(&tree, "notes", "b"), Some(b));
        assert_eq!(find(&tree, "dice", "a"), None);
    }

    #[test]
    fn test_find_ignores_nested_nodes_with_matching_attributes() {
        let mut tree = MemoryTree::new();
        let root = tree.create_root("other");
        let nested = tree.create_child(root, "container", None).unwrap();
        tree.set_attribute(nested, FEATURE_ID_ATTR, Scalar::string("notes")).unwrap();
        tree.set_attribute(nested, INSTANCE_HINT_ATTR, Scalar::string("a")).unwrap();
        assert_eq!(find(&tree, "notes", "a"), None);
    }

    #[test]
    fn test_duplicates_resolve_to_lowest_id() {
        let mut tree = MemoryTree::new();
        let make = |tree: &mut MemoryTree| {
            let id = tree.create_root("container");
            tree.set_attribute(id, FEATURE_ID_ATTR, Scalar::string("map")).unwrap();
            tree.set_attribute(id, INSTANCE_HINT_ATTR, Scalar::string("1")).unwrap();
            id
        };
        let first = make(&mut tree);
        let second = make(&mut tree);
        assert_eq!(find_all(&tree, "map", "1"), vec![first, second]);
        assert_eq!(find(&tree, "map", "1"), Some(first));
    }

    #[test]
    fn test_numeric_hint_matches_by_text() {
        let mut tree = MemoryTree::new();
        let id = tree.create_root("container");
        tree.set_attribute(id, FEATURE_ID_ATTR, Scalar::string("map")).unwrap();
        tree.set_attribute(id, INSTANCE_HINT_ATTR, Scalar::int(3)).unwrap();
        assert_eq!(find(&tree, "map", "3"), Some(id));
    }

    #[test]
    fn test_is_related() {
        let mut tree = MemoryTree::new();
        let container = get_or_create(&mut tree, "combat", "main").unwrap();
        let other = get_or_create(&mut tree, "combat", "side").unwrap();
        let engine = tree.create_child(container, "engine", None).unwrap();
        let leaf = tree.create_child(engine, "round", Some(Scalar::int(1))).unwrap();
        let stranger = tree.create_child(other, "x", None).unwrap();

        assert!(is_related(&tree, container, container));
        assert!(is_related(&tree, container, leaf));
        assert!(!is_related(&tree, container, stranger));
        assert!(!is_related(&tree, container, NodeId(1000)));
    }

    #[test]
    fn test_is_related_follows_relocation() {
        let mut tree = MemoryTree::new();
        let left = get_or_create(&mut tree, "f", "left").unwrap();
        let right = get_or_create(&mut tree, "f", "right").unwrap();
        let branch = tree.create_child(left, "branch", None).unwrap();
        let leaf = tree.create_child(branch, "leaf", None).unwrap();

        assert!(is_related(&tree, left, leaf));
        tree.move_node(branch, right).unwrap();
        assert!(!is_related(&tree, left, leaf));
        assert!(is_related(&tree, right, leaf));
    }

    #[test]
    fn test_deleted_container_relates_to_nothing() {
        let mut tree = MemoryTree::new();
        let container = get_or_create(&mut tree, "f", "x").unwrap();
        tree.delete_node(container).unwrap();
        assert!(!is_related(&tree, container, container));
    }
}
