//! Upgrade of the flat pre-`engine` layout
//!
//! Older clients stored the turn order directly on the container:
//! `isPlaying`, `currentIndex` and `round` leaves next to a `turnOrder` leaf
//! holding comma-separated participant ids. Acted flags were not persisted.

use super::{ParticipantState, TurnState, CURRENT_INDEX, ENGINE_TAG, IS_PLAYING, ROUND};
use crate::error::Result;
use crate::tree::{NodeId, TreeStore};

pub const LEGACY_MIGRATION: &str = "turn-engine-structured";

const TURN_ORDER: &str = "turnOrder";

const LEGACY_FIELDS: [&str; 4] = [IS_PLAYING, CURRENT_INDEX, ROUND, TURN_ORDER];

/// Rewrite a legacy container into the `engine` subtree.
///
/// Returns `true` if legacy fields were found. If an `engine` subtree is
/// already present (another peer migrated first) it wins and the old fields
/// are only removed.
pub fn migrate_legacy<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<bool> {
    let old: Vec<NodeId> = LEGACY_FIELDS
        .iter()
        .flat_map(|name| store.children_named(container, name))
        .collect();
    if old.is_empty() {
        return Ok(false);
    }

    if store.child_named(container, ENGINE_TAG).is_none() {
        let state = read_legacy(store, container);
        log::debug!(
            "Upgrading container {} with {} participants",
            container,
            state.participants.len()
        );
        super::write_state(store, container, &state)?;
    }

    for node in old {
        store.delete_node(node)?;
    }
    Ok(true)
}

fn read_legacy<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> TurnState {
    let leaf = |name: &str| store.read_leaf(container, name);
    let participants = leaf(TURN_ORDER)
        .map(|v| v.to_string())
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| ParticipantState {
            id: id.to_string(),
            has_acted: false,
        })
        .collect();

    TurnState {
        is_playing: leaf(IS_PLAYING).and_then(|v| v.as_bool()).unwrap_or(false),
        current_index: leaf(CURRENT_INDEX)
            .and_then(|v| v.as_int())
            .map(|n| n.max(0) as usize)
            .unwrap_or(0),
        round: leaf(ROUND).and_then(|v| v.as_int()).unwrap_or(1).max(1),
        participants,
    }
}
