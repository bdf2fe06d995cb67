//! Turn/round progression stored entirely in the tree
//!
//! There is no in-memory model: every operation reads the `engine` subtree
//! of a container, mutates it in place and relies on the host store to
//! replicate the change. Reads degrade to defaults when nodes are missing,
//! and operations on unknown participants are no-ops.
//!
//! ```text
//! engine
//!   isPlaying      bool
//!   currentIndex   int
//!   round          int (>= 1)
//!   participants
//!     participant
//!       id         string
//!       hasActed   bool
//! ```

mod legacy;

pub use legacy::{migrate_legacy, LEGACY_MIGRATION};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::{NodeId, Scalar, TreeStore};

pub const ENGINE_TAG: &str = "engine";
pub const IS_PLAYING: &str = "isPlaying";
pub const CURRENT_INDEX: &str = "currentIndex";
pub const ROUND: &str = "round";
pub const PARTICIPANTS: &str = "participants";
pub const PARTICIPANT: &str = "participant";
pub const PARTICIPANT_ID: &str = "id";
pub const HAS_ACTED: &str = "hasActed";

/// Snapshot of one participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    pub id: String,
    pub has_acted: bool,
}

/// Snapshot of the whole engine subtree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnState {
    pub is_playing: bool,
    pub current_index: usize,
    pub round: i64,
    pub participants: Vec<ParticipantState>,
}

impl Default for TurnState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_index: 0,
            round: 1,
            participants: Vec::new(),
        }
    }
}

fn engine<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> Option<NodeId> {
    store.child_named(container, ENGINE_TAG)
}

fn live<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> bool {
    if store.contains(container) {
        true
    } else {
        log::debug!("Turn engine container {} is gone; ignoring", container);
        false
    }
}

fn participant_nodes<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> Vec<NodeId> {
    engine(store, container)
        .and_then(|e| store.child_named(e, PARTICIPANTS))
        .map(|p| store.children_named(p, PARTICIPANT))
        .unwrap_or_default()
}

fn participant_id<S: TreeStore + ?Sized>(store: &S, node: NodeId) -> Option<String> {
    store.read_leaf(node, PARTICIPANT_ID).map(|v| v.to_string())
}

fn find_participant<S: TreeStore + ?Sized>(store: &S, container: NodeId, id: &str) -> Option<(usize, NodeId)> {
    participant_nodes(store, container)
        .into_iter()
        .enumerate()
        .find(|(_, node)| participant_id(store, *node).as_deref() == Some(id))
}

fn read_int<S: TreeStore + ?Sized>(store: &S, container: NodeId, name: &str) -> Option<i64> {
    engine(store, container)
        .and_then(|e| store.read_leaf(e, name))
        .and_then(|v| v.as_int())
}

fn write<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, name: &str, value: Scalar) -> Result<()> {
    let engine = store.ensure_child(container, ENGINE_TAG)?;
    store.write_leaf(engine, name, value)?;
    Ok(())
}

pub fn is_playing<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> bool {
    engine(store, container)
        .and_then(|e| store.read_leaf(e, IS_PLAYING))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Stored index, which may point past the list after a removal
pub fn current_index<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> usize {
    read_int(store, container, CURRENT_INDEX)
        .map(|n| n.max(0) as usize)
        .unwrap_or(0)
}

pub fn round<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> i64 {
    read_int(store, container, ROUND).map(|n| n.max(1)).unwrap_or(1)
}

pub fn participants<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> Vec<ParticipantState> {
    participant_nodes(store, container)
        .into_iter()
        .filter_map(|node| {
            let id = participant_id(store, node)?;
            let has_acted = store
                .read_leaf(node, HAS_ACTED)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Some(ParticipantState { id, has_acted })
        })
        .collect()
}

/// Read the full engine state, with defaults for anything missing
pub fn state<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> TurnState {
    TurnState {
        is_playing: is_playing(store, container),
        current_index: current_index(store, container),
        round: round(store, container),
        participants: participants(store, container),
    }
}

/// Id of the participant whose turn it is
pub fn current_participant<S: TreeStore + ?Sized>(store: &S, container: NodeId) -> Option<String> {
    participant_nodes(store, container)
        .get(current_index(store, container))
        .and_then(|node| participant_id(store, *node))
}

/// Overwrite the engine subtree with `state`
pub fn write_state<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, state: &TurnState) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    write(store, container, IS_PLAYING, Scalar::bool(state.is_playing))?;
    write(store, container, CURRENT_INDEX, Scalar::int(state.current_index as i64))?;
    write(store, container, ROUND, Scalar::int(state.round.max(1)))?;
    for node in participant_nodes(store, container) {
        store.delete_node(node)?;
    }
    for p in &state.participants {
        add_participant(store, container, &p.id)?;
        if p.has_acted {
            toggle_has_acted(store, container, &p.id)?;
        }
    }
    Ok(())
}

/// Append a participant; adding an existing id does nothing
pub fn add_participant<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    if !live(store, container) || find_participant(store, container, id).is_some() {
        return Ok(());
    }
    let engine = store.ensure_child(container, ENGINE_TAG)?;
    let list = store.ensure_child(engine, PARTICIPANTS)?;
    let node = store.create_child(list, PARTICIPANT, None)?;
    store.create_child(node, PARTICIPANT_ID, Some(Scalar::string(id)))?;
    store.create_child(node, HAS_ACTED, Some(Scalar::bool(false)))?;
    Ok(())
}

/// Remove a participant. The current index is left alone and re-validated
/// on the next turn change.
pub fn remove_participant<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    if let Some((_, node)) = find_participant(store, container, id) {
        store.delete_node(node)?;
    }
    Ok(())
}

pub fn next_turn<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !is_playing(store, container) {
        return Ok(());
    }
    let count = participant_nodes(store, container).len();
    if count == 0 {
        return Ok(());
    }
    let next = current_index(store, container) + 1;
    if next >= count {
        return next_round(store, container);
    }
    write(store, container, CURRENT_INDEX, Scalar::int(next as i64))
}

pub fn prev_turn<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !is_playing(store, container) {
        return Ok(());
    }
    let count = participant_nodes(store, container).len();
    if count == 0 {
        return Ok(());
    }
    let current = current_index(store, container);
    let index = if current == 0 {
        let round = round(store, container);
        if round > 1 {
            write(store, container, ROUND, Scalar::int(round - 1))?;
            count - 1
        } else {
            0
        }
    } else {
        (current - 1).min(count - 1)
    };
    write(store, container, CURRENT_INDEX, Scalar::int(index as i64))
}

/// Advance the round, rewind to the first participant and clear `hasActed`
pub fn next_round<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    let round = round(store, container);
    write(store, container, ROUND, Scalar::int(round.saturating_add(1)))?;
    write(store, container, CURRENT_INDEX, Scalar::int(0))?;
    for node in participant_nodes(store, container) {
        store.write_leaf(node, HAS_ACTED, Scalar::bool(false))?;
    }
    Ok(())
}

pub fn set_round<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, round: i64) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    write(store, container, ROUND, Scalar::int(round.max(1)))
}

pub fn start<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    write(store, container, IS_PLAYING, Scalar::bool(true))?;
    write(store, container, CURRENT_INDEX, Scalar::int(0))?;
    if read_int(store, container, ROUND).is_none() {
        write(store, container, ROUND, Scalar::int(1))?;
    }
    Ok(())
}

/// Stop play. Participants and round stay for post-combat inspection.
pub fn stop<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    write(store, container, IS_PLAYING, Scalar::bool(false))
}

/// Back to round 1 with an empty participant list
pub fn reset<S: TreeStore + ?Sized>(store: &mut S, container: NodeId) -> Result<()> {
    if !live(store, container) {
        return Ok(());
    }
    write(store, container, CURRENT_INDEX, Scalar::int(0))?;
    write(store, container, ROUND, Scalar::int(1))?;
    for node in participant_nodes(store, container) {
        store.delete_node(node)?;
    }
    Ok(())
}

pub fn toggle_has_acted<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    if let Some((_, node)) = find_participant(store, container, id) {
        let acted = store
            .read_leaf(node, HAS_ACTED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        store.write_leaf(node, HAS_ACTED, Scalar::bool(!acted))?;
    }
    Ok(())
}

pub fn set_turn_to_character<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    if let Some((position, _)) = find_participant(store, container, id) {
        write(store, container, CURRENT_INDEX, Scalar::int(position as i64))?;
    }
    Ok(())
}

pub fn move_participant_up<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    shift(store, container, id, -1)
}

pub fn move_participant_down<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str) -> Result<()> {
    shift(store, container, id, 1)
}

fn shift<S: TreeStore + ?Sized>(store: &mut S, container: NodeId, id: &str, delta: isize) -> Result<()> {
    let Some((position, _)) = find_participant(store, container, id) else {
        return Ok(());
    };
    let nodes = participant_nodes(store, container);
    let target = position as isize + delta;
    if target < 0 || target as usize >= nodes.len() {
        return Ok(());
    }
    let Some(list) = engine(store, container).and_then(|e| store.child_named(e, PARTICIPANTS)) else {
        return Ok(());
    };
    // Positions in the raw child list, which may hold unrelated nodes
    let raw = store.children(list);
    let a = raw.iter().position(|n| *n == nodes[position]);
    let b = raw.iter().position(|n| *n == nodes[target as usize]);
    if let (Some(a), Some(b)) = (a, b) {
        store.swap_children(list, a, b)?;
    }
    Ok(())
}
