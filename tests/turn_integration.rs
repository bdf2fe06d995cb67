//! Turn engine driven end to end through a `Session`: play through rounds,
//! observers watching the tracker, legacy upgrade and persisted state.
//!
//! Run with:
//!   cargo test --test turn_integration

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tabletop_sync::turn::{self, ParticipantState, TurnState};
use tabletop_sync::{CodecOptions, NodeId, Scalar, Session, TreeStore};

// ---- Helpers ----

fn tracker_with(ids: &[&str]) -> (Session, NodeId) {
    let mut session = Session::new();
    let c = session.get_or_create_container("initiative", "main").unwrap();
    for id in ids {
        turn::add_participant(session.store_mut(), c, id).unwrap();
    }
    session.dispatch();
    (session, c)
}

fn ids(session: &Session, c: NodeId) -> Vec<String> {
    turn::participants(session.store(), c)
        .into_iter()
        .map(|p| p.id)
        .collect()
}

// ---- Play ----

#[test]
fn full_round_wraps_and_clears_acted_flags() {
    let (mut session, c) = tracker_with(&["A", "B", "C"]);
    turn::start(session.store_mut(), c).unwrap();

    turn::toggle_has_acted(session.store_mut(), c, "A").unwrap();
    turn::next_turn(session.store_mut(), c).unwrap();
    turn::toggle_has_acted(session.store_mut(), c, "B").unwrap();
    turn::next_turn(session.store_mut(), c).unwrap();
    assert_eq!(turn::current_participant(session.store(), c).as_deref(), Some("C"));

    turn::next_turn(session.store_mut(), c).unwrap();

    let state = turn::state(session.store(), c);
    assert_eq!(state.round, 2);
    assert_eq!(state.current_index, 0);
    assert!(state.participants.iter().all(|p| !p.has_acted));
}

#[test]
fn prev_turn_at_start_of_round_steps_back_a_round() {
    let (mut session, c) = tracker_with(&["A", "B"]);
    turn::start(session.store_mut(), c).unwrap();
    turn::set_round(session.store_mut(), c, 3).unwrap();

    turn::prev_turn(session.store_mut(), c).unwrap();
    assert_eq!(turn::round(session.store(), c), 2);
    assert_eq!(turn::current_participant(session.store(), c).as_deref(), Some("B"));
}

#[test]
fn removing_the_last_participant_is_revalidated_on_next_turn() {
    let (mut session, c) = tracker_with(&["A", "B", "C"]);
    turn::start(session.store_mut(), c).unwrap();
    turn::set_turn_to_character(session.store_mut(), c, "C").unwrap();
    turn::remove_participant(session.store_mut(), c, "C").unwrap();

    // The stale index is kept until the next turn change
    assert_eq!(turn::current_index(session.store(), c), 2);
    assert_eq!(turn::current_participant(session.store(), c), None);

    turn::next_turn(session.store_mut(), c).unwrap();
    assert_eq!(turn::round(session.store(), c), 2);
    assert_eq!(turn::current_participant(session.store(), c).as_deref(), Some("A"));
}

#[test]
fn reordering_keeps_ids_and_flags() {
    let (mut session, c) = tracker_with(&["A", "B", "C"]);
    turn::toggle_has_acted(session.store_mut(), c, "C").unwrap();

    turn::move_participant_up(session.store_mut(), c, "C").unwrap();
    turn::move_participant_up(session.store_mut(), c, "C").unwrap();
    turn::move_participant_up(session.store_mut(), c, "C").unwrap();
    assert_eq!(ids(&session, c), vec!["C", "A", "B"]);

    turn::move_participant_down(session.store_mut(), c, "A").unwrap();
    assert_eq!(ids(&session, c), vec!["C", "B", "A"]);

    let first = &turn::participants(session.store(), c)[0];
    assert!(first.has_acted);
}

#[test]
fn adding_twice_keeps_one_entry() {
    let (mut session, c) = tracker_with(&["A"]);
    turn::add_participant(session.store_mut(), c, "A").unwrap();
    assert_eq!(ids(&session, c), vec!["A"]);
}

// ---- Observers ----

#[test]
fn observer_sees_each_turn_change() {
    let (mut session, c) = tracker_with(&["A", "B"]);
    let turns = Rc::new(RefCell::new(Vec::new()));
    let sink = turns.clone();
    session.observe("initiative", "main", move |store, container| {
        if let Some(container) = container {
            sink.borrow_mut().push(turn::current_participant(&*store, container));
        }
    });

    turn::start(session.store_mut(), c).unwrap();
    session.dispatch();
    turns.borrow_mut().clear();

    turn::next_turn(session.store_mut(), c).unwrap();
    session.dispatch();
    assert_eq!(turns.borrow().last().cloned().flatten().as_deref(), Some("B"));
}

#[test]
fn bulk_rewrite_of_state_notifies_once() {
    let (mut session, c) = tracker_with(&[]);
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    session.observe("initiative", "main", move |_, _| *sink.borrow_mut() += 1);

    let state = TurnState {
        is_playing: true,
        current_index: 1,
        round: 4,
        participants: vec![
            ParticipantState { id: "A".into(), has_acted: true },
            ParticipantState { id: "B".into(), has_acted: false },
        ],
    };
    session.store_mut().begin_bulk_load();
    turn::write_state(session.store_mut(), c, &state).unwrap();
    session.store_mut().end_bulk_load();
    session.dispatch();

    assert_eq!(*count.borrow(), 1);
    assert_eq!(turn::state(session.store(), c), state);
}

// ---- Legacy layout ----

#[test]
fn legacy_tracker_upgrades_once_and_keeps_playing() {
    let mut session = Session::new();
    let c = session.get_or_create_container("initiative", "main").unwrap();
    let store = session.store_mut();
    store.create_child(c, "isPlaying", Some(Scalar::string("true"))).unwrap();
    store.create_child(c, "currentIndex", Some(Scalar::string("1"))).unwrap();
    store.create_child(c, "round", Some(Scalar::string("3"))).unwrap();
    store.create_child(c, "turnOrder", Some(Scalar::string("Aria, Borin,Goblin"))).unwrap();

    session.migrate_turn_engine(c).unwrap();
    session.migrate_turn_engine(c).unwrap();

    assert!(session.store().child_named(c, "turnOrder").is_none());
    assert_eq!(ids(&session, c), vec!["Aria", "Borin", "Goblin"]);
    assert_eq!(turn::current_participant(session.store(), c).as_deref(), Some("Borin"));

    turn::next_turn(session.store_mut(), c).unwrap();
    assert_eq!(turn::current_participant(session.store(), c).as_deref(), Some("Goblin"));
    assert_eq!(turn::round(session.store(), c), 3);
}

// ---- Persistence ----

#[test]
fn turn_state_survives_save_and_load() {
    let (mut session, c) = tracker_with(&["A", "B"]);
    turn::start(session.store_mut(), c).unwrap();
    turn::next_turn(session.store_mut(), c).unwrap();
    let state = turn::state(session.store(), c);

    let options = CodecOptions::new().array_items("participants", "participant");
    let snapshot = session.save_as(c, "savedTurn", &state, &options).unwrap();
    assert_eq!(session.store().children_named(snapshot, "participant").len(), 2);

    let restored: TurnState = session.load_as(c, "savedTurn", &options).unwrap();
    assert_eq!(restored, state);
}

#[test]
fn numeric_participant_ids_survive_save_and_load() {
    let (mut session, c) = tracker_with(&["42", "true", "7.5"]);
    turn::start(session.store_mut(), c).unwrap();
    let state = turn::state(session.store(), c);

    let options = CodecOptions::new().array_items("participants", "participant");
    session.save_as(c, "savedTurn", &state, &options).unwrap();

    let restored: Option<TurnState> = session.load_as(c, "savedTurn", &options);
    assert_eq!(restored, Some(state));
}

#[test]
fn free_form_notes_round_trip_through_the_tree() {
    let mut session = Session::new();
    let c = session.get_or_create_container("notes", "main").unwrap();
    let options = CodecOptions::new()
        .attribute("author")
        .array_items("tags", "tag");
    let note = json!({
        "author": "gm",
        "body": "The door is trapped",
        "tags": ["secret"],
        "pinned": true
    });

    let saved = session.save(c, "note", &note, &options).unwrap();
    assert_eq!(
        session.store().node(saved).and_then(|n| n.attribute("author")).cloned(),
        Some(Scalar::string("gm"))
    );
    assert_eq!(session.load(c, "note", &options), Some(note));
}
