//! Walk an initiative tracker through a couple of rounds
//!
//! Run with: RUST_LOG=debug cargo run --bin turn_demo [config.json]

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Context;
use tabletop_sync::{turn, MemoryTree, Session, SyncConfig, TreeStore};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => SyncConfig::default(),
    };
    let mut session = Session::with_store(MemoryTree::new(), config);

    let notifications = Rc::new(Cell::new(0usize));
    let counter = notifications.clone();
    let subscription = session.observe("initiative", "main", move |store, container| {
        counter.set(counter.get() + 1);
        if let Some(c) = container {
            log::info!(
                "round {} -> {:?}",
                turn::round(&*store, c),
                turn::current_participant(&*store, c)
            );
        }
    });

    let tracker = session.get_or_create_container("initiative", "main")?;
    for id in ["Aria", "Borin", "Goblin"] {
        turn::add_participant(session.store_mut(), tracker, id)?;
    }
    turn::start(session.store_mut(), tracker)?;
    session.dispatch();

    for _ in 0..4 {
        turn::next_turn(session.store_mut(), tracker)?;
        session.dispatch();
    }

    // Simulate a reload: many writes, one notification
    session.store_mut().begin_bulk_load();
    turn::move_participant_up(session.store_mut(), tracker, "Goblin")?;
    turn::toggle_has_acted(session.store_mut(), tracker, "Aria")?;
    session.store_mut().end_bulk_load();
    let before = notifications.get();
    session.dispatch();

    let state = turn::state(session.store(), tracker);
    println!("{}", serde_json::to_string_pretty(&state)?);
    println!(
        "{} notifications ({} for the bulk load)",
        notifications.get(),
        notifications.get() - before
    );

    subscription.unsubscribe();
    Ok(())
}
