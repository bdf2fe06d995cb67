//! Once-per-process schema migrations
//!
//! Containers written by an older schema are upgraded by reading the old
//! shape once, writing the new shape, and deleting the old fields. The ledger
//! makes sure a given migration is attempted at most once per container for
//! the lifetime of the process, instead of on every read.

use std::collections::HashSet;

use crate::error::Result;
use crate::tree::{NodeId, TreeStore};

/// Outcome of a migration attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The old shape was found and rewritten
    Migrated,
    /// Nothing to migrate
    UpToDate,
    /// Already attempted for this container in this process
    Skipped,
}

/// Records which `(container, migration)` pairs already ran
#[derive(Debug, Default)]
pub struct MigrationLedger {
    done: HashSet<(NodeId, String)>,
}

impl MigrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self, container: NodeId, name: &str) -> bool {
        self.done.contains(&(container, name.to_string()))
    }

    /// Run `migrate` for `container` unless it already ran.
    ///
    /// `migrate` returns `true` when it rewrote anything. A failed migration
    /// is not recorded, so it is retried on the next call.
    pub fn run_once<S, F>(&mut self, store: &mut S, container: NodeId, name: &str, migrate: F) -> Result<MigrationOutcome>
    where
        S: TreeStore + ?Sized,
        F: FnOnce(&mut S, NodeId) -> Result<bool>,
    {
        if self.has_run(container, name) {
            return Ok(MigrationOutcome::Skipped);
        }
        let migrated = migrate(store, container)?;
        self.done.insert((container, name.to_string()));
        if migrated {
            log::info!("Migrated container {} ({})", container, name);
            Ok(MigrationOutcome::Migrated)
        } else {
            Ok(MigrationOutcome::UpToDate)
        }
    }
}
