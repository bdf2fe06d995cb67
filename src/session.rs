//! Composition root
//!
//! A `Session` owns one store, one observer service and the migration ledger,
//! and exposes the operations features call. Tests can build as many
//! independent sessions as they like.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{self, CodecOptions};
use crate::config::SyncConfig;
use crate::container;
use crate::error::Result;
use crate::migration::{MigrationLedger, MigrationOutcome};
use crate::observer::{ObserverService, Subscription};
use crate::tree::{Element, MemoryTree, NodeId, TreeStore};
use crate::turn;

pub struct Session<S: TreeStore = MemoryTree> {
    store: S,
    observers: ObserverService,
    migrations: MigrationLedger,
    config: SyncConfig,
}

impl Session<MemoryTree> {
    pub fn new() -> Self {
        Self::with_store(MemoryTree::new(), SyncConfig::default())
    }
}

impl Default for Session<MemoryTree> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TreeStore> Session<S> {
    pub fn with_store(store: S, config: SyncConfig) -> Self {
        let observers = ObserverService::new().with_max_dispatch_events(config.max_dispatch_events);
        Self {
            store,
            observers,
            migrations: MigrationLedger::new(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn observers(&self) -> &ObserverService {
        &self.observers
    }

    /// Codec options carrying the configured defaults
    pub fn codec_options(&self) -> CodecOptions {
        self.config.codec_options()
    }

    pub fn find_container(&self, feature_id: &str, instance_hint: &str) -> Option<NodeId> {
        container::find(&self.store, feature_id, instance_hint)
    }

    pub fn get_or_create_container(&mut self, feature_id: &str, instance_hint: &str) -> Result<NodeId> {
        container::get_or_create_tagged(&mut self.store, &self.config.container_tag, feature_id, instance_hint)
    }

    pub fn observe<F>(&self, feature_id: &str, instance_hint: &str, callback: F) -> Subscription
    where
        F: FnMut(&mut dyn TreeStore, Option<NodeId>) + 'static,
    {
        self.observers.observe(feature_id, instance_hint, callback)
    }

    /// Deliver every queued mutation to the observers
    pub fn dispatch(&mut self) -> usize {
        self.observers.dispatch(&mut self.store)
    }

    pub fn encode(&self, name: &str, value: &Value, options: &CodecOptions) -> Element {
        codec::encode(name, value, options)
    }

    pub fn decode(&self, element: &Element, options: &CodecOptions) -> Value {
        codec::decode(element, options)
    }

    /// Replace the child `name` of `container` with the encoding of `value`
    pub fn save(&mut self, container: NodeId, name: &str, value: &Value, options: &CodecOptions) -> Result<NodeId> {
        self.store.require(container)?;
        for old in self.store.children_named(container, name) {
            self.store.delete_node(old)?;
        }
        let element = codec::encode(name, value, options);
        self.store.graft(Some(container), &element)
    }

    /// Decode the child `name` of `container`; absent if never written
    pub fn load(&self, container: NodeId, name: &str, options: &CodecOptions) -> Option<Value> {
        let child = self.store.child_named(container, name)?;
        let element = self.store.snapshot(child)?;
        Some(codec::decode(&element, options))
    }

    pub fn save_as<T: Serialize>(&mut self, container: NodeId, name: &str, value: &T, options: &CodecOptions) -> Result<NodeId> {
        let json = serde_json::to_value(value)?;
        self.save(container, name, &json, options)
    }

    /// Typed load. A missing or malformed entry degrades to `None`.
    pub fn load_as<T: DeserializeOwned>(&self, container: NodeId, name: &str, options: &CodecOptions) -> Option<T> {
        let child = self.store.child_named(container, name)?;
        let element = self.store.snapshot(child)?;
        match codec::decode_as(&element, options) {
            Ok(v) => Some(v),
            Err(e) => {
                log::debug!("Ignoring unreadable {} in container {}: {}", name, container, e);
                None
            }
        }
    }

    /// Upgrade a legacy turn-engine layout, once per container per process
    pub fn migrate_turn_engine(&mut self, container: NodeId) -> Result<MigrationOutcome> {
        self.migrations
            .run_once(&mut self.store, container, turn::LEGACY_MIGRATION, |store, c| turn::migrate_legacy(store, c))
    }
}
