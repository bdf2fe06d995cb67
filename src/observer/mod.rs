//! Change observation and batched delivery
//!
//! One [`ObserverService`] consumes the store's global mutation stream and
//! fans it out to many feature-level subscriptions, each keyed by a
//! `(featureId, instanceHint)` pair.
//!
//! # Delivery modes
//!
//! - **Immediate** (default): a matched subscription fires while its event is
//!   being processed, in event order.
//! - **Batched** (between `BulkLoadBegin` and `BulkLoadComplete`): matches
//!   collect in a pending set and a single flush is scheduled. The flush runs
//!   once the event queue has drained, before [`ObserverService::dispatch`]
//!   returns, and fires every pending subscription exactly once.
//!
//! # Re-entrancy
//!
//! Callbacks get `&mut dyn TreeStore` and may mutate it. Those mutations are
//! queued by the store and picked up by the running dispatch loop; a nested
//! `dispatch` call from inside a callback returns immediately. The service
//! holds no borrow of its own state while a callback runs, so callbacks may
//! observe or unsubscribe freely.

mod subscription;

pub use subscription::{Callback, Subscription, SubscriptionId};

use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

use subscription::Registration;

use crate::container::{self, ContainerKey};
use crate::tree::{NodeId, TreeEvent, TreeStore};

/// Default bound on events handled by a single dispatch run
pub const DEFAULT_MAX_DISPATCH_EVENTS: usize = 100_000;

#[derive(Debug)]
pub(crate) struct Inner {
    registrations: Vec<Registration>,
    pending: Vec<SubscriptionId>,
    flush_scheduled: bool,
    bulk_loading: bool,
    dispatching: bool,
    max_dispatch_events: usize,
}

impl Inner {
    /// Drop a registration from the live set and the pending batch together
    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.pending.retain(|p| *p != id);
        self.registrations.len() != before
    }

    fn schedule(&mut self, id: SubscriptionId) {
        if !self.pending.contains(&id) {
            self.pending.push(id);
        }
        if !self.flush_scheduled {
            self.flush_scheduled = true;
            log::trace!("Batched flush scheduled");
        }
    }
}

/// Resets the re-entrancy flag even if a callback panics
struct DispatchGuard<'a> {
    inner: &'a RefCell<Inner>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.inner.borrow_mut().dispatching = false;
    }
}

/// Fan-out from the global mutation stream to feature subscriptions
#[derive(Debug, Clone)]
pub struct ObserverService {
    inner: Rc<RefCell<Inner>>,
}

impl Default for ObserverService {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverService {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                registrations: Vec::new(),
                pending: Vec::new(),
                flush_scheduled: false,
                bulk_loading: false,
                dispatching: false,
                max_dispatch_events: DEFAULT_MAX_DISPATCH_EVENTS,
            })),
        }
    }

    pub fn with_max_dispatch_events(self, max: usize) -> Self {
        self.inner.borrow_mut().max_dispatch_events = max.max(1);
        self
    }

    /// Register `callback` for changes under the container of
    /// `(feature_id, instance_hint)`. The container is bound lazily, so it
    /// may be created later, locally or by a remote peer.
    pub fn observe<F>(&self, feature_id: &str, instance_hint: &str, callback: F) -> Subscription
    where
        F: FnMut(&mut dyn TreeStore, Option<NodeId>) + 'static,
    {
        let id = Uuid::new_v4();
        let callback: Callback = Box::new(callback);
        self.inner.borrow_mut().registrations.push(Registration {
            id,
            key: ContainerKey::new(feature_id, instance_hint),
            cached: None,
            callback: Rc::new(RefCell::new(callback)),
        });
        log::debug!("Subscription {} observing ({}, {})", id, feature_id, instance_hint);
        Subscription::new(id, Rc::downgrade(&self.inner))
    }

    /// Remove a registration by id
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.borrow_mut().remove(id)
    }

    pub fn is_bulk_loading(&self) -> bool {
        self.inner.borrow().bulk_loading
    }

    pub fn registration_count(&self) -> usize {
        self.inner.borrow().registrations.len()
    }

    /// Subscriptions waiting for the batched flush
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// The container currently bound to a subscription
    pub fn bound_container(&self, id: SubscriptionId) -> Option<NodeId> {
        self.inner
            .borrow()
            .registrations
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.cached)
    }

    /// Drain the store's event queue, delivering notifications.
    ///
    /// Returns the number of events processed. A call made while another
    /// dispatch is running on this service returns `0` and leaves the queue
    /// to the outer loop. The event budget is not applied inside a bulk load,
    /// and a scheduled flush always runs before returning.
    pub fn dispatch(&self, store: &mut dyn TreeStore) -> usize {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                return 0;
            }
            inner.dispatching = true;
        }
        let _guard = DispatchGuard { inner: &self.inner };
        let budget = self.inner.borrow().max_dispatch_events;

        let mut processed = 0;
        let mut exhausted = false;
        loop {
            while let Some(event) = store.next_event() {
                processed += 1;
                let ready = self.route(&*store, &event);
                for id in ready {
                    self.fire(store, id);
                }
                // Bulk loads are drained whole so their flush is never stranded
                if processed >= budget && !self.is_bulk_loading() {
                    exhausted = true;
                    break;
                }
            }
            let flushed = self.take_flush();
            if flushed {
                self.flush(store);
            }
            if exhausted {
                log::warn!(
                    "Dispatch stopped after {} events; {} left queued",
                    processed,
                    store.pending_events()
                );
                break;
            }
            if !flushed {
                break;
            }
        }
        processed
    }

    /// Decide which registrations an event touches. Immediate-mode matches
    /// are returned; batch-mode matches go to the pending set.
    fn route(&self, store: &dyn TreeStore, event: &TreeEvent) -> Vec<SubscriptionId> {
        let mut inner = self.inner.borrow_mut();
        let mut hits = Vec::new();
        match event {
            TreeEvent::BulkLoadBegin => {
                log::debug!("Bulk load started; batching notifications");
                inner.bulk_loading = true;
            }
            TreeEvent::BulkLoadComplete => {
                log::debug!("Bulk load complete");
                inner.bulk_loading = false;
            }
            TreeEvent::Added { node } | TreeEvent::Updated { node } => {
                let changed = store.node(*node);
                for reg in inner.registrations.iter_mut() {
                    match reg.cached {
                        Some(bound) => {
                            if container::is_related(store, bound, *node) {
                                hits.push(reg.id);
                            }
                        }
                        None => {
                            let candidate = changed
                                .filter(|n| reg.key.matches(n))
                                .map(|n| n.id)
                                .or_else(|| {
                                    container::find(store, &reg.key.feature_id, &reg.key.instance_hint)
                                });
                            if let Some(found) = candidate {
                                log::debug!("Subscription {} bound to container {}", reg.id, found);
                                reg.cached = Some(found);
                                hits.push(reg.id);
                            }
                        }
                    }
                }
            }
            TreeEvent::Deleted { node, parent } => {
                for reg in inner.registrations.iter_mut() {
                    match reg.cached {
                        Some(bound) if bound == *node => {
                            log::debug!("Container {} of subscription {} deleted", bound, reg.id);
                            reg.cached = None;
                            hits.push(reg.id);
                        }
                        Some(bound) => {
                            if let Some(p) = parent {
                                if container::is_related(store, bound, *p) {
                                    hits.push(reg.id);
                                }
                            }
                        }
                        None => {}
                    }
                }
            }
        }

        if inner.bulk_loading {
            for id in hits.drain(..) {
                inner.schedule(id);
            }
        }
        hits
    }

    fn take_flush(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        std::mem::replace(&mut inner.flush_scheduled, false)
    }

    fn flush(&self, store: &mut dyn TreeStore) {
        let pending = std::mem::take(&mut self.inner.borrow_mut().pending);
        log::debug!("Flushing {} batched subscriptions", pending.len());
        for id in pending {
            self.fire(store, id);
        }
    }

    /// Invoke one registration's callback, if it is still registered
    fn fire(&self, store: &mut dyn TreeStore, id: SubscriptionId) {
        let target = {
            let inner = self.inner.borrow();
            inner
                .registrations
                .iter()
                .find(|r| r.id == id)
                .map(|r| (r.callback.clone(), r.cached))
        };
        let Some((callback, container)) = target else {
            return;
        };
        let Ok(mut cb) = callback.try_borrow_mut() else {
            log::warn!("Subscription {} is already running; skipped", id);
            return;
        };
        let f = &mut *cb;
        f(store, container);
    }
}
