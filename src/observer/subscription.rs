use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use uuid::Uuid;

use super::Inner;
use crate::container::ContainerKey;
use crate::tree::{NodeId, TreeStore};

/// Unique identifier for a subscription
pub type SubscriptionId = Uuid;

/// Feature callback: receives the store and the bound container, or `None`
/// once the container has been deleted
pub type Callback = Box<dyn FnMut(&mut dyn TreeStore, Option<NodeId>)>;

pub(super) struct Registration {
    pub id: SubscriptionId,
    pub key: ContainerKey,
    pub cached: Option<NodeId>,
    pub callback: Rc<RefCell<Callback>>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("cached", &self.cached)
            .finish()
    }
}

/// Handle returned by [`ObserverService::observe`](super::ObserverService::observe).
///
/// Dropping the handle does not unsubscribe; registrations live until
/// [`Subscription::unsubscribe`] is called.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    service: Weak<RefCell<Inner>>,
}

impl Subscription {
    pub(super) fn new(id: SubscriptionId, service: Weak<RefCell<Inner>>) -> Self {
        Self { id, service }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the registration and any pending batched delivery for it.
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.service.upgrade() {
            Some(inner) => inner.borrow_mut().remove(self.id),
            None => false,
        }
    }
}
