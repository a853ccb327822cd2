use parking_lot::RwLock;
use tracing::debug;

use crate::domain::models::{ComponentId, Subscriber};

/// Live view of the currently registered subscribers.
///
/// The registrations are owned by the host environment; the engine only takes
/// a snapshot per resolution and never mutates them.
pub trait SubscriberRegistry: Send + Sync {
    /// Returns the registered subscribers in registration order.
    fn snapshot(&self) -> Vec<Subscriber>;
}

/// Default in-memory registry.
#[derive(Debug, Default)]
pub struct SubscriberTable {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber, replacing an earlier registration with the same
    /// identity in place.
    pub fn register(&self, subscriber: Subscriber) -> ComponentId {
        let id = subscriber.id();
        let mut subscribers = self.subscribers.write();
        match subscribers.iter_mut().find(|s| s.id() == id) {
            Some(existing) => *existing = subscriber,
            None => subscribers.push(subscriber),
        }
        debug!("Registered subscriber {} (total: {})", id, subscribers.len());
        id
    }

    /// Removes a subscriber.
    ///
    /// # Returns
    /// `true` if the subscriber was registered
    pub fn unregister(&self, id: &ComponentId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id() != *id);
        before != subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

impl SubscriberRegistry for SubscriberTable {
    fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.read().clone()
    }
}
