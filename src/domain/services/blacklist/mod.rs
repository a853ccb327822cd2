use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::models::ComponentId;

/// Append-only set of subscribers that are no longer delivered to.
///
/// A subscriber lands here after overrunning the delivery timeout and stays
/// for the lifetime of the engine instance; a reconfigured engine starts with
/// an empty blacklist.
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: RwLock<HashSet<ComponentId>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the subscriber is blacklisted.
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.read().contains(id)
    }

    /// Blacklists a subscriber.
    ///
    /// # Returns
    /// `true` if the subscriber was not blacklisted before
    pub fn add(&self, id: ComponentId) -> bool {
        let added = self.entries.write().insert(id);
        if added {
            debug!("Subscriber {} added to blacklist", id);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
