//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Bridges from host notifications (lifecycle changes, log entries, ...) to events. Each
// translator turns a notification into at most one event; the adapter set posts the results
// asynchronously so the notifying code is never blocked by event handlers.
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::models::{ComponentId, Event};
use crate::domain::services::event_admin::EventAdmin;

/// Translates a host notification of type `H` into an event.
pub trait EventTranslator<H>: Send + Sync {
    /// Returns the event for a notification, `None` to ignore it.
    fn translate(&self, notification: &H) -> Option<Event>;
}

impl<H, F> EventTranslator<H> for F
where
    F: Fn(&H) -> Option<Event> + Send + Sync,
{
    fn translate(&self, notification: &H) -> Option<Event> {
        self(notification)
    }
}

/// Ordered set of translators for one kind of notification.
pub struct AdapterSet<H> {
    translators: RwLock<Vec<(ComponentId, Arc<dyn EventTranslator<H>>)>>,
}

impl<H> AdapterSet<H> {
    pub fn new() -> Self {
        Self {
            translators: RwLock::new(Vec::new()),
        }
    }

    /// Appends a translator.
    ///
    /// # Returns
    /// The identity used to deregister it
    pub fn register(&self, translator: Arc<dyn EventTranslator<H>>) -> ComponentId {
        let id = ComponentId::new();
        self.translators.write().push((id, translator));
        debug!("Registered event adapter {}", id);
        id
    }

    /// Removes a translator.
    ///
    /// # Returns
    /// `true` if the translator was registered
    pub fn deregister(&self, id: &ComponentId) -> bool {
        let mut translators = self.translators.write();
        let before = translators.len();
        translators.retain(|(registered, _)| registered != id);
        before != translators.len()
    }

    pub fn len(&self) -> usize {
        self.translators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.read().is_empty()
    }

    /// Posts the events every translator produces for `notification`, in
    /// registration order.
    ///
    /// Rejected posts are logged and skipped.
    ///
    /// # Returns
    /// The number of events accepted by the event admin
    pub fn forward(&self, notification: &H, admin: &dyn EventAdmin) -> usize {
        let translators = self.translators.read().clone();
        let mut posted = 0;
        for (id, translator) in translators {
            let Some(event) = translator.translate(notification) else {
                continue;
            };
            let topic = event.topic().to_string();
            match admin.publish_async(event) {
                Ok(()) => posted += 1,
                Err(e) => warn!("Event adapter {} could not post {}: {}", id, topic, e),
            }
        }
        posted
    }
}

impl<H> Default for AdapterSet<H> {
    fn default() -> Self {
        Self::new()
    }
}
