//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name            | Description                                            | Key Methods       |
// |-----------------|--------------------------------------------------------|-------------------|
// | ComponentId     | Stable identity of a subscriber or publisher           | new               |
// | EventHandler    | Capability invoked for every delivered event           | handle_event      |
// | Subscriber      | Registered handler with topic interest and filter      | new, with_topics  |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;

/// Opaque, stable identity of a component taking part in event exchange.
///
/// Used as the key of the blacklist and of every resolution cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(Uuid);

impl ComponentId {
    /// Generates a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Trait for components that can handle events.
///
/// Handlers are invoked from worker threads. A returned error (or a panic) is
/// caught and logged by the dispatcher; it never reaches the publisher.
pub trait EventHandler: Send + Sync {
    /// Processes a single event.
    ///
    /// # Arguments
    /// * `event` - The event being delivered
    fn handle_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// A registered subscriber.
///
/// Cloning is cheap: the handler is shared and the identity is copied, so a
/// resolved subscriber list can be handed to a worker thread.
#[derive(Clone)]
pub struct Subscriber {
    id: ComponentId,
    handler: Arc<dyn EventHandler>,
    topics: Option<Vec<String>>,
    filter: Option<String>,
}

impl Subscriber {
    /// Creates a subscriber with a fresh identity, no topic interest and no filter.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self::with_id(ComponentId::new(), handler)
    }

    /// Creates a subscriber with the given identity.
    pub fn with_id(id: ComponentId, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id,
            handler,
            topics: None,
            filter: None,
        }
    }

    /// Declares the topic patterns this subscriber is interested in.
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Declares an LDAP-style filter over the event properties.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn topics(&self) -> Option<&[String]> {
        self.topics.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    /// Invokes the handler for the given event.
    pub fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.handler.handle_event(event)
    }
}

// Manually implement Debug since the handler is a trait object
impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("topics", &self.topics)
            .field("filter", &self.filter)
            .finish()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}
