//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Publisher-facing entry points of the event engine.
//
// | Component           | Description                                                          |
// |---------------------|----------------------------------------------------------------------|
// | EventAdmin          | Publishing interface (synchronous send, asynchronous post)           |
// | EventAdminImpl      | One engine instance: caches, blacklist, pools and deliverers         |
// | EventAdminRuntime   | Reconfigurable handle swapping engine instances on config changes    |
//--------------------------------------------------------------------------------------------------

pub mod event_admin_service;
pub mod runtime;

pub use event_admin_service::EventAdminImpl;
pub use runtime::EventAdminRuntime;

use thiserror::Error;

use crate::domain::models::{ComponentId, Event, EventError};
use crate::domain::services::worker_pool::PoolError;

/// Errors a publisher can observe.
///
/// Handler failures, timeouts, malformed filters and authorization problems
/// are contained by the engine and never reported here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventAdminError {
    /// Publishing before the runtime was started
    #[error("Event admin has not been started")]
    NotStarted,

    /// Publishing after the engine was stopped
    #[error("Event admin has been stopped")]
    Stopped,

    /// The event could not be built
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    /// The engine is running but could not start a delivery
    #[error("Delivery failed: {0}")]
    DeliveryFailed(PoolError),

    /// The publisher lacks the publish permission for the topic
    #[error("Component {principal} may not publish to {topic}")]
    PublishDenied { principal: ComponentId, topic: String },
}

/// Type alias for Result with EventAdminError
pub type EventAdminResult<T> = Result<T, EventAdminError>;

/// Interface for publishing events.
pub trait EventAdmin: Send + Sync {
    /// Delivers the event to every matching handler and returns once all of
    /// them have been notified (or abandoned after the timeout).
    ///
    /// # Arguments
    /// * `event` - The event to deliver
    fn publish_sync(&self, event: Event) -> EventAdminResult<()>;

    /// Resolves the matching handlers and returns immediately; delivery
    /// happens on the asynchronous pool.
    ///
    /// Events posted from one thread are delivered in posting order.
    ///
    /// # Arguments
    /// * `event` - The event to deliver
    fn publish_async(&self, event: Event) -> EventAdminResult<()>;
}
