//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Delivery strategies for resolved handler lists.
//
// | Component          | Description                                                          |
// |--------------------|----------------------------------------------------------------------|
// | DeliverTask        | Trait for components delivering an event to a handler list           |
// | SyncDeliverTask    | Sequential delivery with per-handler timeout and blacklisting        |
// | AsyncDeliverTask   | Non-blocking hand-off, ordered per publishing thread                 |
//--------------------------------------------------------------------------------------------------

mod async_deliver;
mod sync_deliver;


pub use async_deliver::AsyncDeliverTask;
pub use sync_deliver::{SyncDeliverTask, MIN_TIMEOUT_MS};

use std::sync::Arc;

use crate::domain::models::{Event, Subscriber};
use crate::domain::services::worker_pool::PoolError;

/// Delivers an event to an already resolved list of handlers.
pub trait DeliverTask: Send + Sync {
    /// Delivers `event` to `handlers` in order.
    ///
    /// # Returns
    /// * `Ok(())` - Delivery completed (sync) or was accepted (async)
    /// * `Err(PoolError)` - The underlying pool no longer accepts work
    fn execute(&self, event: Arc<Event>, handlers: Vec<Subscriber>) -> Result<(), PoolError>;
}
