//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Resolution of the subscribers that receive an event. Candidates are checked in registration
// order against the blacklist, their topic interest, their subscribe permission and their
// property filter; the first failing check excludes the candidate.
//--------------------------------------------------------------------------------------------------

pub mod handler_resolver_service;

pub use handler_resolver_service::BlacklistingHandlerResolver;

use crate::domain::models::{Event, Subscriber};

/// Determines the subscribers that should receive an event.
///
/// Implementations must be thread-safe; resolution happens concurrently on
/// every publishing thread.
pub trait HandlerResolver: Send + Sync {
    /// Returns the candidates that should receive the event.
    ///
    /// # Arguments
    /// * `event` - The event being published
    /// * `candidates` - Registered subscribers in registration order
    ///
    /// # Returns
    /// The matching subset, in candidate order
    fn resolve(&self, event: &Event, candidates: &[Subscriber]) -> Vec<Subscriber>;
}
