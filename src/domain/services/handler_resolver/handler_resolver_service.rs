//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name                        | Description                                   | Key Methods      |
// |-----------------------------|-----------------------------------------------|------------------|
// | BlacklistingHandlerResolver | Cached resolution honouring the blacklist     | resolve          |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::models::{Event, Subscriber};
use crate::domain::services::blacklist::Blacklist;
use crate::domain::services::filter::CachedFilters;
use crate::domain::services::security::CachedTopicPermissions;
use crate::domain::services::topic::CachedTopicHandlerFilters;

use super::HandlerResolver;

/// Resolver applying, per candidate and in this order: blacklist, topic
/// interest, subscribe permission, property filter.
#[derive(Debug)]
pub struct BlacklistingHandlerResolver {
    blacklist: Arc<Blacklist>,
    topic_filters: CachedTopicHandlerFilters,
    filters: CachedFilters,
    subscribe_permissions: CachedTopicPermissions,
}

impl BlacklistingHandlerResolver {
    /// Creates a new resolver.
    ///
    /// # Arguments
    /// * `blacklist` - Blacklist shared with the synchronous deliverer
    /// * `topic_filters` - Cached topic interest decisions
    /// * `filters` - Cached compiled property filters
    /// * `subscribe_permissions` - Cached subscribe permissions
    pub fn new(
        blacklist: Arc<Blacklist>,
        topic_filters: CachedTopicHandlerFilters,
        filters: CachedFilters,
        subscribe_permissions: CachedTopicPermissions,
    ) -> Self {
        Self {
            blacklist,
            topic_filters,
            filters,
            subscribe_permissions,
        }
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub fn topic_filters(&self) -> &CachedTopicHandlerFilters {
        &self.topic_filters
    }

    pub fn subscribe_permissions(&self) -> &CachedTopicPermissions {
        &self.subscribe_permissions
    }

    fn accepts(&self, event: &Event, candidate: &Subscriber) -> bool {
        let id = candidate.id();
        if self.blacklist.contains(&id) {
            return false;
        }
        if !self.topic_filters.matches(candidate, event.topic()) {
            return false;
        }
        if !self.subscribe_permissions.has_permission(&id, event.topic()) {
            debug!("Subscriber {} lacks subscribe permission for {}", id, event.topic());
            return false;
        }
        match candidate.filter() {
            None => true,
            Some(expression) => match self.filters.create_filter(expression) {
                Ok(filter) => filter.matches(event),
                Err(e) => {
                    warn!("Ignoring subscriber {} with invalid filter: {}", id, e);
                    false
                }
            },
        }
    }
}

impl HandlerResolver for BlacklistingHandlerResolver {
    fn resolve(&self, event: &Event, candidates: &[Subscriber]) -> Vec<Subscriber> {
        let handlers: Vec<Subscriber> = candidates
            .iter()
            .filter(|candidate| self.accepts(event, candidate))
            .cloned()
            .collect();
        debug!(
            "Resolved {} of {} subscribers for topic {}",
            handlers.len(),
            candidates.len(),
            event.topic()
        );
        handlers
    }
}
