//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Topic permissions. The authorization source is an external collaborator; the engine only asks
// it whether a component may publish to or subscribe to a topic and caches the answer for the
// lifetime of the engine instance.
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::domain::models::ComponentId;
use crate::domain::services::cache::LeastRecentlyUsedCache;

/// Operation a topic permission is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicOperation {
    Publish,
    Subscribe,
}

impl fmt::Display for TopicOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicOperation::Publish => f.write_str("publish"),
            TopicOperation::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Errors reported by an authorization source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The source could not reach a decision
    #[error("Authorization check failed: {0}")]
    CheckFailed(String),
}

/// Capability deciding whether a component may use a topic.
///
/// Answers must depend only on `(principal, topic, operation)` since they are
/// cached by the engine.
pub trait AuthorizationSource: Send + Sync {
    /// Checks a topic permission.
    ///
    /// # Returns
    /// * `Ok(true)` - The operation is allowed
    /// * `Ok(false)` - The operation is denied
    /// * `Err(AuthorizationError)` - No decision could be made
    fn check_permission(
        &self,
        principal: &ComponentId,
        topic: &str,
        operation: TopicOperation,
    ) -> Result<bool, AuthorizationError>;
}

/// Permission checks for one operation, cached per `(principal, topic)`.
///
/// Without an authorization source every check is allowed and nothing is
/// cached, so the plain and the checked engine share one code path.
pub struct CachedTopicPermissions {
    source: Option<Arc<dyn AuthorizationSource>>,
    cache: LeastRecentlyUsedCache<(ComponentId, String), bool>,
    operation: TopicOperation,
}

impl CachedTopicPermissions {
    /// # Arguments
    /// * `source` - Authorization source, `None` to allow everything
    /// * `cache` - Cache backing the decisions
    /// * `operation` - The operation checked by this instance
    pub fn new(
        source: Option<Arc<dyn AuthorizationSource>>,
        cache: LeastRecentlyUsedCache<(ComponentId, String), bool>,
        operation: TopicOperation,
    ) -> Self {
        Self {
            source,
            cache,
            operation,
        }
    }

    /// Returns true if `principal` holds the permission for `topic`.
    ///
    /// Errors from the source deny the permission, are logged, and are not
    /// cached.
    pub fn has_permission(&self, principal: &ComponentId, topic: &str) -> bool {
        let Some(source) = &self.source else {
            return true;
        };

        let key = (*principal, topic.to_string());
        if let Some(allowed) = self.cache.get(&key) {
            return allowed;
        }

        match source.check_permission(principal, topic, self.operation) {
            Ok(allowed) => {
                self.cache.put(key, allowed);
                allowed
            }
            Err(e) => {
                warn!(
                    "Unable to check {} permission of {} for topic {}: {}",
                    self.operation, principal, topic, e
                );
                false
            }
        }
    }

    pub fn operation(&self) -> TopicOperation {
        self.operation
    }

    pub fn is_cached(&self, principal: &ComponentId, topic: &str) -> bool {
        self.cache.contains_key(&(*principal, topic.to_string()))
    }
}

impl fmt::Debug for CachedTopicPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTopicPermissions")
            .field("operation", &self.operation)
            .field("secured", &self.source.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
use mockall::*;

#[cfg(test)]
mock! {
    pub AuthorizationSource {}

    impl AuthorizationSource for AuthorizationSource {
        fn check_permission(
            &self,
            principal: &ComponentId,
            topic: &str,
            operation: TopicOperation,
        ) -> Result<bool, AuthorizationError>;
    }
}
