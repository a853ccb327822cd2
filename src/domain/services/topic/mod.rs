//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Topic interest matching. A subscriber declares topic patterns; a pattern ending in `/*` covers
// its prefix and everything below it, a lone `*` covers every topic, any other pattern must be
// equal to the event topic.
//
// | Component                   | Description                                                 |
// |-----------------------------|-------------------------------------------------------------|
// | topic_matches               | Pure pattern/topic comparison                               |
// | CachedTopicHandlerFilters   | Per (subscriber, topic) cached match decision               |
//--------------------------------------------------------------------------------------------------

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::models::{ComponentId, Subscriber};
use crate::domain::services::cache::LeastRecentlyUsedCache;

/// Pattern matching every topic.
pub const WILDCARD: &str = "*";

/// Returns true if `pattern` covers `topic`.
///
/// `a/b/*` matches `a/b`, `a/b/c` and `a/b/c/d` but not `a/bc`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => {
            topic == prefix
                || (topic.len() > prefix.len()
                    && topic.starts_with(prefix)
                    && topic.as_bytes()[prefix.len()] == b'/')
        }
        None => pattern == topic,
    }
}

/// Cache key of a topic decision: subscriber identity, fingerprint of its
/// declared topics, event topic.
pub type TopicMatchKey = (ComponentId, u64, String);

/// Decides whether a subscriber's declared topics cover an event topic,
/// caching the decision per `(subscriber, declared topics, topic)`.
///
/// A subscriber re-registered under the same identity with other topics gets
/// a different fingerprint, so stale decisions are never reused.
#[derive(Debug)]
pub struct CachedTopicHandlerFilters {
    cache: LeastRecentlyUsedCache<TopicMatchKey, bool>,
    require_topic: bool,
}

impl CachedTopicHandlerFilters {
    /// # Arguments
    /// * `cache` - Cache backing the decisions
    /// * `require_topic` - Whether subscribers without topics are excluded
    pub fn new(cache: LeastRecentlyUsedCache<TopicMatchKey, bool>, require_topic: bool) -> Self {
        Self { cache, require_topic }
    }

    /// Returns true if the subscriber is interested in the topic.
    pub fn matches(&self, subscriber: &Subscriber, topic: &str) -> bool {
        self.cache
            .get_or_insert_with(key(subscriber, topic), || self.evaluate(subscriber, topic))
    }

    /// Returns true if a decision for the subscriber, as currently declared,
    /// is cached.
    pub fn is_cached(&self, subscriber: &Subscriber, topic: &str) -> bool {
        self.cache.contains_key(&key(subscriber, topic))
    }

    pub fn require_topic(&self) -> bool {
        self.require_topic
    }

    fn evaluate(&self, subscriber: &Subscriber, topic: &str) -> bool {
        match subscriber.topics() {
            Some(patterns) => patterns.iter().any(|pattern| topic_matches(pattern, topic)),
            None => !self.require_topic,
        }
    }
}

fn key(subscriber: &Subscriber, topic: &str) -> TopicMatchKey {
    let mut hasher = DefaultHasher::new();
    subscriber.topics().hash(&mut hasher);
    (subscriber.id(), hasher.finish(), topic.to_string())
}
