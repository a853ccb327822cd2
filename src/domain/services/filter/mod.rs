use std::sync::Arc;

use thiserror::Error;

use crate::domain::services::cache::LeastRecentlyUsedCache;

pub mod parser;

pub use parser::{Filter, Operator};

/// Errors that can occur while compiling a filter expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The expression is not a valid filter
    #[error("Invalid filter {expression:?} at position {position}: {reason}")]
    Parse {
        expression: String,
        position: usize,
        reason: String,
    },
}

/// Compiles filter expressions, caching the compiled form by expression text.
///
/// Only the compiled filter is cached; the match result depends on the event
/// properties and is evaluated on every delivery.
#[derive(Debug)]
pub struct CachedFilters {
    cache: LeastRecentlyUsedCache<String, Arc<Filter>>,
}

impl CachedFilters {
    pub fn new(cache: LeastRecentlyUsedCache<String, Arc<Filter>>) -> Self {
        Self { cache }
    }

    /// Returns the compiled filter for an expression.
    ///
    /// Malformed expressions are not cached, so every attempt reports the error.
    pub fn create_filter(&self, expression: &str) -> Result<Arc<Filter>, FilterError> {
        let key = expression.to_string();
        if let Some(filter) = self.cache.get(&key) {
            return Ok(filter);
        }
        let filter = Arc::new(Filter::parse(expression)?);
        self.cache.put(key, Arc::clone(&filter));
        Ok(filter)
    }

    pub fn is_cached(&self, expression: &str) -> bool {
        self.cache.contains_key(&expression.to_string())
    }
}
